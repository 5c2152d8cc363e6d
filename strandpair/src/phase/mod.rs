// Pairing phase machinery shared by Legacy and Secure Connections Phase 2.
//
// A phase is driven entirely by its owner: `start`, inbound frames, user
// answers and channel closure are method calls. Every request made to the
// user carries a `ResumeToken`; answers whose token no longer matches the
// pending request are dropped, which is what makes late answers after a
// failure or teardown harmless.

pub mod legacy;
pub mod secure_connections;
pub mod stage1;

use std::fmt;
use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::channel::{Channel, LinkType};
use crate::codec::Command;
use crate::crypto::RandomSource;
use crate::error::{ErrorCode, PairingError};
use crate::listener::{ConfirmToken, DisplayMethod, Listener, PasskeyToken};
use crate::types::{Role, UInt128};

static NEXT_PHASE_ID: AtomicU64 = AtomicU64::new(1);

/// Invoked exactly once with the derived STK or LTK.
pub type KeyReadyCallback = Box<dyn FnOnce(UInt128)>;

/// Process-unique identity of one phase instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhaseId(u64);

impl PhaseId {
    fn next() -> Self {
        Self(NEXT_PHASE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase#{}", self.0)
    }
}

/// Identifies one outstanding user request of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ResumeToken {
    pub(crate) phase: PhaseId,
    pub(crate) request: u32,
}

/// State and plumbing common to every pairing phase.
pub struct PhaseBase {
    id: PhaseId,
    role: Role,
    channel: Weak<dyn Channel>,
    listener: Weak<dyn Listener>,
    rng: RandomSource,
    started: bool,
    has_failed: bool,
    next_request: u32,
    pending: Option<ResumeToken>,
}

impl PhaseBase {
    pub(crate) fn new(
        role: Role,
        channel: Weak<dyn Channel>,
        listener: Weak<dyn Listener>,
        rng: RandomSource,
    ) -> Self {
        Self {
            id: PhaseId::next(),
            role,
            channel,
            listener,
            rng,
            started: false,
            has_failed: false,
            next_request: 0,
            pending: None,
        }
    }

    pub fn id(&self) -> PhaseId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn has_failed(&self) -> bool {
        self.has_failed
    }

    pub(crate) fn is_initiator(&self) -> bool {
        self.role == Role::Initiator
    }

    /// Transport of the channel, `Le` once the channel is gone.
    pub(crate) fn link_type(&self) -> LinkType {
        self.channel
            .upgrade()
            .map(|channel| channel.link_type())
            .unwrap_or_default()
    }

    pub(crate) fn rng(&mut self) -> &mut RandomSource {
        &mut self.rng
    }

    /// Panics if the phase has already failed.
    pub(crate) fn assert_not_failed(&self) {
        assert!(!self.has_failed, "pairing phase used after failure");
    }

    /// Panics unless this is the first `start` of a live phase.
    pub(crate) fn mark_started(&mut self) {
        self.assert_not_failed();
        assert!(!self.started, "pairing phase started twice");
        self.started = true;
    }

    pub(crate) fn send(&self, command: Command) {
        match self.channel.upgrade() {
            Some(channel) => {
                tracing::trace!(phase = %self.id, code = ?command.code(), "tx");
                channel.send(command.encode());
            }
            None => {
                tracing::warn!(phase = %self.id, code = ?command.code(), "channel closed, dropping frame");
            }
        }
    }

    /// Tell the peer why pairing stopped, then fail locally.
    pub(crate) fn abort(&mut self, code: ErrorCode) {
        self.assert_not_failed();
        tracing::info!(phase = %self.id, role = %self.role, %code, "aborting pairing");
        self.send(Command::PairingFailed(code));
        self.on_failure(PairingError::Protocol(code));
    }

    pub(crate) fn on_failure(&mut self, error: PairingError) {
        self.assert_not_failed();
        tracing::warn!(phase = %self.id, role = %self.role, %error, "pairing failed");
        self.has_failed = true;
        self.pending = None;
        if let Some(listener) = self.listener.upgrade() {
            listener.on_pairing_failed(error);
        }
    }

    fn issue_token(&mut self) -> ResumeToken {
        self.next_request = self.next_request.wrapping_add(1);
        let token = ResumeToken {
            phase: self.id,
            request: self.next_request,
        };
        self.pending = Some(token);
        token
    }

    fn listener(&self) -> Option<std::rc::Rc<dyn Listener>> {
        let listener = self.listener.upgrade();
        if listener.is_none() {
            tracing::warn!(phase = %self.id, "listener gone, user request not delivered");
        }
        listener
    }

    pub(crate) fn request_confirm(&mut self) {
        let token = ConfirmToken(self.issue_token());
        if let Some(listener) = self.listener() {
            listener.confirm_pairing(token);
        }
    }

    pub(crate) fn request_display(&mut self, passkey: u32, method: DisplayMethod) {
        let token = ConfirmToken(self.issue_token());
        if let Some(listener) = self.listener() {
            listener.display_passkey(passkey, method, token);
        }
    }

    pub(crate) fn request_passkey(&mut self) {
        let token = PasskeyToken(self.issue_token());
        if let Some(listener) = self.listener() {
            listener.request_passkey(token);
        }
    }

    /// Consume the pending request if `token` answers it. Answers for a
    /// request already consumed are dropped. A failed phase must not be
    /// answered at all; `PhaseHost` drops failed phases before their
    /// tokens can reach them.
    pub(crate) fn resume(&mut self, token: ResumeToken) -> bool {
        self.assert_not_failed();
        if self.pending == Some(token) {
            self.pending = None;
            return true;
        }
        tracing::debug!(
            phase = %self.id,
            request = token.request,
            "ignoring stale user response"
        );
        false
    }

    /// Decode an inbound PDU. Malformed frames abort and a peer Pairing
    /// Failed ends the phase; both yield `None`.
    pub(crate) fn parse_frame(&mut self, pdu: &[u8]) -> Option<Command> {
        self.assert_not_failed();
        match Command::decode(pdu) {
            Ok(Command::PairingFailed(code)) => {
                tracing::info!(phase = %self.id, %code, "peer failed pairing");
                self.on_failure(PairingError::Protocol(code));
                None
            }
            Ok(command) => {
                tracing::trace!(phase = %self.id, code = ?command.code(), "rx");
                Some(command)
            }
            Err(e) => {
                tracing::warn!(phase = %self.id, error = %e, "malformed SMP frame");
                self.abort(e.error_code());
                None
            }
        }
    }
}

impl fmt::Debug for PhaseBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseBase")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("has_failed", &self.has_failed)
            .finish_non_exhaustive()
    }
}

/// Operations every Phase 2 variant exposes to its owner.
pub trait PairingPhase {
    /// Begin the phase. Panics if called twice or after failure.
    fn start(&mut self);

    /// Handle one inbound SMP PDU.
    fn on_rx_frame(&mut self, pdu: &[u8]);

    /// Answer to `Listener::confirm_pairing` or `Listener::display_passkey`.
    fn on_user_confirm(&mut self, token: ConfirmToken, accepted: bool);

    /// Answer to `Listener::request_passkey`.
    fn on_user_passkey(&mut self, token: PasskeyToken, passkey: i64);

    fn base(&self) -> &PhaseBase;

    fn base_mut(&mut self) -> &mut PhaseBase;

    fn id(&self) -> PhaseId {
        self.base().id()
    }

    fn role(&self) -> Role {
        self.base().role()
    }

    fn has_failed(&self) -> bool {
        self.base().has_failed()
    }

    /// Send Pairing Failed with `code` and fail the phase.
    fn abort(&mut self, code: ErrorCode) {
        self.base_mut().abort(code);
    }

    /// The transport went away.
    fn on_channel_closed(&mut self) {
        self.base_mut().on_failure(PairingError::LinkDisconnected);
    }
}
