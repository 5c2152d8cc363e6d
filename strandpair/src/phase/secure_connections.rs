//! LE Secure Connections pairing Phase 2 ([Vol 3] Part H, Section 2.3.5.6).
//!
//! Public key exchange, then Stage 1 (authentication, see [`super::stage1`]),
//! then Stage 2: DHKey computation, f5 key derivation and the DHKey check
//! exchange. The completion callback receives the LTK.

use std::rc::Weak;

use constant_time_eq::constant_time_eq;
use zeroize::Zeroizing;

use crate::channel::{Channel, LinkType};
use crate::codec::{io_cap_from_pdu, Command, PublicKeyParams};
use crate::crypto::{toolbox, EcdhKey, LocalEcdhKey, RandomSource};
use crate::error::ErrorCode;
use crate::listener::{ConfirmToken, Listener, PasskeyToken};
use crate::phase::stage1::{Stage1, Stage1Output, Stage1Result};
use crate::phase::{KeyReadyCallback, PairingPhase, PhaseBase};
use crate::types::{mask_to_key_size, Phase2Params, UInt128};

/// Coarse progress of a [`SecureConnectionsPhase2`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScState {
    ExchangingPublicKeys,
    RunningStage1,
    ExchangingDhKeyChecks,
    Complete,
    Failed,
}

/// Check values computed in Stage 2, already assigned by role.
#[derive(Clone, Copy)]
struct DhKeyChecks {
    local: UInt128,
    expected_peer: UInt128,
}

/// The peer's DHKey check may arrive before Stage 2 has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerDhKeyCheck {
    Awaiting,
    Pending(UInt128),
    Validated,
}

/// Phase 2 of LE Secure Connections pairing. Produces the LTK.
pub struct SecureConnectionsPhase2 {
    base: PhaseBase,
    params: Phase2Params,

    local_key: LocalEcdhKey,
    sent_local_key: bool,
    peer_key: Option<EcdhKey>,

    stage1: Option<Stage1>,
    stage1_results: Option<Stage1Output>,

    ltk: Option<Zeroizing<UInt128>>,
    checks: Option<DhKeyChecks>,
    sent_local_check: bool,
    peer_check: PeerDhKeyCheck,

    on_ltk_ready: Option<KeyReadyCallback>,
}

impl SecureConnectionsPhase2 {
    /// Generates the local P-256 key pair. Panics unless `params` negotiated
    /// Secure Connections.
    pub fn new(
        channel: Weak<dyn Channel>,
        listener: Weak<dyn Listener>,
        params: Phase2Params,
        mut rng: RandomSource,
        on_ltk_ready: impl FnOnce(UInt128) + 'static,
    ) -> Self {
        assert!(
            params.features.secure_connections,
            "secure connections phase 2 requires a secure connections feature set"
        );
        let local_key = LocalEcdhKey::generate(&mut rng);

        Self {
            base: PhaseBase::new(params.features.role(), channel, listener, rng),
            params,
            local_key,
            sent_local_key: false,
            peer_key: None,
            stage1: None,
            stage1_results: None,
            ltk: None,
            checks: None,
            sent_local_check: false,
            peer_check: PeerDhKeyCheck::Awaiting,
            on_ltk_ready: Some(Box::new(on_ltk_ready)),
        }
    }

    /// The local public key sent to the peer.
    pub fn local_public_key(&self) -> &EcdhKey {
        self.local_key.public_key()
    }

    pub fn state(&self) -> ScState {
        if self.base.has_failed() {
            ScState::Failed
        } else if self.on_ltk_ready.is_none() {
            ScState::Complete
        } else if self.checks.is_some() {
            ScState::ExchangingDhKeyChecks
        } else if self.stage1.is_some() {
            ScState::RunningStage1
        } else {
            ScState::ExchangingPublicKeys
        }
    }

    fn send_local_public_key(&mut self) {
        let key = self.local_key.public_key().serialized_public_key();
        self.sent_local_key = true;
        self.base.send(Command::PairingPublicKey(key));
    }

    fn can_receive_peer_public_key(&self) -> Result<(), ErrorCode> {
        if self.base.link_type() != LinkType::Le {
            tracing::warn!("public key received over a non-LE link");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if self.peer_key.is_some() {
            tracing::warn!("already received peer public key");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if self.base.is_initiator() && !self.sent_local_key {
            tracing::warn!("initiator received public key before sending its own");
            return Err(ErrorCode::UnspecifiedReason);
        }
        Ok(())
    }

    fn on_peer_public_key(&mut self, params: PublicKeyParams) {
        if let Err(code) = self.can_receive_peer_public_key() {
            self.base.abort(code);
            return;
        }
        let Some(peer_key) = EcdhKey::parse_from_public_key(&params) else {
            tracing::warn!("peer public key is not on P-256");
            self.base.abort(ErrorCode::InvalidParameters);
            return;
        };
        if peer_key == *self.local_key.public_key() {
            tracing::warn!("peer reflected our public key");
            self.base.abort(ErrorCode::InvalidParameters);
            return;
        }
        self.peer_key = Some(peer_key);

        if !self.base.is_initiator() {
            self.send_local_public_key();
        }
        self.start_stage1();
    }

    fn start_stage1(&mut self) {
        let Some(peer_key) = self.peer_key.as_ref() else {
            return;
        };
        let local_x = self.local_key.public_key().public_key_x();
        let peer_x = peer_key.public_key_x();
        let method = self.params.features.method;

        let Some(stage) = Stage1::for_method(&mut self.base, method, local_x, peer_x) else {
            tracing::warn!(?method, "unsupported secure connections method");
            self.base.abort(ErrorCode::CommandNotSupported);
            return;
        };
        tracing::debug!(?method, role = %self.base.role(), "starting stage 1");
        let result = self.stage1.insert(stage).run(&mut self.base);
        self.on_stage1_progress(result);
    }

    fn on_stage1_progress(&mut self, result: Stage1Result) {
        match result {
            Ok(None) => {}
            Ok(Some(output)) => {
                self.stage1_results = Some(output);
                self.start_stage2();
            }
            Err(code) => self.base.abort(code),
        }
    }

    fn start_stage2(&mut self) {
        let (Some(peer_key), Some(results)) = (self.peer_key.as_ref(), self.stage1_results) else {
            self.base.abort(ErrorCode::UnspecifiedReason);
            return;
        };
        let Some(dh_key) = self.local_key.calculate_dh_key(peer_key) else {
            tracing::warn!("DHKey computation failed");
            self.base.abort(ErrorCode::UnspecifiedReason);
            return;
        };

        let ia = &self.params.initiator_address;
        let ra = &self.params.responder_address;
        let keys = toolbox::f5(
            &dh_key,
            &results.initiator_rand,
            &results.responder_rand,
            ia,
            ra,
        );
        let ea = toolbox::f6(
            &keys.mac_key,
            &results.initiator_rand,
            &results.responder_rand,
            &results.responder_r,
            &io_cap_from_pdu(&self.params.preq),
            ia,
            ra,
        );
        let eb = toolbox::f6(
            &keys.mac_key,
            &results.responder_rand,
            &results.initiator_rand,
            &results.initiator_r,
            &io_cap_from_pdu(&self.params.pres),
            ra,
            ia,
        );

        let (local, expected_peer) = if self.base.is_initiator() {
            (ea, eb)
        } else {
            (eb, ea)
        };
        self.ltk = Some(keys.ltk);
        self.checks = Some(DhKeyChecks {
            local,
            expected_peer,
        });

        if self.base.is_initiator() {
            self.send_local_check();
        } else if let PeerDhKeyCheck::Pending(check) = self.peer_check {
            tracing::debug!("validating cached peer DHKey check");
            self.validate_peer_check(check);
        }
    }

    fn send_local_check(&mut self) {
        if let Some(checks) = self.checks {
            self.sent_local_check = true;
            self.base.send(Command::PairingDhKeyCheck(checks.local));
        }
    }

    fn can_receive_dhkey_check(&self) -> Result<(), ErrorCode> {
        if self.base.link_type() != LinkType::Le {
            tracing::warn!("DHKey check received over a non-LE link");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if self.stage1.is_none() {
            tracing::warn!("DHKey check received before stage 1");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if self.peer_check != PeerDhKeyCheck::Awaiting {
            tracing::warn!("already received DHKey check");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if self.base.is_initiator() && !self.sent_local_check {
            tracing::warn!("initiator received DHKey check before sending its own");
            return Err(ErrorCode::UnspecifiedReason);
        }
        Ok(())
    }

    fn on_dhkey_check(&mut self, check: UInt128) {
        if let Err(code) = self.can_receive_dhkey_check() {
            self.base.abort(code);
            return;
        }
        if self.checks.is_none() {
            tracing::debug!("caching peer DHKey check until stage 2");
            self.peer_check = PeerDhKeyCheck::Pending(check);
            return;
        }
        self.validate_peer_check(check);
    }

    fn validate_peer_check(&mut self, check: UInt128) {
        let Some(checks) = self.checks else {
            self.base.abort(ErrorCode::UnspecifiedReason);
            return;
        };
        if !constant_time_eq(&checks.expected_peer, &check) {
            tracing::warn!(role = %self.base.role(), "DHKey check mismatch");
            self.base.abort(ErrorCode::DhKeyCheckFailed);
            return;
        }
        self.peer_check = PeerDhKeyCheck::Validated;

        if !self.base.is_initiator() {
            self.send_local_check();
        }
        self.complete();
    }

    fn complete(&mut self) {
        let Some(ltk) = self.ltk.as_ref() else {
            return;
        };
        let ltk = mask_to_key_size(**ltk, self.params.features.encryption_key_size);
        if let Some(on_ltk_ready) = self.on_ltk_ready.take() {
            tracing::info!(phase = %self.base.id(), "LTK ready");
            on_ltk_ready(ltk);
        }
    }

    fn on_stage1_frame(&mut self, command: Command) {
        let Some(stage) = self.stage1.as_mut() else {
            tracing::warn!(code = ?command.code(), "stage 1 frame before stage 1 started");
            self.base.abort(ErrorCode::UnspecifiedReason);
            return;
        };
        let result = match command {
            Command::PairingConfirm(confirm) => stage.on_pairing_confirm(&mut self.base, confirm),
            Command::PairingRandom(rand) => stage.on_pairing_random(&mut self.base, rand),
            _ => Err(ErrorCode::UnspecifiedReason),
        };
        self.on_stage1_progress(result);
    }
}

impl PairingPhase for SecureConnectionsPhase2 {
    fn start(&mut self) {
        self.base.mark_started();
        if self.base.is_initiator() {
            self.send_local_public_key();
        }
    }

    fn on_rx_frame(&mut self, pdu: &[u8]) {
        let Some(command) = self.base.parse_frame(pdu) else {
            return;
        };
        match command {
            Command::PairingPublicKey(params) => self.on_peer_public_key(params),
            Command::PairingConfirm(_) | Command::PairingRandom(_) => self.on_stage1_frame(command),
            Command::PairingDhKeyCheck(check) => self.on_dhkey_check(check),
            other => {
                tracing::warn!(code = ?other.code(), "unexpected command in secure connections phase 2");
                self.base.abort(ErrorCode::UnspecifiedReason);
            }
        }
    }

    fn on_user_confirm(&mut self, token: ConfirmToken, accepted: bool) {
        if !self.base.resume(token.0) {
            return;
        }
        let Some(stage) = self.stage1.as_mut() else {
            return;
        };
        let result = stage.on_user_confirm(&mut self.base, accepted);
        self.on_stage1_progress(result);
    }

    fn on_user_passkey(&mut self, token: PasskeyToken, passkey: i64) {
        if !self.base.resume(token.0) {
            return;
        }
        let Some(stage) = self.stage1.as_mut() else {
            return;
        };
        let result = stage.on_user_passkey(&mut self.base, passkey);
        self.on_stage1_progress(result);
    }

    fn base(&self) -> &PhaseBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PhaseBase {
        &mut self.base
    }
}
