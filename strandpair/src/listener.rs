// User-interaction boundary of a pairing phase.
//
// Requests that wait on the user carry a token. The owner answers by routing
// the token back to the phase (directly or through `PhaseHost`); a token
// belonging to a failed, replaced or already-answered request is ignored.

use crate::error::PairingError;
use crate::phase::{PhaseId, ResumeToken};
use crate::types::DeviceAddress;

/// How a passkey passed to [`Listener::display_passkey`] is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayMethod {
    /// The user types the displayed value on the peer device.
    PeerEntry,
    /// The user compares the value with the one shown on the peer.
    Comparison,
}

/// Local identity information distributed in Phase 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityInfo {
    pub irk: [u8; 16],
    pub address: DeviceAddress,
}

/// Answer handle for [`Listener::confirm_pairing`] and
/// [`Listener::display_passkey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfirmToken(pub(crate) ResumeToken);

impl ConfirmToken {
    /// Phase that issued the request.
    pub fn phase(&self) -> PhaseId {
        self.0.phase
    }
}

/// Answer handle for [`Listener::request_passkey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PasskeyToken(pub(crate) ResumeToken);

impl PasskeyToken {
    pub fn phase(&self) -> PhaseId {
        self.0.phase
    }
}

/// Capability implemented by the pairing owner.
pub trait Listener {
    /// Synchronous poll for the local identity. Key distribution calls
    /// this; Phase 2 never does.
    fn on_identity_request(&self) -> Option<IdentityInfo>;

    /// Ask the user to accept pairing. Answer with
    /// `PairingPhase::on_user_confirm`.
    fn confirm_pairing(&self, token: ConfirmToken);

    /// Show `passkey` to the user. For [`DisplayMethod::Comparison`] the
    /// value is public and the user must accept or reject it.
    fn display_passkey(&self, passkey: u32, method: DisplayMethod, token: ConfirmToken);

    /// Ask the user to type a passkey. Answer with
    /// `PairingPhase::on_user_passkey`; a negative value means the user
    /// declined.
    fn request_passkey(&self, token: PasskeyToken);

    /// Terminal failure. The owner may drop the phase from within this call.
    fn on_pairing_failed(&self, error: PairingError);
}
