//! LE Legacy pairing Phase 2: TK acquisition, confirm/random exchange and
//! STK generation ([Vol 3] Part H, Section 2.3.5.5).

use std::rc::Weak;

use constant_time_eq::constant_time_eq;
use zeroize::Zeroizing;

use crate::channel::Channel;
use crate::codec::Command;
use crate::crypto::random::PASSKEY_LIMIT;
use crate::crypto::{toolbox, RandomSource};
use crate::error::ErrorCode;
use crate::listener::{ConfirmToken, DisplayMethod, Listener, PasskeyToken};
use crate::phase::{KeyReadyCallback, PairingPhase, PhaseBase};
use crate::types::{mask_to_key_size, PairingMethod, Phase2Params, UInt128};

/// Coarse progress of a [`LegacyPhase2`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyState {
    AwaitingTemporaryKey,
    ExchangingConfirm,
    ExchangingRandom,
    Complete,
    Failed,
}

/// Phase 2 of LE Legacy pairing. Produces the STK.
pub struct LegacyPhase2 {
    base: PhaseBase,
    params: Phase2Params,

    tk: Option<Zeroizing<UInt128>>,
    displayed_passkey: Option<u32>,

    local_rand: UInt128,
    local_confirm: Option<UInt128>,
    sent_local_confirm: bool,
    sent_local_rand: bool,

    peer_confirm: Option<UInt128>,
    peer_rand: Option<UInt128>,

    on_stk_ready: Option<KeyReadyCallback>,
}

impl LegacyPhase2 {
    /// Panics if `params` negotiated Secure Connections or Numeric
    /// Comparison, neither of which exists in Legacy pairing.
    pub fn new(
        channel: Weak<dyn Channel>,
        listener: Weak<dyn Listener>,
        params: Phase2Params,
        rng: RandomSource,
        on_stk_ready: impl FnOnce(UInt128) + 'static,
    ) -> Self {
        let features = &params.features;
        assert!(
            !features.secure_connections,
            "legacy phase 2 requires a legacy feature set"
        );
        assert!(
            features.method != PairingMethod::NumericComparison,
            "numeric comparison is not a legacy pairing method"
        );

        Self {
            base: PhaseBase::new(features.role(), channel, listener, rng),
            params,
            tk: None,
            displayed_passkey: None,
            local_rand: [0u8; 16],
            local_confirm: None,
            sent_local_confirm: false,
            sent_local_rand: false,
            peer_confirm: None,
            peer_rand: None,
            on_stk_ready: Some(Box::new(on_stk_ready)),
        }
    }

    pub fn state(&self) -> LegacyState {
        if self.base.has_failed() {
            LegacyState::Failed
        } else if self.on_stk_ready.is_none() {
            LegacyState::Complete
        } else if self.tk.is_none() {
            LegacyState::AwaitingTemporaryKey
        } else if self.sent_local_confirm && self.peer_confirm.is_some() {
            LegacyState::ExchangingRandom
        } else {
            LegacyState::ExchangingConfirm
        }
    }

    fn handle_temporary_key(&mut self, passkey: u32) {
        let mut tk = Zeroizing::new([0u8; 16]);
        tk[..4].copy_from_slice(&passkey.to_le_bytes());

        self.local_rand = self.base.rng().random_u128();
        self.local_confirm = Some(self.confirm_value(&tk, &self.local_rand));
        self.tk = Some(tk);

        // The responder only answers once the initiator's confirm is in.
        if self.base.is_initiator() || self.peer_confirm.is_some() {
            self.send_confirm();
        }
    }

    fn confirm_value(&self, tk: &UInt128, rand: &UInt128) -> UInt128 {
        toolbox::c1(
            tk,
            rand,
            &self.params.preq,
            &self.params.pres,
            &self.params.initiator_address,
            &self.params.responder_address,
        )
    }

    fn send_confirm(&mut self) {
        if let Some(confirm) = self.local_confirm {
            self.sent_local_confirm = true;
            self.base.send(Command::PairingConfirm(confirm));
        }
    }

    fn send_random(&mut self) {
        self.sent_local_rand = true;
        self.base.send(Command::PairingRandom(self.local_rand));
    }

    fn can_receive_confirm(&self) -> Result<(), ErrorCode> {
        if self.peer_confirm.is_some() {
            tracing::warn!(role = %self.base.role(), "already received pairing confirm");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if self.base.is_initiator() && !self.sent_local_confirm {
            tracing::warn!("initiator received confirm before sending its own");
            return Err(ErrorCode::UnspecifiedReason);
        }
        Ok(())
    }

    fn on_pairing_confirm(&mut self, confirm: UInt128) {
        if let Err(code) = self.can_receive_confirm() {
            self.base.abort(code);
            return;
        }
        self.peer_confirm = Some(confirm);

        if self.base.is_initiator() {
            self.send_random();
        } else if self.tk.is_some() {
            self.send_confirm();
        } else {
            tracing::debug!("caching peer confirm until the TK is known");
        }
    }

    fn can_receive_random(&self) -> Result<(), ErrorCode> {
        if self.tk.is_none() {
            tracing::warn!("received pairing random before the TK is known");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if !self.sent_local_confirm || self.peer_confirm.is_none() {
            tracing::warn!("received pairing random before confirm exchange");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if self.base.is_initiator() && !self.sent_local_rand {
            tracing::warn!("initiator received random before sending its own");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if self.peer_rand.is_some() {
            tracing::warn!(role = %self.base.role(), "already received pairing random");
            return Err(ErrorCode::UnspecifiedReason);
        }
        Ok(())
    }

    fn on_pairing_random(&mut self, rand: UInt128) {
        if let Err(code) = self.can_receive_random() {
            self.base.abort(code);
            return;
        }
        self.peer_rand = Some(rand);

        let (Some(tk), Some(peer_confirm)) = (self.tk.clone(), self.peer_confirm) else {
            self.base.abort(ErrorCode::UnspecifiedReason);
            return;
        };
        let expected = self.confirm_value(&tk, &rand);
        if !constant_time_eq(&expected, &peer_confirm) {
            tracing::warn!(role = %self.base.role(), "pairing confirm value mismatch");
            self.base.abort(ErrorCode::ConfirmValueFailed);
            return;
        }

        if !self.base.is_initiator() {
            self.send_random();
        }

        let (initiator_rand, responder_rand) = if self.base.is_initiator() {
            (self.local_rand, rand)
        } else {
            (rand, self.local_rand)
        };
        let stk = Zeroizing::new(toolbox::s1(&tk, &responder_rand, &initiator_rand));
        let stk = mask_to_key_size(*stk, self.params.features.encryption_key_size);

        if let Some(on_stk_ready) = self.on_stk_ready.take() {
            tracing::info!(phase = %self.base.id(), "STK ready");
            on_stk_ready(stk);
        }
    }
}

impl PairingPhase for LegacyPhase2 {
    fn start(&mut self) {
        self.base.mark_started();
        match self.params.features.method {
            PairingMethod::JustWorks => self.base.request_confirm(),
            PairingMethod::PasskeyEntryDisplay => {
                let passkey = self.base.rng().passkey();
                self.displayed_passkey = Some(passkey);
                self.base.request_display(passkey, DisplayMethod::PeerEntry);
            }
            PairingMethod::PasskeyEntryInput => self.base.request_passkey(),
            PairingMethod::OutOfBand => {
                tracing::warn!("out-of-band legacy pairing is not supported");
                self.base.abort(ErrorCode::CommandNotSupported);
            }
            PairingMethod::NumericComparison => unreachable!("rejected in LegacyPhase2::new"),
        }
    }

    fn on_rx_frame(&mut self, pdu: &[u8]) {
        let Some(command) = self.base.parse_frame(pdu) else {
            return;
        };
        match command {
            Command::PairingConfirm(confirm) => self.on_pairing_confirm(confirm),
            Command::PairingRandom(rand) => self.on_pairing_random(rand),
            other => {
                tracing::warn!(code = ?other.code(), "unexpected command in legacy phase 2");
                self.base.abort(ErrorCode::UnspecifiedReason);
            }
        }
    }

    fn on_user_confirm(&mut self, token: ConfirmToken, accepted: bool) {
        if !self.base.resume(token.0) {
            return;
        }
        match (self.params.features.method, accepted) {
            (PairingMethod::JustWorks, true) => self.handle_temporary_key(0),
            (PairingMethod::JustWorks, false) => {
                tracing::info!("user rejected just works pairing");
                self.base.abort(ErrorCode::UnspecifiedReason);
            }
            (PairingMethod::PasskeyEntryDisplay, true) => match self.displayed_passkey {
                Some(passkey) => self.handle_temporary_key(passkey),
                None => self.base.abort(ErrorCode::PasskeyEntryFailed),
            },
            (PairingMethod::PasskeyEntryDisplay, false) => {
                tracing::info!("user rejected passkey display");
                self.base.abort(ErrorCode::UnspecifiedReason);
            }
            (method, _) => {
                tracing::warn!(?method, "unexpected user confirmation in legacy phase 2");
                self.base.abort(ErrorCode::UnspecifiedReason);
            }
        }
    }

    fn on_user_passkey(&mut self, token: PasskeyToken, passkey: i64) {
        if !self.base.resume(token.0) {
            return;
        }
        match u32::try_from(passkey) {
            Ok(passkey) if passkey < PASSKEY_LIMIT => self.handle_temporary_key(passkey),
            _ => {
                tracing::info!(passkey, "passkey entry rejected");
                self.base.abort(ErrorCode::PasskeyEntryFailed);
            }
        }
    }

    fn base(&self) -> &PhaseBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PhaseBase {
        &mut self.base
    }
}
