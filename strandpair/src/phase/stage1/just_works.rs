// Stage 1 for Just Works and Numeric Comparison ([Vol 3] Part H, 2.3.5.6.2).

use constant_time_eq::constant_time_eq;

use crate::codec::Command;
use crate::crypto::random::PASSKEY_LIMIT;
use crate::crypto::toolbox;
use crate::error::ErrorCode;
use crate::listener::DisplayMethod;
use crate::phase::stage1::{Stage1Output, Stage1Result};
use crate::phase::PhaseBase;
use crate::types::{PairingMethod, UInt128, UInt256};

pub(crate) struct JustWorksOrNumericComparison {
    method: PairingMethod,
    local_x: UInt256,
    peer_x: UInt256,
    local_rand: UInt128,
    sent_local_rand: bool,
    peer_confirm: Option<UInt128>,
    peer_rand: Option<UInt128>,
}

impl JustWorksOrNumericComparison {
    pub(crate) fn new(
        base: &mut PhaseBase,
        method: PairingMethod,
        local_x: UInt256,
        peer_x: UInt256,
    ) -> Self {
        debug_assert!(matches!(
            method,
            PairingMethod::JustWorks | PairingMethod::NumericComparison
        ));
        Self {
            method,
            local_x,
            peer_x,
            local_rand: base.rng().random_u128(),
            sent_local_rand: false,
            peer_confirm: None,
            peer_rand: None,
        }
    }

    /// Only the responder commits to its random up front.
    pub(crate) fn run(&mut self, base: &mut PhaseBase) -> Stage1Result {
        if !base.is_initiator() {
            let confirm = toolbox::f4(&self.local_x, &self.peer_x, &self.local_rand, 0);
            base.send(Command::PairingConfirm(confirm));
        }
        Ok(None)
    }

    pub(crate) fn on_pairing_confirm(
        &mut self,
        base: &mut PhaseBase,
        confirm: UInt128,
    ) -> Stage1Result {
        if !base.is_initiator() {
            tracing::warn!("responder received confirm in just works stage 1");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if self.peer_confirm.is_some() {
            tracing::warn!("already received confirm in just works stage 1");
            return Err(ErrorCode::UnspecifiedReason);
        }
        self.peer_confirm = Some(confirm);
        self.sent_local_rand = true;
        base.send(Command::PairingRandom(self.local_rand));
        Ok(None)
    }

    pub(crate) fn on_pairing_random(&mut self, base: &mut PhaseBase, rand: UInt128) -> Stage1Result {
        if self.peer_rand.is_some() {
            tracing::warn!("already received random in just works stage 1");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if base.is_initiator() {
            let Some(peer_confirm) = self.peer_confirm else {
                tracing::warn!("received random before confirm in just works stage 1");
                return Err(ErrorCode::UnspecifiedReason);
            };
            if !self.sent_local_rand {
                return Err(ErrorCode::UnspecifiedReason);
            }
            let expected = toolbox::f4(&self.peer_x, &self.local_x, &rand, 0);
            if !constant_time_eq(&expected, &peer_confirm) {
                tracing::warn!("stage 1 confirm value mismatch");
                return Err(ErrorCode::ConfirmValueFailed);
            }
        } else {
            self.sent_local_rand = true;
            base.send(Command::PairingRandom(self.local_rand));
        }
        self.peer_rand = Some(rand);

        match self.method {
            PairingMethod::NumericComparison => {
                let (ia_x, ra_x) = ordered(base, self.local_x, self.peer_x);
                let (na, nb) = ordered(base, self.local_rand, rand);
                let value = toolbox::g2(&ia_x, &ra_x, &na, &nb) % PASSKEY_LIMIT;
                base.request_display(value, DisplayMethod::Comparison);
            }
            _ => base.request_confirm(),
        }
        Ok(None)
    }

    pub(crate) fn on_user_confirm(&mut self, base: &PhaseBase, accepted: bool) -> Stage1Result {
        if !accepted {
            tracing::info!(method = ?self.method, "user rejected pairing");
            return Err(match self.method {
                PairingMethod::NumericComparison => ErrorCode::NumericComparisonFailed,
                _ => ErrorCode::UnspecifiedReason,
            });
        }
        let Some(peer_rand) = self.peer_rand else {
            return Err(ErrorCode::UnspecifiedReason);
        };
        let (initiator_rand, responder_rand) = ordered(base, self.local_rand, peer_rand);
        Ok(Some(Stage1Output {
            initiator_r: [0u8; 16],
            responder_r: [0u8; 16],
            initiator_rand,
            responder_rand,
        }))
    }
}

/// (initiator's value, responder's value).
fn ordered<T>(base: &PhaseBase, local: T, peer: T) -> (T, T) {
    if base.is_initiator() {
        (local, peer)
    } else {
        (peer, local)
    }
}
