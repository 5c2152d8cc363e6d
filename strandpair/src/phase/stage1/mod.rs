//! Secure Connections Phase 2, Stage 1: method-specific authentication.
//!
//! A stage never aborts on its own. Every handler returns a
//! [`Stage1Result`]: `Ok(None)` while more input is needed, `Ok(Some(_))`
//! once authentication is complete, `Err(code)` when the owning phase must
//! abort.

mod just_works;
mod passkey;

use crate::error::ErrorCode;
use crate::phase::PhaseBase;
use crate::types::{PairingMethod, UInt128, UInt256};

pub(crate) use just_works::JustWorksOrNumericComparison;
pub(crate) use passkey::PasskeyEntry;

/// What Stage 1 hands to Stage 2 (the f5/f6 inputs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage1Output {
    pub initiator_r: UInt128,
    pub responder_r: UInt128,
    pub initiator_rand: UInt128,
    pub responder_rand: UInt128,
}

pub(crate) type Stage1Result = Result<Option<Stage1Output>, ErrorCode>;

pub(crate) enum Stage1 {
    JustWorksOrNumericComparison(JustWorksOrNumericComparison),
    Passkey(PasskeyEntry),
}

impl Stage1 {
    /// Pick the stage for `method`; `None` for out-of-band.
    pub(crate) fn for_method(
        base: &mut PhaseBase,
        method: PairingMethod,
        local_x: UInt256,
        peer_x: UInt256,
    ) -> Option<Self> {
        match method {
            PairingMethod::JustWorks | PairingMethod::NumericComparison => Some(
                Stage1::JustWorksOrNumericComparison(JustWorksOrNumericComparison::new(
                    base, method, local_x, peer_x,
                )),
            ),
            PairingMethod::PasskeyEntryDisplay | PairingMethod::PasskeyEntryInput => {
                Some(Stage1::Passkey(PasskeyEntry::new(method, local_x, peer_x)))
            }
            PairingMethod::OutOfBand => None,
        }
    }

    pub(crate) fn run(&mut self, base: &mut PhaseBase) -> Stage1Result {
        match self {
            Stage1::JustWorksOrNumericComparison(stage) => stage.run(base),
            Stage1::Passkey(stage) => stage.run(base),
        }
    }

    pub(crate) fn on_pairing_confirm(
        &mut self,
        base: &mut PhaseBase,
        confirm: UInt128,
    ) -> Stage1Result {
        match self {
            Stage1::JustWorksOrNumericComparison(stage) => stage.on_pairing_confirm(base, confirm),
            Stage1::Passkey(stage) => stage.on_pairing_confirm(base, confirm),
        }
    }

    pub(crate) fn on_pairing_random(&mut self, base: &mut PhaseBase, rand: UInt128) -> Stage1Result {
        match self {
            Stage1::JustWorksOrNumericComparison(stage) => stage.on_pairing_random(base, rand),
            Stage1::Passkey(stage) => stage.on_pairing_random(base, rand),
        }
    }

    pub(crate) fn on_user_confirm(&mut self, base: &mut PhaseBase, accepted: bool) -> Stage1Result {
        match self {
            Stage1::JustWorksOrNumericComparison(stage) => stage.on_user_confirm(base, accepted),
            Stage1::Passkey(stage) => stage.on_user_confirm(base, accepted),
        }
    }

    pub(crate) fn on_user_passkey(&mut self, base: &mut PhaseBase, passkey: i64) -> Stage1Result {
        match self {
            Stage1::JustWorksOrNumericComparison(_) => {
                tracing::debug!("passkey answer has no meaning in just works stage 1");
                Ok(None)
            }
            Stage1::Passkey(stage) => stage.on_user_passkey(base, passkey),
        }
    }
}
