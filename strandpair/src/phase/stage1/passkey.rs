// Stage 1 for Passkey Entry ([Vol 3] Part H, 2.3.5.6.3).
//
// Twenty commitment rounds, one per passkey bit, least significant first.

use constant_time_eq::constant_time_eq;

use crate::codec::Command;
use crate::crypto::random::PASSKEY_LIMIT;
use crate::crypto::toolbox;
use crate::error::ErrorCode;
use crate::listener::DisplayMethod;
use crate::phase::stage1::{Stage1Output, Stage1Result};
use crate::phase::PhaseBase;
use crate::types::{PairingMethod, UInt128, UInt256};

/// Number of confirm/random rounds, one per bit of a six-digit passkey.
pub const PASSKEY_ROUNDS: u8 = 20;

fn round_bit(passkey: u32, round: u8) -> u8 {
    if (passkey >> round) & 1 == 1 {
        0x81
    } else {
        0x80
    }
}

pub(crate) struct PasskeyEntry {
    method: PairingMethod,
    local_x: UInt256,
    peer_x: UInt256,
    displayed_passkey: Option<u32>,
    passkey: Option<u32>,

    round: u8,
    local_rand: UInt128,
    local_confirm: Option<UInt128>,
    sent_local_confirm: bool,
    sent_local_rand: bool,
    peer_confirm: Option<UInt128>,
    peer_rand: Option<UInt128>,
}

impl PasskeyEntry {
    pub(crate) fn new(method: PairingMethod, local_x: UInt256, peer_x: UInt256) -> Self {
        debug_assert!(method.is_passkey_entry());
        Self {
            method,
            local_x,
            peer_x,
            displayed_passkey: None,
            passkey: None,
            round: 0,
            local_rand: [0u8; 16],
            local_confirm: None,
            sent_local_confirm: false,
            sent_local_rand: false,
            peer_confirm: None,
            peer_rand: None,
        }
    }

    pub(crate) fn run(&mut self, base: &mut PhaseBase) -> Stage1Result {
        if self.method == PairingMethod::PasskeyEntryDisplay {
            let passkey = base.rng().passkey();
            self.displayed_passkey = Some(passkey);
            base.request_display(passkey, DisplayMethod::PeerEntry);
        } else {
            base.request_passkey();
        }
        Ok(None)
    }

    pub(crate) fn on_user_confirm(&mut self, base: &mut PhaseBase, accepted: bool) -> Stage1Result {
        match self.displayed_passkey {
            Some(passkey) if accepted => {
                self.passkey = Some(passkey);
                self.start_round(base)
            }
            _ => {
                tracing::info!("user rejected passkey display");
                Err(ErrorCode::PasskeyEntryFailed)
            }
        }
    }

    pub(crate) fn on_user_passkey(&mut self, base: &mut PhaseBase, passkey: i64) -> Stage1Result {
        match u32::try_from(passkey) {
            Ok(passkey) if passkey < PASSKEY_LIMIT => {
                self.passkey = Some(passkey);
                self.start_round(base)
            }
            _ => {
                tracing::info!(passkey, "passkey entry rejected");
                Err(ErrorCode::PasskeyEntryFailed)
            }
        }
    }

    fn start_round(&mut self, base: &mut PhaseBase) -> Stage1Result {
        let Some(passkey) = self.passkey else {
            return Ok(None);
        };
        self.local_rand = base.rng().random_u128();
        self.sent_local_confirm = false;
        self.sent_local_rand = false;
        self.local_confirm = Some(toolbox::f4(
            &self.local_x,
            &self.peer_x,
            &self.local_rand,
            round_bit(passkey, self.round),
        ));
        tracing::trace!(round = self.round, "passkey round started");

        // A responder may already hold the initiator's confirm.
        if base.is_initiator() || self.peer_confirm.is_some() {
            self.send_confirm(base);
        }
        Ok(None)
    }

    fn send_confirm(&mut self, base: &mut PhaseBase) {
        if let Some(confirm) = self.local_confirm {
            self.sent_local_confirm = true;
            base.send(Command::PairingConfirm(confirm));
        }
    }

    fn send_random(&mut self, base: &mut PhaseBase) {
        self.sent_local_rand = true;
        base.send(Command::PairingRandom(self.local_rand));
    }

    pub(crate) fn on_pairing_confirm(
        &mut self,
        base: &mut PhaseBase,
        confirm: UInt128,
    ) -> Stage1Result {
        if self.round >= PASSKEY_ROUNDS {
            tracing::warn!("received confirm after passkey stage 1 completed");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if self.peer_confirm.is_some() {
            tracing::warn!(round = self.round, "already received confirm this round");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if self.sent_local_rand || self.peer_rand.is_some() {
            tracing::warn!(round = self.round, "received confirm after random exchange began");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if base.is_initiator() && !self.sent_local_confirm {
            tracing::warn!(round = self.round, "initiator received confirm before sending its own");
            return Err(ErrorCode::UnspecifiedReason);
        }
        self.peer_confirm = Some(confirm);

        if base.is_initiator() {
            self.send_random(base);
        } else if self.local_confirm.is_some() {
            self.send_confirm(base);
        } else {
            tracing::debug!("caching peer confirm until the passkey is known");
        }
        Ok(None)
    }

    pub(crate) fn on_pairing_random(&mut self, base: &mut PhaseBase, rand: UInt128) -> Stage1Result {
        if self.round >= PASSKEY_ROUNDS {
            tracing::warn!("received random after passkey stage 1 completed");
            return Err(ErrorCode::UnspecifiedReason);
        }
        let (Some(passkey), Some(peer_confirm)) = (self.passkey, self.peer_confirm) else {
            tracing::warn!(round = self.round, "received random before confirm exchange");
            return Err(ErrorCode::UnspecifiedReason);
        };
        if !self.sent_local_confirm {
            tracing::warn!(round = self.round, "received random before confirm exchange");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if self.peer_rand.is_some() {
            tracing::warn!(round = self.round, "already received random this round");
            return Err(ErrorCode::UnspecifiedReason);
        }
        if base.is_initiator() && !self.sent_local_rand {
            tracing::warn!(round = self.round, "initiator received random before sending its own");
            return Err(ErrorCode::UnspecifiedReason);
        }

        let expected = toolbox::f4(&self.peer_x, &self.local_x, &rand, round_bit(passkey, self.round));
        if !constant_time_eq(&expected, &peer_confirm) {
            tracing::warn!(round = self.round, "passkey confirm value mismatch");
            return Err(ErrorCode::ConfirmValueFailed);
        }
        self.peer_rand = Some(rand);

        if !base.is_initiator() {
            self.send_random(base);
        }

        self.round += 1;
        if self.round < PASSKEY_ROUNDS {
            self.peer_confirm = None;
            self.peer_rand = None;
            return self.start_round(base);
        }

        let mut r = [0u8; 16];
        r[..4].copy_from_slice(&passkey.to_le_bytes());
        let (initiator_rand, responder_rand) = if base.is_initiator() {
            (self.local_rand, rand)
        } else {
            (rand, self.local_rand)
        };
        Ok(Some(Stage1Output {
            initiator_r: r,
            responder_r: r,
            initiator_rand,
            responder_rand,
        }))
    }
}
