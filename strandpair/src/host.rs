// Owner-side slot for the active pairing phase.
//
// Frames, user answers and channel closure reach a phase only through its
// `PhaseId`. Once a phase is torn down, replaced or has failed, events that
// still name it are dropped instead of being dispatched.

use bytes::Bytes;

use crate::listener::{ConfirmToken, PasskeyToken};
use crate::phase::{PairingPhase, PhaseId};

/// An input addressed to one phase instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    Frame { phase: PhaseId, pdu: Bytes },
    Confirm { token: ConfirmToken, accepted: bool },
    Passkey { token: PasskeyToken, value: i64 },
    ChannelClosed { phase: PhaseId },
}

impl PhaseEvent {
    pub fn phase(&self) -> PhaseId {
        match self {
            PhaseEvent::Frame { phase, .. } | PhaseEvent::ChannelClosed { phase } => *phase,
            PhaseEvent::Confirm { token, .. } => token.phase(),
            PhaseEvent::Passkey { token, .. } => token.phase(),
        }
    }
}

/// Holds at most one phase and routes events to it.
#[derive(Default)]
pub struct PhaseHost {
    phase: Option<Box<dyn PairingPhase>>,
}

impl PhaseHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `phase`, dropping any previous one.
    pub fn install(&mut self, phase: Box<dyn PairingPhase>) -> PhaseId {
        let id = phase.id();
        if let Some(old) = self.phase.replace(phase) {
            tracing::debug!(old = %old.id(), new = %id, "replacing pairing phase");
        }
        id
    }

    pub fn current(&self) -> Option<PhaseId> {
        self.phase.as_ref().map(|phase| phase.id())
    }

    pub fn phase(&self) -> Option<&dyn PairingPhase> {
        self.phase.as_deref()
    }

    /// Drop the active phase. Returns whether there was one.
    pub fn teardown(&mut self) -> bool {
        match self.phase.take() {
            Some(phase) => {
                tracing::debug!(phase = %phase.id(), "tearing down pairing phase");
                true
            }
            None => false,
        }
    }

    /// Start the phase named `id` if it is still installed.
    pub fn start(&mut self, id: PhaseId) -> bool {
        let Some(phase) = self.active(id) else {
            return false;
        };
        phase.start();
        self.reap();
        true
    }

    /// Deliver `event`. Returns `false` if its phase is no longer installed.
    pub fn handle(&mut self, event: PhaseEvent) -> bool {
        let Some(phase) = self.active(event.phase()) else {
            tracing::trace!(phase = %event.phase(), "dropping event for inactive phase");
            return false;
        };
        match event {
            PhaseEvent::Frame { pdu, .. } => phase.on_rx_frame(&pdu),
            PhaseEvent::Confirm { token, accepted } => phase.on_user_confirm(token, accepted),
            PhaseEvent::Passkey { token, value } => phase.on_user_passkey(token, value),
            PhaseEvent::ChannelClosed { .. } => phase.on_channel_closed(),
        }
        self.reap();
        true
    }

    fn active(&mut self, id: PhaseId) -> Option<&mut Box<dyn PairingPhase>> {
        self.phase.as_mut().filter(|phase| phase.id() == id)
    }

    fn reap(&mut self) {
        if self.phase.as_ref().is_some_and(|phase| phase.has_failed()) {
            self.teardown();
        }
    }
}
