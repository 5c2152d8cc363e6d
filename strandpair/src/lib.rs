// StrandPair: Bluetooth LE Security Manager Phase 2 key agreement.
//
// Crate root: module declarations and public re-exports.
//
// Phase 2 turns the outcome of feature negotiation into a shared key: an STK
// for LE Legacy pairing or an LTK for LE Secure Connections pairing.

pub mod channel;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod host;
pub mod listener;
pub mod phase;
pub mod types;

// Re-export key types at crate root for convenience.
pub use channel::{Channel, LinkType};
pub use error::{ErrorCode, PairingError, Result, StrandPairError};
pub use host::{PhaseEvent, PhaseHost};
pub use listener::{ConfirmToken, DisplayMethod, IdentityInfo, Listener, PasskeyToken};
pub use phase::legacy::{LegacyPhase2, LegacyState};
pub use phase::secure_connections::{ScState, SecureConnectionsPhase2};
pub use phase::stage1::Stage1Output;
pub use phase::{PairingPhase, PhaseBase, PhaseId};
pub use types::{
    AddressKind, DeviceAddress, IoCapability, KeyDistGen, PairingFeatures, PairingMethod,
    Phase2Params, Role, UInt128, UInt256,
};
