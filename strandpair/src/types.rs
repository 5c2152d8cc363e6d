// Data model shared by every Phase 2 component.
//
// All multi-byte values are little-endian byte arrays, exactly as they are
// carried in SMP payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 128-bit value: randoms, confirm values, DHKey checks, TK/STK/LTK.
pub type UInt128 = [u8; 16];

/// 256-bit value: P-256 coordinates and the DHKey.
pub type UInt256 = [u8; 32];

/// Largest encryption key size, in bytes.
pub const MAX_ENCRYPTION_KEY_SIZE: u8 = 16;

/// Smallest encryption key size the Security Manager accepts, in bytes.
pub const MIN_ENCRYPTION_KEY_SIZE: u8 = 7;

/// Which side of the pairing this device plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Initiator,
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

/// Association model selected during feature exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PairingMethod {
    JustWorks,
    NumericComparison,
    /// Local device displays the passkey, peer enters it.
    PasskeyEntryDisplay,
    /// Local device asks the user to type the passkey.
    PasskeyEntryInput,
    OutOfBand,
}

impl PairingMethod {
    pub fn is_passkey_entry(self) -> bool {
        matches!(
            self,
            PairingMethod::PasskeyEntryDisplay | PairingMethod::PasskeyEntryInput
        )
    }
}

/// IO capability advertised in the Pairing Request/Response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IoCapability {
    DisplayOnly = 0x00,
    DisplayYesNo = 0x01,
    KeyboardOnly = 0x02,
    NoInputNoOutput = 0x03,
    KeyboardDisplay = 0x04,
}

/// Key distribution bits of the Pairing Request/Response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyDistGen(pub u8);

impl KeyDistGen {
    pub const NONE: Self = Self(0x00);
    pub const ENC_KEY: Self = Self(0x01);
    pub const ID_KEY: Self = Self(0x02);
    pub const SIGN_KEY: Self = Self(0x04);
    pub const LINK_KEY: Self = Self(0x08);

    pub fn contains(self, flag: KeyDistGen) -> bool {
        (self.0 & flag.0) == flag.0
    }
}

/// Result of Phase 1. Immutable for the lifetime of a Phase 2 instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingFeatures {
    /// True if the local device is the pairing initiator.
    pub initiator: bool,
    /// True if LE Secure Connections was negotiated.
    pub secure_connections: bool,
    /// True if both sides asked for bonding.
    pub will_bond: bool,
    pub method: PairingMethod,
    /// Negotiated key size in bytes (7..=16).
    pub encryption_key_size: u8,
    /// Keys the local device distributes in Phase 3.
    pub local_key_distribution: KeyDistGen,
    /// Keys the peer distributes in Phase 3.
    pub remote_key_distribution: KeyDistGen,
}

impl PairingFeatures {
    pub fn role(&self) -> Role {
        if self.initiator {
            Role::Initiator
        } else {
            Role::Responder
        }
    }
}

/// Public or random device address type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    Public,
    Random,
}

impl AddressKind {
    /// Value used for `iat'`/`rat'` and the address type octet of f5/f6.
    pub fn as_u8(self) -> u8 {
        match self {
            AddressKind::Public => 0x00,
            AddressKind::Random => 0x01,
        }
    }
}

/// 48-bit LE device address plus its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    kind: AddressKind,
    /// Little-endian, as carried over the air.
    value: [u8; 6],
}

impl DeviceAddress {
    pub fn new(kind: AddressKind, value: [u8; 6]) -> Self {
        Self { kind, value }
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    /// Address octets, least significant first.
    pub fn value(&self) -> &[u8; 6] {
        &self.value
    }

    /// 56-bit type-prefixed address, most significant octet first, as fed
    /// to the AES-CMAC functions.
    pub fn to_be_bytes(&self) -> [u8; 7] {
        let mut out = [0u8; 7];
        out[0] = self.kind.as_u8();
        for (dst, src) in out[1..].iter_mut().zip(self.value.iter().rev()) {
            *dst = *src;
        }
        out
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = &self.value;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X} ({:?})",
            v[5], v[4], v[3], v[2], v[1], v[0], self.kind
        )
    }
}

/// Everything a Phase 2 instance needs from the session that owns it.
///
/// `preq` and `pres` are the complete 7-octet Pairing Request and Pairing
/// Response commands (code included) exchanged in Phase 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase2Params {
    pub features: PairingFeatures,
    pub preq: [u8; 7],
    pub pres: [u8; 7],
    pub initiator_address: DeviceAddress,
    pub responder_address: DeviceAddress,
}

/// Zero the octets of `key` beyond the negotiated key size.
pub(crate) fn mask_to_key_size(mut key: UInt128, key_size: u8) -> UInt128 {
    let size = usize::from(key_size.clamp(MIN_ENCRYPTION_KEY_SIZE, MAX_ENCRYPTION_KEY_SIZE));
    key[size..].fill(0);
    key
}
