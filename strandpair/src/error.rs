// StrandPair error types

use std::fmt;

use thiserror::Error;

use crate::codec::Code;

/// Reason codes carried in a Pairing Failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    PasskeyEntryFailed = 0x01,
    OobNotAvailable = 0x02,
    AuthenticationRequirements = 0x03,
    ConfirmValueFailed = 0x04,
    PairingNotSupported = 0x05,
    EncryptionKeySize = 0x06,
    CommandNotSupported = 0x07,
    UnspecifiedReason = 0x08,
    RepeatedAttempts = 0x09,
    InvalidParameters = 0x0A,
    DhKeyCheckFailed = 0x0B,
    NumericComparisonFailed = 0x0C,
    BrEdrPairingInProgress = 0x0D,
    CrossTransportKeyDerivationNotAllowed = 0x0E,
    KeyRejected = 0x0F,
}

impl TryFrom<u8> for ErrorCode {
    type Error = StrandPairError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(ErrorCode::PasskeyEntryFailed),
            0x02 => Ok(ErrorCode::OobNotAvailable),
            0x03 => Ok(ErrorCode::AuthenticationRequirements),
            0x04 => Ok(ErrorCode::ConfirmValueFailed),
            0x05 => Ok(ErrorCode::PairingNotSupported),
            0x06 => Ok(ErrorCode::EncryptionKeySize),
            0x07 => Ok(ErrorCode::CommandNotSupported),
            0x08 => Ok(ErrorCode::UnspecifiedReason),
            0x09 => Ok(ErrorCode::RepeatedAttempts),
            0x0A => Ok(ErrorCode::InvalidParameters),
            0x0B => Ok(ErrorCode::DhKeyCheckFailed),
            0x0C => Ok(ErrorCode::NumericComparisonFailed),
            0x0D => Ok(ErrorCode::BrEdrPairingInProgress),
            0x0E => Ok(ErrorCode::CrossTransportKeyDerivationNotAllowed),
            0x0F => Ok(ErrorCode::KeyRejected),
            other => Err(StrandPairError::UnknownErrorCode(other)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::PasskeyEntryFailed => "passkey entry failed",
            ErrorCode::OobNotAvailable => "OOB not available",
            ErrorCode::AuthenticationRequirements => "authentication requirements",
            ErrorCode::ConfirmValueFailed => "confirm value failed",
            ErrorCode::PairingNotSupported => "pairing not supported",
            ErrorCode::EncryptionKeySize => "encryption key size",
            ErrorCode::CommandNotSupported => "command not supported",
            ErrorCode::UnspecifiedReason => "unspecified reason",
            ErrorCode::RepeatedAttempts => "repeated attempts",
            ErrorCode::InvalidParameters => "invalid parameters",
            ErrorCode::DhKeyCheckFailed => "DHKey check failed",
            ErrorCode::NumericComparisonFailed => "numeric comparison failed",
            ErrorCode::BrEdrPairingInProgress => "BR/EDR pairing in progress",
            ErrorCode::CrossTransportKeyDerivationNotAllowed => {
                "cross-transport key derivation not allowed"
            }
            ErrorCode::KeyRejected => "key rejected",
        };
        write!(f, "{name} (0x{:02x})", *self as u8)
    }
}

/// Outcome reported to `Listener::on_pairing_failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PairingError {
    /// Failure signalled by (or to) the peer with an SMP reason code.
    #[error("pairing failed: {0}")]
    Protocol(ErrorCode),

    /// The underlying link went away mid-pairing.
    #[error("link disconnected")]
    LinkDisconnected,
}

/// Decode and validation errors produced by the crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrandPairError {
    #[error("empty SMP frame")]
    EmptyFrame,

    #[error("unknown command code: 0x{0:02x}")]
    UnknownCode(u8),

    #[error("invalid payload length for {code:?}: expected {expected} bytes, got {actual}")]
    InvalidPayloadLength {
        code: Code,
        expected: usize,
        actual: usize,
    },

    #[error("unknown pairing failed reason: 0x{0:02x}")]
    UnknownErrorCode(u8),
}

impl StrandPairError {
    /// Reason code to report to the peer when this error aborts pairing.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            StrandPairError::UnknownCode(_) => ErrorCode::CommandNotSupported,
            StrandPairError::EmptyFrame
            | StrandPairError::InvalidPayloadLength { .. }
            | StrandPairError::UnknownErrorCode(_) => ErrorCode::InvalidParameters,
        }
    }
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, StrandPairError>;
