//! Security Manager Protocol command codec.
//!
//! Every SMP PDU is a one-octet command code followed by a fixed-size
//! payload. Phase 2 only interprets the commands it can legally receive;
//! every other well-formed command decodes to [`Command::Other`] so the
//! phase can reject it as out of sequence.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ErrorCode, Result, StrandPairError};
use crate::types::{IoCapability, KeyDistGen, UInt128, UInt256};

/// SMP command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Code {
    PairingRequest = 0x01,
    PairingResponse = 0x02,
    PairingConfirm = 0x03,
    PairingRandom = 0x04,
    PairingFailed = 0x05,
    EncryptionInformation = 0x06,
    CentralIdentification = 0x07,
    IdentityInformation = 0x08,
    IdentityAddressInformation = 0x09,
    SigningInformation = 0x0A,
    SecurityRequest = 0x0B,
    PairingPublicKey = 0x0C,
    PairingDhKeyCheck = 0x0D,
    KeypressNotification = 0x0E,
}

impl TryFrom<u8> for Code {
    type Error = StrandPairError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Code::PairingRequest),
            0x02 => Ok(Code::PairingResponse),
            0x03 => Ok(Code::PairingConfirm),
            0x04 => Ok(Code::PairingRandom),
            0x05 => Ok(Code::PairingFailed),
            0x06 => Ok(Code::EncryptionInformation),
            0x07 => Ok(Code::CentralIdentification),
            0x08 => Ok(Code::IdentityInformation),
            0x09 => Ok(Code::IdentityAddressInformation),
            0x0A => Ok(Code::SigningInformation),
            0x0B => Ok(Code::SecurityRequest),
            0x0C => Ok(Code::PairingPublicKey),
            0x0D => Ok(Code::PairingDhKeyCheck),
            0x0E => Ok(Code::KeypressNotification),
            other => Err(StrandPairError::UnknownCode(other)),
        }
    }
}

impl Code {
    /// Exact payload size (excluding the code octet).
    pub fn payload_len(self) -> usize {
        match self {
            Code::PairingRequest | Code::PairingResponse => 6,
            Code::PairingConfirm | Code::PairingRandom => 16,
            Code::PairingFailed => 1,
            Code::EncryptionInformation => 16,
            Code::CentralIdentification => 10,
            Code::IdentityInformation => 16,
            Code::IdentityAddressInformation => 7,
            Code::SigningInformation => 16,
            Code::SecurityRequest => 1,
            Code::PairingPublicKey => 64,
            Code::PairingDhKeyCheck => 16,
            Code::KeypressNotification => 1,
        }
    }
}

/// Payload of a Pairing Public Key command. Both coordinates little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKeyParams {
    pub x: UInt256,
    pub y: UInt256,
}

/// A decoded SMP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PairingConfirm(UInt128),
    PairingRandom(UInt128),
    PairingFailed(ErrorCode),
    PairingPublicKey(PublicKeyParams),
    PairingDhKeyCheck(UInt128),
    /// A well-formed command Phase 2 never expects.
    Other { code: Code, payload: Bytes },
}

impl Command {
    pub fn code(&self) -> Code {
        match self {
            Command::PairingConfirm(_) => Code::PairingConfirm,
            Command::PairingRandom(_) => Code::PairingRandom,
            Command::PairingFailed(_) => Code::PairingFailed,
            Command::PairingPublicKey(_) => Code::PairingPublicKey,
            Command::PairingDhKeyCheck(_) => Code::PairingDhKeyCheck,
            Command::Other { code, .. } => *code,
        }
    }

    /// Encode this command into a PDU.
    pub fn encode(&self) -> Bytes {
        let code = self.code();
        let mut buf = BytesMut::with_capacity(1 + code.payload_len());
        buf.put_u8(code as u8);
        match self {
            Command::PairingConfirm(value)
            | Command::PairingRandom(value)
            | Command::PairingDhKeyCheck(value) => buf.put_slice(value),
            Command::PairingFailed(reason) => buf.put_u8(*reason as u8),
            Command::PairingPublicKey(key) => {
                buf.put_slice(&key.x);
                buf.put_slice(&key.y);
            }
            Command::Other { payload, .. } => buf.put_slice(payload),
        }
        buf.freeze()
    }

    /// Decode a PDU, validating the code and the exact payload length.
    pub fn decode(pdu: &[u8]) -> Result<Self> {
        let (&raw_code, payload) = pdu.split_first().ok_or(StrandPairError::EmptyFrame)?;
        let code = Code::try_from(raw_code)?;
        if payload.len() != code.payload_len() {
            return Err(StrandPairError::InvalidPayloadLength {
                code,
                expected: code.payload_len(),
                actual: payload.len(),
            });
        }

        let command = match code {
            Code::PairingConfirm => Command::PairingConfirm(to_array(payload)),
            Code::PairingRandom => Command::PairingRandom(to_array(payload)),
            Code::PairingDhKeyCheck => Command::PairingDhKeyCheck(to_array(payload)),
            Code::PairingPublicKey => Command::PairingPublicKey(PublicKeyParams {
                x: to_array(&payload[..32]),
                y: to_array(&payload[32..]),
            }),
            Code::PairingFailed => {
                let reason = ErrorCode::try_from(payload[0]).unwrap_or_else(|_| {
                    tracing::debug!(reason = payload[0], "peer sent reserved failure reason");
                    ErrorCode::UnspecifiedReason
                });
                Command::PairingFailed(reason)
            }
            other => Command::Other {
                code: other,
                payload: Bytes::copy_from_slice(payload),
            },
        };
        Ok(command)
    }
}

// Callers have already checked the length.
fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// Parameters of a Pairing Request or Pairing Response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingRequestParams {
    pub io_capability: IoCapability,
    pub oob_data_present: bool,
    pub auth_req: u8,
    pub max_encryption_key_size: u8,
    pub initiator_key_distribution: KeyDistGen,
    pub responder_key_distribution: KeyDistGen,
}

impl PairingRequestParams {
    /// Serialize as a complete 7-octet command with the given code.
    pub fn to_pdu(&self, code: Code) -> [u8; 7] {
        [
            code as u8,
            self.io_capability as u8,
            u8::from(self.oob_data_present),
            self.auth_req,
            self.max_encryption_key_size,
            self.initiator_key_distribution.0,
            self.responder_key_distribution.0,
        ]
    }
}

/// The `IOcap` input of f6 taken from a Pairing Request/Response PDU:
/// IO capability, OOB data flag then AuthReq (least significant first).
pub fn io_cap_from_pdu(pdu: &[u8; 7]) -> [u8; 3] {
    [pdu[1], pdu[2], pdu[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_confirm() {
        let mut pdu = vec![0x03];
        pdu.extend_from_slice(&[0x11; 16]);
        assert_eq!(Command::decode(&pdu).unwrap(), Command::PairingConfirm([0x11; 16]));
    }

    #[test]
    fn decode_public_key_splits_coordinates() {
        let mut pdu = vec![0x0C];
        pdu.extend_from_slice(&[0x01; 32]);
        pdu.extend_from_slice(&[0x02; 32]);
        match Command::decode(&pdu).unwrap() {
            Command::PairingPublicKey(key) => {
                assert_eq!(key.x, [0x01; 32]);
                assert_eq!(key.y, [0x02; 32]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_random_is_invalid_parameters() {
        let mut pdu = vec![0x04];
        pdu.extend_from_slice(&[0u8; 15]);
        let err = Command::decode(&pdu).unwrap_err();
        assert_eq!(
            err,
            StrandPairError::InvalidPayloadLength {
                code: Code::PairingRandom,
                expected: 16,
                actual: 15
            }
        );
        assert_eq!(err.error_code(), ErrorCode::InvalidParameters);
    }

    #[test]
    fn unknown_code_is_command_not_supported() {
        let err = Command::decode(&[0x7F, 0x00]).unwrap_err();
        assert_eq!(err, StrandPairError::UnknownCode(0x7F));
        assert_eq!(err.error_code(), ErrorCode::CommandNotSupported);
    }

    #[test]
    fn empty_pdu_rejected() {
        assert_eq!(Command::decode(&[]).unwrap_err(), StrandPairError::EmptyFrame);
    }

    #[test]
    fn reserved_failure_reason_reads_as_unspecified() {
        assert_eq!(
            Command::decode(&[0x05, 0xEE]).unwrap(),
            Command::PairingFailed(ErrorCode::UnspecifiedReason)
        );
    }

    #[test]
    fn other_commands_keep_their_payload() {
        let pdu = [0x0B, 0x2D];
        let cmd = Command::decode(&pdu).unwrap();
        assert_eq!(cmd.code(), Code::SecurityRequest);
        assert_eq!(&cmd.encode()[..], &pdu);
    }

    #[test]
    fn encode_failed() {
        let pdu = Command::PairingFailed(ErrorCode::DhKeyCheckFailed).encode();
        assert_eq!(&pdu[..], &[0x05, 0x0B]);
    }

    #[test]
    fn request_pdu_layout() {
        let params = PairingRequestParams {
            io_capability: IoCapability::KeyboardDisplay,
            oob_data_present: false,
            auth_req: 0x2D,
            max_encryption_key_size: 16,
            initiator_key_distribution: KeyDistGen::ENC_KEY,
            responder_key_distribution: KeyDistGen(0x03),
        };
        let pdu = params.to_pdu(Code::PairingRequest);
        assert_eq!(pdu, [0x01, 0x04, 0x00, 0x2D, 0x10, 0x01, 0x03]);
        assert_eq!(io_cap_from_pdu(&pdu), [0x04, 0x00, 0x2D]);
    }
}
