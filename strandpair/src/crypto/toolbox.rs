//! Security Manager cryptographic toolbox ([Vol 3] Part H, Section 2.2).
//!
//! Inputs and outputs are little-endian, as carried in SMP payloads. The
//! Core Specification defines these functions on most-significant-octet-first
//! values, so every function reverses on the way into AES and on the way out.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use cmac::{Cmac, Mac};
use zeroize::Zeroizing;

use crate::types::{DeviceAddress, UInt128, UInt256};

/// SALT used by f5 to derive T from the DHKey.
const F5_SALT: u128 = 0x6C88_8391_AAF5_A538_6037_0BDB_5A60_83BE;

/// keyID "btle".
const F5_KEY_ID: &[u8; 4] = b"btle";

/// Length, in bits, of the f5 output (MacKey || LTK).
const F5_LENGTH: u16 = 256;

fn reversed<const N: usize>(bytes: &[u8; N]) -> [u8; N] {
    let mut out = *bytes;
    out.reverse();
    out
}

fn xor(a: &UInt128, b: &UInt128) -> UInt128 {
    let mut out = [0u8; 16];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}

/// Security function e: AES-128 encryption of `data` under `key`.
pub fn e(key: &UInt128, data: &UInt128) -> UInt128 {
    let key = reversed(key);
    let cipher = Aes128::new(GenericArray::from_slice(&key));
    let mut block = GenericArray::clone_from_slice(&reversed(data));
    cipher.encrypt_block(&mut block);
    let mut out = [0u8; 16];
    out.copy_from_slice(&block);
    out.reverse();
    out
}

/// RFC 4493 AES-CMAC with a little-endian key over a message that is
/// already in most-significant-octet-first order.
fn aes_cmac(key: &UInt128, message: &[u8]) -> UInt128 {
    let key = Zeroizing::new(reversed(key));
    let mut mac = <Cmac<Aes128> as KeyInit>::new(GenericArray::from_slice(&*key));
    mac.update(message);
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; 16];
    out.copy_from_slice(&tag);
    out.reverse();
    out
}

/// Legacy confirm value generation function c1.
///
/// ```text
/// c1(k, r, preq, pres, iat, rat, ia, ra) = e(k, e(k, r XOR p1) XOR p2)
///   p1 = pres || preq || rat' || iat'
///   p2 = padding || ia || ra
/// ```
///
/// `preq` and `pres` are the full 7-octet Pairing Request/Response commands.
pub fn c1(
    tk: &UInt128,
    rand: &UInt128,
    preq: &[u8; 7],
    pres: &[u8; 7],
    initiator: &DeviceAddress,
    responder: &DeviceAddress,
) -> UInt128 {
    let mut p1 = [0u8; 16];
    p1[0] = initiator.kind().as_u8();
    p1[1] = responder.kind().as_u8();
    p1[2..9].copy_from_slice(preq);
    p1[9..16].copy_from_slice(pres);

    let mut p2 = [0u8; 16];
    p2[0..6].copy_from_slice(responder.value());
    p2[6..12].copy_from_slice(initiator.value());

    let step = e(tk, &xor(rand, &p1));
    e(tk, &xor(&step, &p2))
}

/// Legacy key generation function s1: `e(k, r1' || r2')` where r1' and r2'
/// are the least significant 64 bits of `r1` (responder random) and `r2`
/// (initiator random).
pub fn s1(tk: &UInt128, r1: &UInt128, r2: &UInt128) -> UInt128 {
    let mut r = [0u8; 16];
    r[..8].copy_from_slice(&r2[..8]);
    r[8..].copy_from_slice(&r1[..8]);
    e(tk, &r)
}

/// LE Secure Connections confirm value generation function f4.
pub fn f4(u: &UInt256, v: &UInt256, x: &UInt128, z: u8) -> UInt128 {
    let mut message = [0u8; 65];
    message[..32].copy_from_slice(&reversed(u));
    message[32..64].copy_from_slice(&reversed(v));
    message[64] = z;
    aes_cmac(x, &message)
}

/// Output of f5.
pub struct F5Results {
    pub mac_key: Zeroizing<UInt128>,
    pub ltk: Zeroizing<UInt128>,
}

/// LE Secure Connections key generation function f5.
pub fn f5(
    w: &UInt256,
    n1: &UInt128,
    n2: &UInt128,
    a1: &DeviceAddress,
    a2: &DeviceAddress,
) -> F5Results {
    let t = Zeroizing::new(aes_cmac(&F5_SALT.to_le_bytes(), &reversed(w)));

    let mut message = [0u8; 53];
    message[1..5].copy_from_slice(F5_KEY_ID);
    message[5..21].copy_from_slice(&reversed(n1));
    message[21..37].copy_from_slice(&reversed(n2));
    message[37..44].copy_from_slice(&a1.to_be_bytes());
    message[44..51].copy_from_slice(&a2.to_be_bytes());
    message[51..53].copy_from_slice(&F5_LENGTH.to_be_bytes());

    message[0] = 0;
    let mac_key = Zeroizing::new(aes_cmac(&t, &message));
    message[0] = 1;
    let ltk = Zeroizing::new(aes_cmac(&t, &message));
    F5Results { mac_key, ltk }
}

/// LE Secure Connections check value generation function f6.
///
/// `io_cap` is the IO capability, OOB data flag and AuthReq octets in that
/// order (see [`crate::codec::io_cap_from_pdu`]).
pub fn f6(
    w: &UInt128,
    n1: &UInt128,
    n2: &UInt128,
    r: &UInt128,
    io_cap: &[u8; 3],
    a1: &DeviceAddress,
    a2: &DeviceAddress,
) -> UInt128 {
    let mut message = [0u8; 65];
    message[..16].copy_from_slice(&reversed(n1));
    message[16..32].copy_from_slice(&reversed(n2));
    message[32..48].copy_from_slice(&reversed(r));
    message[48..51].copy_from_slice(&reversed(io_cap));
    message[51..58].copy_from_slice(&a1.to_be_bytes());
    message[58..65].copy_from_slice(&a2.to_be_bytes());
    aes_cmac(w, &message)
}

/// LE Secure Connections numeric comparison value generation function g2.
/// Returns the full 32-bit value; the displayed number is this mod 10^6.
pub fn g2(u: &UInt256, v: &UInt256, x: &UInt128, y: &UInt128) -> u32 {
    let mut message = [0u8; 80];
    message[..32].copy_from_slice(&reversed(u));
    message[32..64].copy_from_slice(&reversed(v));
    message[64..].copy_from_slice(&reversed(y));
    let out = aes_cmac(x, &message);
    u32::from_le_bytes([out[0], out[1], out[2], out[3]])
}
