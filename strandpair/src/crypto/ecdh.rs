// P-256 public keys as exchanged in Pairing Public Key commands, and the
// local key pair used for the LE Secure Connections DHKey.

use p256::elliptic_curve::sec1::{Coordinates, FromEncodedPoint, ToEncodedPoint};
use p256::{ecdh, EncodedPoint, FieldBytes, PublicKey, SecretKey};
use zeroize::Zeroizing;

use crate::codec::PublicKeyParams;
use crate::crypto::random::RandomSource;
use crate::types::UInt256;

fn reversed(bytes: &UInt256) -> UInt256 {
    let mut out = *bytes;
    out.reverse();
    out
}

/// A validated P-256 public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdhKey {
    key: PublicKey,
}

impl EcdhKey {
    /// Parse the little-endian coordinates of a Pairing Public Key payload.
    /// Returns `None` if the point is not on the curve.
    pub fn parse_from_public_key(params: &PublicKeyParams) -> Option<Self> {
        let x = reversed(&params.x);
        let y = reversed(&params.y);
        let point = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&x),
            FieldBytes::from_slice(&y),
            false,
        );
        Option::<PublicKey>::from(PublicKey::from_encoded_point(&point)).map(|key| Self { key })
    }

    /// Wire form of the key.
    pub fn serialized_public_key(&self) -> PublicKeyParams {
        let point = self.key.to_encoded_point(false);
        match point.coordinates() {
            Coordinates::Uncompressed { x, y } => {
                let mut params = PublicKeyParams {
                    x: [0u8; 32],
                    y: [0u8; 32],
                };
                params.x.copy_from_slice(x);
                params.y.copy_from_slice(y);
                params.x.reverse();
                params.y.reverse();
                params
            }
            _ => unreachable!("uncompressed encoding requested"),
        }
    }

    /// X coordinate, little-endian. Input to f4 and g2.
    pub fn public_key_x(&self) -> UInt256 {
        self.serialized_public_key().x
    }

    /// Y coordinate, little-endian.
    pub fn public_key_y(&self) -> UInt256 {
        self.serialized_public_key().y
    }
}

/// The local P-256 key pair of one Secure Connections pairing.
pub struct LocalEcdhKey {
    secret: SecretKey,
    public: EcdhKey,
}

impl LocalEcdhKey {
    /// Generate a fresh key pair.
    pub fn generate(rng: &mut RandomSource) -> Self {
        let mut rng = rng.as_rng();
        let secret = SecretKey::random(&mut rng);
        Self::from_secret(secret)
    }

    /// Rebuild a key pair from a big-endian private scalar (used for the
    /// Core Specification sample data and deterministic tests).
    pub fn from_private_key(scalar: &UInt256) -> Option<Self> {
        SecretKey::from_bytes(FieldBytes::from_slice(scalar))
            .ok()
            .map(Self::from_secret)
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = EcdhKey {
            key: secret.public_key(),
        };
        Self { secret, public }
    }

    pub fn public_key(&self) -> &EcdhKey {
        &self.public
    }

    /// Compute the little-endian DHKey with `peer`. Returns `None` if the
    /// peer key is our own public key reflected back.
    pub fn calculate_dh_key(&self, peer: &EcdhKey) -> Option<Zeroizing<UInt256>> {
        if *peer == self.public {
            return None;
        }
        let shared = ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.key.as_affine());
        let mut dh_key = Zeroizing::new([0u8; 32]);
        dh_key.copy_from_slice(shared.raw_secret_bytes());
        dh_key.reverse();
        Some(dh_key)
    }
}
