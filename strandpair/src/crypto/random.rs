// Random source for nonces, passkeys and key pairs.

use std::fmt;

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use rand_core::CryptoRngCore;

use crate::types::UInt128;

/// Upper bound (exclusive) of a six-digit passkey.
pub const PASSKEY_LIMIT: u32 = 1_000_000;

/// A cryptographically secure random generator owned by one pairing phase.
///
/// Production code uses [`RandomSource::os`]; tests inject a seeded
/// generator through [`RandomSource::from_rng`].
pub struct RandomSource {
    rng: Box<dyn CryptoRngCore>,
}

impl RandomSource {
    /// Draw from the operating system CSPRNG.
    pub fn os() -> Self {
        Self::from_rng(OsRng)
    }

    /// Wrap any cryptographically secure generator.
    pub fn from_rng<R: CryptoRngCore + 'static>(rng: R) -> Self {
        Self { rng: Box::new(rng) }
    }

    /// A fresh 128-bit random value.
    pub fn random_u128(&mut self) -> UInt128 {
        let mut out = [0u8; 16];
        self.rng.fill_bytes(&mut out);
        out
    }

    /// A uniformly distributed six-digit passkey.
    pub fn passkey(&mut self) -> u32 {
        self.rng.gen_range(0..PASSKEY_LIMIT)
    }

    pub(crate) fn as_rng(&mut self) -> &mut dyn CryptoRngCore {
        &mut *self.rng
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::os()
    }
}

impl fmt::Debug for RandomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomSource").finish_non_exhaustive()
    }
}
