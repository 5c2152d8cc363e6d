//! Cryptographic building blocks of Phase 2: the Security Manager toolbox
//! functions, P-256 key handling and the injected random source.

pub mod ecdh;
pub mod random;
pub mod toolbox;

pub use ecdh::{EcdhKey, LocalEcdhKey};
pub use random::RandomSource;
