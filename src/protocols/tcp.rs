//! The Transmission Control Protocol: the pure [`tcb`] engine, the
//! wire header codec, and the ring-buffered socket the stack drives.

pub mod tcb;
pub mod tcp_parsing;
pub mod tcp_socket;

use rand::{rngs::SmallRng, RngCore, SeedableRng};

/// The initial send sequence of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Iss {
    /// Drawn from entropy, as a live stack should.
    #[default]
    Random,
    /// Exactly this value. Tests and scripted exchanges want
    /// predictable sequence numbers.
    Fixed(u32),
    /// Drawn from a deterministic generator seeded with the value.
    FromSeed(u64),
}

impl From<Iss> for u32 {
    fn from(iss: Iss) -> Self {
        match iss {
            Iss::Random => SmallRng::from_entropy().next_u32(),
            Iss::Fixed(value) => value,
            Iss::FromSeed(seed) => SmallRng::seed_from_u64(seed).next_u32(),
        }
    }
}
