// Per-particle random streams. The ensemble keeps one u64 of generator state
// per slot; a PrtlRng is the transient handle a kernel builds around that
// state, draws from, and writes back. No state is ever shared between slots.

use rand::{RngCore, SeedableRng};

use crate::Float;

const PRN_MULT: u64 = 6364136223846793005;
const PRN_ADD: u64 = 1442695040888963407;

/// PCG-style generator with a single u64 of state (LCG base, RXS-M-XS output
/// permutation). Small enough to live inline in the particle arrays.
#[derive(Clone, Copy, Debug)]
pub struct PrtlRng {
    state: u64,
}

impl PrtlRng {
    /// Rebuild a handle around state stored in the ensemble.
    #[inline]
    pub fn new(state: u64) -> PrtlRng {
        PrtlRng { state }
    }

    /// Expand a caller-supplied 32-bit seed into a starting state. The one
    /// LCG step scrambles neighbouring seeds apart before the first draw.
    #[inline]
    pub fn from_seed_u32(seed: u32) -> PrtlRng {
        PrtlRng {
            state: (seed as u64).wrapping_mul(PRN_MULT).wrapping_add(PRN_ADD),
        }
    }

    /// The state to store back into the particle slot.
    #[inline]
    pub fn state(&self) -> u64 {
        self.state
    }

    /// Uniform draw in [0, 1).
    #[inline(always)]
    pub fn uniform(&mut self) -> Float {
        // equivalent to ldexp(bits, -64)
        (self.next_u64() as f64 * 5.421010862427522e-20) as Float
    }
}

impl SeedableRng for PrtlRng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> PrtlRng {
        PrtlRng {
            state: u64::from_le_bytes(seed),
        }
    }
}

impl RngCore for PrtlRng {
    #[inline(always)]
    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    #[inline(always)]
    fn next_u64(&mut self) -> u64 {
        self.state = PRN_MULT.wrapping_mul(self.state).wrapping_add(PRN_ADD);
        let word = ((self.state >> ((self.state >> 59) + 5)) ^ self.state)
            .wrapping_mul(12605985483714917081);
        (word >> 43) ^ word
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = PrtlRng::from_seed_u32(42);
        let mut b = PrtlRng::from_seed_u32(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn neighbouring_seeds_diverge() {
        let mut a = PrtlRng::from_seed_u32(7);
        let mut b = PrtlRng::from_seed_u32(8);
        let draws_a: Vec<u64> = (0..8).map(|_| a.next_u64()).collect();
        let draws_b: Vec<u64> = (0..8).map(|_| b.next_u64()).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn uniform_stays_in_unit_interval() {
        let mut rng = PrtlRng::from_seed_u32(1234);
        for _ in 0..10_000 {
            let u = rng.uniform();
            assert!(u >= 0.0 && u < 1.0);
        }
    }

    #[test]
    fn state_round_trips_through_storage() {
        let mut a = PrtlRng::from_seed_u32(99);
        a.next_u64();
        let stored = a.state();
        let mut b = PrtlRng::new(stored);
        assert_eq!(a.next_u64(), b.next_u64());
    }
}
