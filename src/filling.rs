// Multi-bunch filling scheme: which RF bunch slots are occupied, and which
// contiguous block of bunches each worker rank owns. Computed once at setup
// and never mutated afterwards.

use crate::errors::{Error, Result};
use crate::Float;

/// Worker-rank counting capability; the only piece of the communicator the
/// partitioner needs.
pub trait Communicator {
    fn size(&self) -> usize;
}

/// Stand-in communicator for single-process runs and tests.
pub struct DummyCommunicator {
    pub n_procs: usize,
}

impl Communicator for DummyCommunicator {
    fn size(&self) -> usize {
        self.n_procs
    }
}

pub struct FillingScheme {
    /// rank -> ordered contiguous block of bunch indices (indices into the
    /// filled slots in ascending slot order).
    pub bunches_per_rank: Vec<Vec<usize>>,
    /// Occupied bunch slots in ascending order. Slot i sits at RF bucket
    /// `i * bunch_spacing_in_buckets`.
    pub filled_slots: Vec<usize>,
    pub bunch_spacing_in_buckets: usize,
    pub circumference: Float,
    pub harmonic_list: Vec<usize>,
}

impl FillingScheme {
    pub fn new(
        bunch_spacing_in_buckets: usize,
        filling_scheme_array: &[u8],
        communicator: &dyn Communicator,
        circumference: Float,
        harmonic_list: &[usize],
    ) -> Result<FillingScheme> {
        if bunch_spacing_in_buckets == 0 {
            return Err(Error::Config(
                "bunch spacing must be at least one bucket".to_string(),
            ));
        }
        let n_procs = communicator.size();
        if n_procs == 0 {
            return Err(Error::Config(
                "at least one worker rank is required".to_string(),
            ));
        }
        if !circumference.is_finite() || circumference <= 0.0 {
            return Err(Error::Config(format!(
                "circumference must be finite and positive, got {}",
                circumference
            )));
        }
        let harmonic = match harmonic_list.first() {
            Some(&h) => h,
            None => {
                return Err(Error::Config(
                    "harmonic list must not be empty".to_string(),
                ))
            }
        };
        // A pattern whose slots do not tile the ring at the declared spacing
        // would put bunches closer than the minimum spacing somewhere.
        if filling_scheme_array.len() * bunch_spacing_in_buckets != harmonic {
            return Err(Error::Config(format!(
                "{} bunch slots at a spacing of {} buckets do not fit harmonic number {}",
                filling_scheme_array.len(),
                bunch_spacing_in_buckets,
                harmonic
            )));
        }

        let mut filled_slots = Vec::new();
        for (slot, &occ) in filling_scheme_array.iter().enumerate() {
            match occ {
                0 => {}
                1 => filled_slots.push(slot),
                other => {
                    return Err(Error::Config(format!(
                        "occupancy must be 0 or 1, slot {} is {}",
                        slot, other
                    )))
                }
            }
        }

        let bunches_per_rank = partition(filled_slots.len(), n_procs);
        Ok(FillingScheme {
            bunches_per_rank,
            filled_slots,
            bunch_spacing_in_buckets,
            circumference,
            harmonic_list: harmonic_list.to_vec(),
        })
    }

    pub fn n_bunches(&self) -> usize {
        self.filled_slots.len()
    }

    /// Ring length of one RF bucket in meters.
    pub fn bucket_length(&self) -> Float {
        self.circumference / self.harmonic_list[0] as Float
    }

    /// Longitudinal position of each filled bunch along the ring, in meters.
    pub fn bunch_positions(&self) -> Vec<Float> {
        let spacing = self.bunch_spacing_in_buckets as Float * self.bucket_length();
        self.filled_slots
            .iter()
            .map(|&slot| slot as Float * spacing)
            .collect()
    }
}

/// Contiguous balanced blocks: floor(B/R) bunches per rank, with the first
/// B mod R ranks taking one extra. Deterministic for any execution order.
fn partition(n_bunches: usize, n_procs: usize) -> Vec<Vec<usize>> {
    let base = n_bunches / n_procs;
    let extra = n_bunches % n_procs;
    let mut out = Vec::with_capacity(n_procs);
    let mut next = 0;
    for rank in 0..n_procs {
        let len = base + if rank < extra { 1 } else { 0 };
        out.push((next..next + len).collect());
        next += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::partition;

    #[test]
    fn remainder_goes_to_leading_ranks() {
        let blocks = partition(10, 4);
        let lens: Vec<usize> = blocks.iter().map(|b| b.len()).collect();
        assert_eq!(lens, vec![3, 3, 2, 2]);
        assert_eq!(blocks[0], vec![0, 1, 2]);
        assert_eq!(blocks[3], vec![8, 9]);
    }

    #[test]
    fn more_ranks_than_bunches() {
        let blocks = partition(2, 5);
        let lens: Vec<usize> = blocks.iter().map(|b| b.len()).collect();
        assert_eq!(lens, vec![1, 1, 0, 0, 0]);
    }
}
