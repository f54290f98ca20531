use beam_rs::filling::{DummyCommunicator, FillingScheme};
use beam_rs::Error;

// LHC-like ring: 35640 buckets, 25 ns bunch slots every 10 buckets.
const CIRCUMFERENCE: f64 = 26658.8832;
const HARMONIC: usize = 35640;
const SPACING: usize = 10;

fn lhc_pattern(n_filled: usize) -> Vec<u8> {
    let mut pattern = vec![0u8; HARMONIC / SPACING];
    for slot in pattern.iter_mut().take(n_filled) {
        *slot = 1;
    }
    pattern
}

fn scheme(pattern: &[u8], n_procs: usize) -> Result<FillingScheme, Error> {
    FillingScheme::new(
        SPACING,
        pattern,
        &DummyCommunicator { n_procs },
        CIRCUMFERENCE as beam_rs::Float,
        &[HARMONIC],
    )
}

#[test]
fn hundred_bunches_over_three_ranks() {
    let fs = scheme(&lhc_pattern(100), 3).unwrap();

    assert_eq!(fs.n_bunches(), 100);
    assert_eq!(fs.bunches_per_rank.len(), 3);
    assert_eq!(fs.bunches_per_rank[0], (0..=33).collect::<Vec<usize>>());
    assert_eq!(fs.bunches_per_rank[1], (34..=66).collect::<Vec<usize>>());
    assert_eq!(fs.bunches_per_rank[2], (67..=99).collect::<Vec<usize>>());

    // concatenation covers every bunch exactly once, in order
    let all: Vec<usize> = fs.bunches_per_rank.iter().flatten().copied().collect();
    assert_eq!(all, (0..100).collect::<Vec<usize>>());
}

#[test]
fn partition_lengths_always_sum_to_the_bunch_count() {
    // a gappy pattern: every third slot filled
    let mut pattern = vec![0u8; HARMONIC / SPACING];
    for (slot, occ) in pattern.iter_mut().enumerate() {
        if slot % 3 == 0 {
            *occ = 1;
        }
    }
    let n_bunches = pattern.iter().filter(|&&o| o == 1).count();

    for n_procs in 1..=8 {
        let fs = scheme(&pattern, n_procs).unwrap();
        let total: usize = fs.bunches_per_rank.iter().map(|b| b.len()).sum();
        assert_eq!(total, n_bunches);
        // blocks are contiguous and non-overlapping
        let all: Vec<usize> = fs.bunches_per_rank.iter().flatten().copied().collect();
        assert_eq!(all, (0..n_bunches).collect::<Vec<usize>>());
    }
}

#[test]
fn empty_pattern_still_partitions() {
    let fs = scheme(&lhc_pattern(0), 4).unwrap();
    assert_eq!(fs.n_bunches(), 0);
    assert!(fs.bunches_per_rank.iter().all(|b| b.is_empty()));
}

#[test]
fn filled_slots_map_to_ring_positions() {
    let fs = scheme(&lhc_pattern(3), 1).unwrap();
    assert_eq!(fs.filled_slots, vec![0, 1, 2]);
    let bucket = CIRCUMFERENCE / HARMONIC as f64;
    let positions = fs.bunch_positions();
    assert!((fs.bucket_length() as f64 - bucket).abs() < 1.0e-12);
    assert!((positions[1] as f64 - SPACING as f64 * bucket).abs() < 1.0e-9);
}

#[test]
fn zero_ranks_is_fatal() {
    assert!(matches!(
        scheme(&lhc_pattern(10), 0),
        Err(Error::Config(_))
    ));
}

#[test]
fn zero_spacing_is_fatal() {
    let pattern = lhc_pattern(10);
    let result = FillingScheme::new(
        0,
        &pattern,
        &DummyCommunicator { n_procs: 2 },
        CIRCUMFERENCE as beam_rs::Float,
        &[HARMONIC],
    );
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn pattern_that_cannot_respect_the_spacing_is_fatal() {
    // 3565 slots at spacing 10 overfill a 35640-bucket ring
    let pattern = vec![0u8; HARMONIC / SPACING + 1];
    let result = FillingScheme::new(
        SPACING,
        &pattern,
        &DummyCommunicator { n_procs: 2 },
        CIRCUMFERENCE as beam_rs::Float,
        &[HARMONIC],
    );
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn occupancy_entries_must_be_boolean() {
    let mut pattern = lhc_pattern(10);
    pattern[5] = 2;
    assert!(matches!(scheme(&pattern, 2), Err(Error::Config(_))));
}
