mod common;

use std::sync::Arc;

use beam_rs::context::{context_from_name, Context, ThreadedContext};
use beam_rs::prtls::Prtls;
use beam_rs::{Error, Float};

use common::{setup_prtls, setup_prtls_on};

// Drive the same operation sequence through an ensemble.
fn exercise(prtls: &mut Prtls) {
    let n = prtls.num_particles;
    let new_delta: Vec<Float> = (0..n).map(|i| 5.0e-4 - 1.0e-5 * i as Float).collect();
    prtls.update_delta(&new_delta).unwrap();
    prtls.add_to_energy(2.5e7, false);
    prtls.add_to_energy(-1.0e7, true);
    prtls.update_reference_momentum(1.2e12).unwrap();
    prtls.kill(3..7, -5).unwrap();
    #[cfg(feature = "poslimit")]
    prtls.global_aperture_check(1.0e-2);
    let seeds: Vec<u32> = (0..n as u32).map(|i| i.wrapping_mul(2654435761)).collect();
    prtls.initialize_rng(&seeds).unwrap();
    prtls.advance_turn();
}

#[test]
fn cpu_and_threaded_backends_are_observably_equivalent() {
    let mut on_cpu = setup_prtls("cpu", 53);
    // a chunk length smaller than the ensemble forces a real multi-chunk
    // dispatch on the threaded backend
    let threaded: Arc<dyn Context> = Arc::new(ThreadedContext::with_chunk_len(7));
    let mut on_threads = setup_prtls_on(threaded, 53);

    exercise(&mut on_cpu);
    exercise(&mut on_threads);

    assert_eq!(on_cpu.x, on_threads.x);
    assert_eq!(on_cpu.y, on_threads.y);
    assert_eq!(on_cpu.px, on_threads.px);
    assert_eq!(on_cpu.py, on_threads.py);
    assert_eq!(on_cpu.zeta, on_threads.zeta);
    assert_eq!(on_cpu.delta, on_threads.delta);
    assert_eq!(on_cpu.ptau, on_threads.ptau);
    assert_eq!(on_cpu.rvv, on_threads.rvv);
    assert_eq!(on_cpu.rpp, on_threads.rpp);
    assert_eq!(on_cpu.state, on_threads.state);
    assert_eq!(on_cpu.at_turn, on_threads.at_turn);
    assert_eq!(on_cpu.rng_state, on_threads.rng_state);
    assert_eq!(on_cpu.scalars, on_threads.scalars);
}

#[test]
fn threaded_nan_scan_agrees_with_cpu() {
    let cpu = context_from_name("cpu").unwrap();
    let threads: Arc<dyn Context> = Arc::new(ThreadedContext::with_chunk_len(4));

    let mut arr: Vec<Float> = vec![0.0; 100];
    assert!(!cpu.contains_nan(&arr));
    assert!(!threads.contains_nan(&arr));
    arr[63] = Float::NAN;
    assert!(cpu.contains_nan(&arr));
    assert!(threads.contains_nan(&arr));
}

#[test]
fn backend_registry_is_explicit() {
    assert_eq!(context_from_name("cpu").unwrap().name(), "cpu");
    assert_eq!(context_from_name("threads").unwrap().name(), "threads");
    assert!(matches!(
        context_from_name("gpu-someday"),
        Err(Error::Config(_))
    ));
}
