use std::sync::Arc;

use beam_rs::context::{context_from_name, Context};
use beam_rs::prtls::{Prtls, PrtlsInit};
use beam_rs::Float;

// Small deterministic ensemble used across the integration tests.
pub fn small_init(n: usize) -> PrtlsInit {
    PrtlsInit {
        capacity: n,
        p0c: Some(450.0e9),
        x: Some((0..n).map(|i| 1.0e-3 * (i as Float + 1.0)).collect()),
        y: Some((0..n).map(|i| -2.0e-3 * (i as Float + 1.0)).collect()),
        px: Some(vec![1.0e-5; n]),
        py: Some(vec![3.0e-6; n]),
        zeta: Some((0..n).map(|i| 1.0e-2 * i as Float).collect()),
        delta: Some((0..n).map(|i| 1.0e-4 * i as Float).collect()),
        ..Default::default()
    }
}

pub fn setup_prtls(backend: &str, n: usize) -> Prtls {
    let ctx = context_from_name(backend).expect("known backend");
    Prtls::new(ctx, small_init(n)).expect("valid init")
}

pub fn setup_prtls_on(ctx: Arc<dyn Context>, n: usize) -> Prtls {
    Prtls::new(ctx, small_init(n)).expect("valid init")
}

pub fn assert_close(a: Float, b: Float, tol: Float) {
    let scale = a.abs().max(b.abs()).max(1.0);
    assert!(
        (a - b).abs() <= tol * scale,
        "expected {} ~ {} within {}",
        a,
        b,
        tol
    );
}
