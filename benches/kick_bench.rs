#[macro_use]
extern crate criterion;

use criterion::Criterion;

use beam_rs::context::context_from_name;
use beam_rs::prtls::{Prtls, PrtlsInit};
use beam_rs::Float;

fn build_prtls(backend: &str, n: usize) -> Prtls {
    let ctx = context_from_name(backend).expect("known backend");
    let init = PrtlsInit {
        capacity: n,
        p0c: Some(450.0e9),
        x: Some((0..n).map(|i| 1.0e-6 * i as Float).collect()),
        px: Some(vec![1.0e-5; n]),
        delta: Some(vec![1.0e-4; n]),
        ..Default::default()
    };
    Prtls::new(ctx, init).expect("valid init")
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut on_cpu = build_prtls("cpu", 100_000);
    c.bench_function("energy kick cpu", move |b| {
        b.iter(|| {
            on_cpu.add_to_energy(1.0e6, false);
            on_cpu.add_to_energy(-1.0e6, false);
        })
    });

    let mut on_threads = build_prtls("threads", 100_000);
    c.bench_function("energy kick threads", move |b| {
        b.iter(|| {
            on_threads.add_to_energy(1.0e6, false);
            on_threads.add_to_energy(-1.0e6, false);
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
