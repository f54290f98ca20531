use anyhow::{Context as _, Result};
use npy_derive::Serializable;

use crate::prtls::Prtls;
use crate::Output;

/// One particle's snapshot row in the structured .npy output.
#[derive(Serializable)]
struct PrtlRecord {
    x: f64,
    y: f64,
    zeta: f64,
    delta: f64,
    at_turn: i64,
    state: i64,
}

/// Root-mean-square of a coordinate array; generic so it works under both
/// precision features.
pub(crate) fn rms<F: num_traits::Float>(vals: &[F]) -> F {
    if vals.is_empty() {
        return F::zero();
    }
    let sum = vals.iter().fold(F::zero(), |acc, &v| acc + v * v);
    let n = F::from(vals.len()).expect("particle count fits in a float");
    (sum / n).sqrt()
}

/// Write a strided snapshot of the initialized slots for timestep `t`.
pub(crate) fn save_output(t: u32, prtls: &Prtls, output: &Output) -> Result<()> {
    let interval = output.output_interval.max(1);
    if t % interval != 0 {
        return Ok(());
    }
    let outdir = format!("output/dat_{:05}", t / interval);
    std::fs::create_dir_all(&outdir).context("Unable to create output directory")?;

    let n = prtls.num_particles;
    let stride = output.stride.max(1);
    let records: Vec<PrtlRecord> = (0..n)
        .step_by(stride)
        .map(|i| PrtlRecord {
            x: prtls.x[i] as f64,
            y: prtls.y[i] as f64,
            zeta: prtls.zeta[i] as f64,
            delta: prtls.delta[i] as f64,
            at_turn: prtls.at_turn[i],
            state: prtls.state[i],
        })
        .collect();
    npy::to_file(format!("{}/prtls.npy", outdir), records)
        .context("Could not save particle snapshot to file")?;
    Ok(())
}
