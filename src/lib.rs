use std::fs;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use itertools::izip;
use rand::prelude::*;
use rand_distr::StandardNormal;
use serde::Deserialize;

pub mod context;
pub mod errors;
pub mod filling;
pub mod kernels;
pub mod prtls;
pub mod rng;
mod save;

pub use errors::Error;

// We use a type alias for f64/Float to easily support
// double and single precision.
#[cfg(feature = "sprec")]
pub type Float = f32;

#[cfg(not(feature = "sprec"))]
pub type Float = f64;

/// Slots per chunk handed to the threaded backend.
pub const PRTL_CHUNK_SIZE: usize = 10_000;

pub const PROTON_MASS_EV: Float = 938_272_088.16;
pub const ELECTRON_MASS_EV: Float = 510_998.95;

// Particle state codes. Positive is alive; non-positive records how the
// particle was lost. The sentinel marks capacity slots never initialized
// and sorts below every valid lost code.
pub const STATE_ALIVE: i64 = 1;
pub const STATE_LOST_APERTURE: i64 = -1;
pub const STATE_LOST_ZERO_ENERGY: i64 = -10;
pub const STATE_LOST_NAN: i64 = -30;
pub const LAST_INVALID_STATE: i64 = -999_999_999;

#[derive(Deserialize)]
pub struct Config {
    pub beam: Beam,
    pub ring: Ring,
    pub setup: Setup,
    pub output: Output,
}

#[derive(Deserialize)]
pub struct Beam {
    pub capacity: usize,
    pub p0c: Float,
    pub mass0: Option<Float>,
    pub q0: Option<Float>,
    pub backend: String,
}

#[derive(Deserialize)]
pub struct Ring {
    pub circumference: Float,
    pub harmonic: usize,
    pub bunch_spacing_in_buckets: usize,
    pub n_filled: usize,
    pub n_procs: usize,
}

#[derive(Deserialize)]
pub struct Setup {
    pub n_turns: u32,
    pub energy_kick_ev: Float,
    pub aperture_limit: Float,
    pub sigma_x: Float,
    pub sigma_px: Float,
    pub seed: u64,
}

#[derive(Deserialize)]
pub struct Output {
    pub write_output: bool,
    pub output_interval: u32,
    pub stride: usize,
}

impl Config {
    pub fn new() -> Result<Config> {
        let contents =
            fs::read_to_string("config.toml").context("Could not open the config.toml file")?;
        toml::from_str(&contents).with_context(|| "Could not parse Config file")
    }
}

pub fn run(cfg: Config) -> Result<()> {
    let ctx = context::context_from_name(&cfg.beam.backend)?;

    // Decide which bunches each worker rank owns. A single-process run still
    // goes through the partitioner so the assignment is the same one a
    // multi-rank deployment would see.
    // spacing of zero is rejected by the partitioner below
    let n_slots = cfg.ring.harmonic / cfg.ring.bunch_spacing_in_buckets.max(1);
    if cfg.ring.n_filled > n_slots {
        return Err(Error::Config(format!(
            "cannot fill {} of {} bunch slots",
            cfg.ring.n_filled, n_slots
        ))
        .into());
    }
    let mut pattern = vec![0u8; n_slots];
    for slot in pattern.iter_mut().take(cfg.ring.n_filled) {
        *slot = 1;
    }
    let comm = filling::DummyCommunicator {
        n_procs: cfg.ring.n_procs,
    };
    let scheme = filling::FillingScheme::new(
        cfg.ring.bunch_spacing_in_buckets,
        &pattern,
        &comm,
        cfg.ring.circumference,
        &[cfg.ring.harmonic],
    )?;
    for (rank, bunches) in scheme.bunches_per_rank.iter().enumerate() {
        tracing::info!(rank, n_bunches = bunches.len(), "bunch assignment");
    }

    // Populate the ensemble with a gaussian transverse distribution.
    let n = cfg.beam.capacity;
    let mut setup_rng = StdRng::seed_from_u64(cfg.setup.seed);
    let mut x = vec![0.0 as Float; n];
    let mut y = vec![0.0 as Float; n];
    let mut px = vec![0.0 as Float; n];
    let mut py = vec![0.0 as Float; n];
    for (x, y, px, py) in izip!(&mut x, &mut y, &mut px, &mut py) {
        *x = setup_rng.sample::<Float, _>(StandardNormal) * cfg.setup.sigma_x;
        *y = setup_rng.sample::<Float, _>(StandardNormal) * cfg.setup.sigma_x;
        *px = setup_rng.sample::<Float, _>(StandardNormal) * cfg.setup.sigma_px;
        *py = setup_rng.sample::<Float, _>(StandardNormal) * cfg.setup.sigma_px;
    }
    let init = prtls::PrtlsInit {
        capacity: n,
        p0c: Some(cfg.beam.p0c),
        mass0: cfg.beam.mass0,
        q0: cfg.beam.q0,
        x: Some(x),
        y: Some(y),
        px: Some(px),
        py: Some(py),
        ..Default::default()
    };
    let mut prtls = prtls::Prtls::new(Arc::clone(&ctx), init)?;

    // One independent random stream per particle.
    let seeds: Vec<u32> = (0..n as u32).map(|i| i ^ cfg.setup.seed as u32).collect();
    prtls.initialize_rng(&seeds)?;

    tracing::info!(
        backend = ctx.name(),
        capacity = n,
        p0c = cfg.beam.p0c as f64,
        "tracking"
    );

    for t in 0..=cfg.setup.n_turns {
        if cfg.output.write_output {
            save::save_output(t, &prtls, &cfg.output)?;
        }
        prtls.add_to_energy(cfg.setup.energy_kick_ev, false);
        #[cfg(feature = "poslimit")]
        prtls.global_aperture_check(cfg.setup.aperture_limit);
        prtls.advance_turn();
    }

    prtls
        .check_finite()
        .context("tracking produced non-finite coordinates")?;

    let alive = prtls.num_alive();
    tracing::info!(
        alive,
        lost = prtls.num_particles - alive,
        rms_x = save::rms(&prtls.x[..prtls.num_particles]) as f64,
        rms_y = save::rms(&prtls.y[..prtls.num_particles]) as f64,
        "done"
    );
    Ok(())
}
