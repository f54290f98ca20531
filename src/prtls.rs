// The particle ensemble: a struct-of-arrays container for up to `capacity`
// particles plus the bunch-level reference scalars. All arrays are parallel:
// index i across every array refers to the same particle. Slots are never
// removed; "lost" is a state value, not a deletion.

use std::ops::Range;
use std::sync::Arc;

use itertools::izip;

use crate::context::Context;
use crate::errors::{Error, Result};
use crate::kernels::{PrtlChunk, PrtlKernel, RefScalars};
use crate::{Float, LAST_INVALID_STATE, PROTON_MASS_EV, STATE_ALIVE};

/// Construction input. Only fields that are not derivable from others can be
/// given; anything omitted broadcasts its default (zero for coordinates, one
/// for the species ratios and weight). Exactly one of `p0c`, `energy0`,
/// `gamma0` must be present.
#[derive(Default)]
pub struct PrtlsInit {
    pub capacity: usize,
    /// Slots to initialize; defaults to the longest provided array, or the
    /// full capacity when no arrays are given.
    pub num_particles: Option<usize>,
    pub mass0: Option<Float>,
    pub q0: Option<Float>,
    pub p0c: Option<Float>,
    pub energy0: Option<Float>,
    pub gamma0: Option<Float>,
    pub s: Option<Vec<Float>>,
    pub x: Option<Vec<Float>>,
    pub y: Option<Vec<Float>>,
    pub px: Option<Vec<Float>>,
    pub py: Option<Vec<Float>>,
    pub zeta: Option<Vec<Float>>,
    pub delta: Option<Vec<Float>>,
    pub weight: Option<Vec<Float>>,
    pub mass_ratio: Option<Vec<Float>>,
    pub charge_ratio: Option<Vec<Float>>,
}

pub struct Prtls {
    ctx: Arc<dyn Context>,
    pub capacity: usize,
    /// Initialized slots; the remainder up to `capacity` carry the invalid
    /// sentinel state and are excluded from default dispatch ranges.
    pub num_particles: usize,
    pub scalars: RefScalars,
    pub s: Vec<Float>,
    pub x: Vec<Float>,
    pub y: Vec<Float>,
    pub px: Vec<Float>,
    pub py: Vec<Float>,
    pub zeta: Vec<Float>,
    pub delta: Vec<Float>,
    pub ptau: Vec<Float>,
    pub rvv: Vec<Float>,
    pub rpp: Vec<Float>,
    pub mass_ratio: Vec<Float>,
    pub chi: Vec<Float>,
    pub charge_ratio: Vec<Float>,
    pub weight: Vec<Float>,
    pub particle_id: Vec<i64>,
    pub parent_particle_id: Vec<i64>,
    pub at_turn: Vec<i64>,
    pub at_element: Vec<i64>,
    pub state: Vec<i64>,
    pub rng_state: Vec<u64>,
}

fn resolve_reference(init: &PrtlsInit) -> Result<RefScalars> {
    let mass0 = init.mass0.unwrap_or(PROTON_MASS_EV);
    let q0 = init.q0.unwrap_or(1.0);
    if !mass0.is_finite() || mass0 <= 0.0 {
        return Err(Error::Config(format!(
            "reference mass must be finite and positive, got {}",
            mass0
        )));
    }
    let given = init.p0c.iter().count() + init.energy0.iter().count() + init.gamma0.iter().count();
    if given == 0 {
        return Err(Error::Config(
            "one of p0c, energy0 or gamma0 is required".to_string(),
        ));
    }
    if given > 1 {
        return Err(Error::Config(
            "p0c, energy0 and gamma0 are mutually exclusive".to_string(),
        ));
    }
    let p0c = if let Some(p0c) = init.p0c {
        p0c
    } else if let Some(energy0) = init.energy0 {
        if energy0 <= mass0 {
            return Err(Error::Config(format!(
                "reference energy {} is not above the rest mass {}",
                energy0, mass0
            )));
        }
        (energy0 * energy0 - mass0 * mass0).sqrt()
    } else {
        let gamma0 = init.gamma0.expect("one reference is present");
        if gamma0 <= 1.0 {
            return Err(Error::Config(format!(
                "reference gamma must be above one, got {}",
                gamma0
            )));
        }
        mass0 * (gamma0 * gamma0 - 1.0).sqrt()
    };
    if !p0c.is_finite() || p0c <= 0.0 {
        return Err(Error::Config(format!(
            "reference momentum must be finite and positive, got {}",
            p0c
        )));
    }
    Ok(RefScalars::from_p0c(mass0, q0, p0c))
}

/// Broadcast `values` over a fresh array of `capacity` slots, the rest
/// keeping `default`.
fn fill(
    ctx: &dyn Context,
    field: &'static str,
    capacity: usize,
    values: Option<Vec<Float>>,
    default: Float,
) -> Result<Vec<Float>> {
    let mut arr = ctx.alloc_floats(capacity);
    if default != 0.0 {
        for v in arr.iter_mut() {
            *v = default;
        }
    }
    if let Some(vals) = values {
        if vals.len() > capacity {
            return Err(Error::Shape {
                field,
                len: vals.len(),
                capacity,
            });
        }
        arr[..vals.len()].copy_from_slice(&vals);
    }
    Ok(arr)
}

impl Prtls {
    /// All-or-nothing construction; on error the caller gets nothing back.
    pub fn new(ctx: Arc<dyn Context>, init: PrtlsInit) -> Result<Prtls> {
        if init.capacity == 0 {
            return Err(Error::Config(
                "capacity must be at least one particle".to_string(),
            ));
        }
        let scalars = resolve_reference(&init)?;

        let capacity = init.capacity;
        let provided_len = [
            &init.s,
            &init.x,
            &init.y,
            &init.px,
            &init.py,
            &init.zeta,
            &init.delta,
            &init.weight,
            &init.mass_ratio,
            &init.charge_ratio,
        ]
        .iter()
        .filter_map(|o| o.as_ref().map(|v| v.len()))
        .max();
        let num_particles = init.num_particles.or(provided_len).unwrap_or(capacity);
        if num_particles > capacity {
            return Err(Error::Config(format!(
                "cannot initialize {} particles in a capacity of {}",
                num_particles, capacity
            )));
        }

        let c = ctx.as_ref();
        let mut prtls = Prtls {
            capacity,
            num_particles,
            scalars,
            s: fill(c, "s", capacity, init.s, 0.0)?,
            x: fill(c, "x", capacity, init.x, 0.0)?,
            y: fill(c, "y", capacity, init.y, 0.0)?,
            px: fill(c, "px", capacity, init.px, 0.0)?,
            py: fill(c, "py", capacity, init.py, 0.0)?,
            zeta: fill(c, "zeta", capacity, init.zeta, 0.0)?,
            delta: fill(c, "delta", capacity, init.delta, 0.0)?,
            ptau: c.alloc_floats(capacity),
            rvv: fill(c, "rvv", capacity, None, 1.0)?,
            rpp: fill(c, "rpp", capacity, None, 1.0)?,
            mass_ratio: fill(c, "mass_ratio", capacity, init.mass_ratio, 1.0)?,
            chi: fill(c, "chi", capacity, None, 1.0)?,
            charge_ratio: fill(c, "charge_ratio", capacity, init.charge_ratio, 1.0)?,
            weight: fill(c, "weight", capacity, init.weight, 1.0)?,
            particle_id: c.alloc_ints(capacity),
            parent_particle_id: c.alloc_ints(capacity),
            at_turn: c.alloc_ints(capacity),
            at_element: c.alloc_ints(capacity),
            state: c.alloc_ints(capacity),
            rng_state: c.alloc_uints(capacity),
            ctx,
        };

        for (i, (pid, parent, state)) in izip!(
            &mut prtls.particle_id,
            &mut prtls.parent_particle_id,
            &mut prtls.state
        )
        .enumerate()
        {
            if i < num_particles {
                *pid = i as i64;
                *parent = i as i64;
                *state = STATE_ALIVE;
            } else {
                *state = LAST_INVALID_STATE;
            }
        }
        for (chi, mr, qr) in izip!(
            &mut prtls.chi[..num_particles],
            &prtls.mass_ratio[..num_particles],
            &prtls.charge_ratio[..num_particles]
        ) {
            *chi = qr / mr;
        }

        // derive ptau/rvv/rpp so no torn kinematic state is ever observable
        let d: Vec<Float> = prtls.delta[..num_particles].to_vec();
        prtls.update_delta(&d)?;
        Ok(prtls)
    }

    /// Split the requested range into backend-sized chunks and hand them to
    /// the context. Issue order across calls is the effective order; within
    /// one call per-particle order is unobservable.
    pub(crate) fn dispatch(&mut self, kernel: PrtlKernel<'_>, range: Range<usize>) {
        if !cfg!(feature = "unchecked") {
            assert!(range.start <= range.end);
            assert!(range.end <= self.capacity);
        }
        let ctx = Arc::clone(&self.ctx);
        let chunk_len = ctx.chunk_len().max(1);
        let mut chunks = Vec::new();
        let mut rest = self.chunk(range);
        while rest.len() > chunk_len {
            let (head, tail) = rest.split_at_mut(chunk_len);
            chunks.push(head);
            rest = tail;
        }
        chunks.push(rest);
        ctx.execute(&kernel, chunks);
    }

    fn chunk(&mut self, range: Range<usize>) -> PrtlChunk<'_> {
        PrtlChunk {
            scal: self.scalars,
            offset: 0,
            s: &mut self.s[range.clone()],
            x: &mut self.x[range.clone()],
            y: &mut self.y[range.clone()],
            px: &mut self.px[range.clone()],
            py: &mut self.py[range.clone()],
            zeta: &mut self.zeta[range.clone()],
            delta: &mut self.delta[range.clone()],
            ptau: &mut self.ptau[range.clone()],
            rvv: &mut self.rvv[range.clone()],
            rpp: &mut self.rpp[range.clone()],
            mass_ratio: &mut self.mass_ratio[range.clone()],
            chi: &mut self.chi[range.clone()],
            charge_ratio: &mut self.charge_ratio[range.clone()],
            weight: &mut self.weight[range.clone()],
            particle_id: &mut self.particle_id[range.clone()],
            parent_particle_id: &mut self.parent_particle_id[range.clone()],
            at_turn: &mut self.at_turn[range.clone()],
            at_element: &mut self.at_element[range.clone()],
            state: &mut self.state[range.clone()],
            rng_state: &mut self.rng_state[range],
        }
    }

    /// Set `delta` slot by slot and re-derive `ptau`, `rvv`, `rpp`. Must be
    /// used for any delta change so the dependents never go stale.
    pub fn update_delta(&mut self, new_delta: &[Float]) -> Result<()> {
        if new_delta.len() > self.capacity {
            return Err(Error::Shape {
                field: "delta",
                len: new_delta.len(),
                capacity: self.capacity,
            });
        }
        let n = new_delta.len();
        self.dispatch(PrtlKernel::UpdateDelta { new_delta }, 0..n);
        Ok(())
    }

    /// Kick every initialized particle's energy by `delta_energy` (eV).
    pub fn add_to_energy(&mut self, delta_energy: Float, pz_only: bool) {
        self.dispatch(
            PrtlKernel::AddToEnergy {
                delta_energy,
                pz_only,
            },
            0..self.num_particles,
        );
    }

    /// Move the reference momentum. The reference scalars are re-derived
    /// first, from values cached before any mutation, then the per-particle
    /// coordinates are rescaled against the old/new ratios.
    pub fn update_reference_momentum(&mut self, new_p0c: Float) -> Result<()> {
        if !new_p0c.is_finite() || new_p0c <= 0.0 {
            return Err(Error::Config(format!(
                "new reference momentum must be finite and positive, got {}",
                new_p0c
            )));
        }
        let old = self.scalars;
        self.scalars = RefScalars::from_p0c(old.mass0, old.q0, new_p0c);
        let kernel = PrtlKernel::RescaleReference {
            p0c_ratio: old.p0c / new_p0c,
            beta0_ratio: self.scalars.beta0 / old.beta0,
        };
        self.dispatch(kernel, 0..self.num_particles);
        Ok(())
    }

    /// Move the targeted slots to a lost state: sentinel coordinates, zero
    /// total energy, `state` set to the caller's non-positive code. A slot
    /// already lost just gets the new code.
    pub fn kill(&mut self, range: Range<usize>, kill_state: i64) -> Result<()> {
        if kill_state > 0 {
            return Err(Error::Config(format!(
                "kill state must be non-positive, got {}",
                kill_state
            )));
        }
        if range.end > self.capacity {
            return Err(Error::Shape {
                field: "kill range",
                len: range.end,
                capacity: self.capacity,
            });
        }
        self.dispatch(PrtlKernel::Kill { kill_state }, range);
        Ok(())
    }

    /// Flag alive particles outside the square aperture `|x|,|y| <= limit`
    /// as lost; never touches a particle that is already lost.
    #[cfg(feature = "poslimit")]
    pub fn global_aperture_check(&mut self, limit: Float) {
        self.dispatch(
            PrtlKernel::GlobalApertureCheck { limit },
            0..self.num_particles,
        );
    }

    /// Seed one independent random stream per particle, first slot first.
    pub fn initialize_rng(&mut self, seeds: &[u32]) -> Result<()> {
        if seeds.len() > self.capacity {
            return Err(Error::Shape {
                field: "rng seeds",
                len: seeds.len(),
                capacity: self.capacity,
            });
        }
        let n = seeds.len();
        self.dispatch(PrtlKernel::SeedRng { seeds }, 0..n);
        Ok(())
    }

    /// End-of-turn bookkeeping for the alive particles.
    pub fn advance_turn(&mut self) {
        self.dispatch(PrtlKernel::AdvanceTurn, 0..self.num_particles);
    }

    /// Kill any alive particle whose kinematic fields went non-finite,
    /// recording the numerical-loss state code. The dispatch itself never
    /// aborts for one bad particle.
    pub fn flag_non_finite(&mut self) {
        self.dispatch(PrtlKernel::FlagNonFinite, 0..self.num_particles);
    }

    /// Explicit validity check over the kinematic arrays of the initialized
    /// slots. Kernels never abort a dispatch on a bad particle; this is how
    /// the caller finds out.
    pub fn check_finite(&self) -> Result<()> {
        let n = self.num_particles;
        for (name, arr) in [
            ("x", &self.x),
            ("y", &self.y),
            ("px", &self.px),
            ("py", &self.py),
            ("zeta", &self.zeta),
            ("delta", &self.delta),
            ("ptau", &self.ptau),
        ] {
            if self.ctx.contains_nan(&arr[..n]) {
                return Err(Error::NumericalInvalid(name));
            }
        }
        Ok(())
    }

    /// tau = zeta / beta0 for the initialized slots.
    pub fn tau(&self) -> Vec<Float> {
        let beta0 = self.scalars.beta0;
        self.zeta[..self.num_particles]
            .iter()
            .map(|z| z / beta0)
            .collect()
    }

    /// pzeta = ptau / beta0 for the initialized slots.
    pub fn pzeta(&self) -> Vec<Float> {
        let beta0 = self.scalars.beta0;
        self.ptau[..self.num_particles]
            .iter()
            .map(|pt| pt / beta0)
            .collect()
    }

    /// Initialized slots still being tracked.
    pub fn num_alive(&self) -> usize {
        self.state[..self.num_particles]
            .iter()
            .filter(|&&s| s > 0)
            .count()
    }

    pub fn context(&self) -> &dyn Context {
        self.ctx.as_ref()
    }
}
