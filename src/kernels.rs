// The per-particle physics routines and the plumbing that lets every backend
// run them unmodified. A routine body is a pure function of one particle's
// slot plus explicit scalar arguments; it never reads or writes another slot,
// which is what makes chunked parallel execution safe without locks.

use crate::rng::PrtlRng;
use crate::Float;
use crate::{LAST_INVALID_STATE, STATE_LOST_NAN};
#[cfg(feature = "poslimit")]
use crate::STATE_LOST_APERTURE;

/// Coordinates of a killed particle are parked far outside any aperture.
pub const KILL_COORD: Float = 1e30;

/// Bunch-level reference quantities. Copied by value into every chunk so the
/// kernels see a consistent snapshot for the whole dispatch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefScalars {
    pub mass0: Float,
    pub q0: Float,
    pub p0c: Float,
    pub energy0: Float,
    pub gamma0: Float,
    pub beta0: Float,
}

impl RefScalars {
    /// Derive the dependent reference quantities from a momentum reference.
    pub fn from_p0c(mass0: Float, q0: Float, p0c: Float) -> RefScalars {
        let energy0 = (p0c * p0c + mass0 * mass0).sqrt();
        RefScalars {
            mass0,
            q0,
            p0c,
            energy0,
            gamma0: energy0 / mass0,
            beta0: p0c / energy0,
        }
    }
}

/// Mutable view of a single particle slot. Built by the chunk walk, handed to
/// one kernel invocation, then dropped; holding it proves exclusive access to
/// exactly one slot of every array.
pub struct LocalPrtl<'a> {
    pub scal: RefScalars,
    pub s: &'a mut Float,
    pub x: &'a mut Float,
    pub y: &'a mut Float,
    pub px: &'a mut Float,
    pub py: &'a mut Float,
    pub zeta: &'a mut Float,
    pub delta: &'a mut Float,
    pub ptau: &'a mut Float,
    pub rvv: &'a mut Float,
    pub rpp: &'a mut Float,
    pub mass_ratio: &'a mut Float,
    pub chi: &'a mut Float,
    pub charge_ratio: &'a mut Float,
    pub weight: &'a mut Float,
    pub particle_id: &'a mut i64,
    pub parent_particle_id: &'a mut i64,
    pub at_turn: &'a mut i64,
    pub at_element: &'a mut i64,
    pub state: &'a mut i64,
    pub rng_state: &'a mut u64,
}

/// The named per-particle operations, declared once and executed by whichever
/// backend is active. Per-particle argument arrays are indexed by the slot's
/// offset inside the dispatch range.
pub enum PrtlKernel<'a> {
    /// Set `delta` and re-derive `ptau`, `rvv`, `rpp` atomically.
    UpdateDelta { new_delta: &'a [Float] },
    /// Kick the energy by `delta_energy` (eV). Unless `pz_only`, the
    /// unnormalized transverse momentum is held fixed by rescaling px/py
    /// with the rpp ratio.
    AddToEnergy { delta_energy: Float, pz_only: bool },
    /// Per-particle half of a reference-momentum change. The new reference
    /// scalars are already in the chunk; the ratios carry the old values.
    RescaleReference { p0c_ratio: Float, beta0_ratio: Float },
    /// Move a particle to a lost state with sentinel coordinates.
    Kill { kill_state: i64 },
    /// Flag alive particles outside the square aperture |x|,|y| <= limit.
    #[cfg(feature = "poslimit")]
    GlobalApertureCheck { limit: Float },
    /// Seed one independent random stream per slot.
    SeedRng { seeds: &'a [u32] },
    /// End-of-turn bookkeeping for alive particles.
    AdvanceTurn,
    /// Kill alive particles whose kinematic fields went non-finite, so one
    /// bad particle never aborts a dispatch.
    FlagNonFinite,
}

impl PrtlKernel<'_> {
    /// Physics kernels visit alive slots only; killing and reseeding must
    /// also reach slots that are already lost.
    pub fn applies_to_lost(&self) -> bool {
        matches!(self, PrtlKernel::Kill { .. } | PrtlKernel::SeedRng { .. })
    }

    /// Run this kernel on one slot. `idx` is the slot's offset inside the
    /// dispatch range and only indexes per-particle argument arrays.
    pub fn apply(&self, idx: usize, p: &mut LocalPrtl<'_>) {
        match *self {
            PrtlKernel::UpdateDelta { new_delta } => update_delta(p, new_delta[idx]),
            PrtlKernel::AddToEnergy {
                delta_energy,
                pz_only,
            } => add_to_energy(p, delta_energy, pz_only),
            PrtlKernel::RescaleReference {
                p0c_ratio,
                beta0_ratio,
            } => rescale_reference(p, p0c_ratio, beta0_ratio),
            PrtlKernel::Kill { kill_state } => kill(p, kill_state),
            #[cfg(feature = "poslimit")]
            PrtlKernel::GlobalApertureCheck { limit } => global_aperture_check(p, limit),
            PrtlKernel::SeedRng { seeds } => {
                *p.rng_state = PrtlRng::from_seed_u32(seeds[idx]).state();
            }
            PrtlKernel::AdvanceTurn => advance_turn(p),
            PrtlKernel::FlagNonFinite => flag_non_finite(p),
        }
    }
}

// --- routine bodies -------------------------------------------------------
//
// The longitudinal coordinates are mass-normalized, so the closed forms below
// involve only delta/ptau and beta0:
//   1 + delta = sqrt(ptau^2 + 2 ptau / beta0 + 1)
//   rvv = (1 + delta) / (1 + ptau beta0)
//   rpp = 1 / (1 + delta)

pub(crate) fn update_delta(p: &mut LocalPrtl, new_delta: Float) {
    let beta0 = p.scal.beta0;
    let delta_beta0 = new_delta * beta0;
    let ptau_beta0 = (delta_beta0 * delta_beta0 + 2.0 * delta_beta0 * beta0 + 1.0).sqrt() - 1.0;
    let one_plus_delta = 1.0 + new_delta;
    *p.delta = new_delta;
    *p.ptau = ptau_beta0 / beta0;
    *p.rvv = one_plus_delta / (1.0 + ptau_beta0);
    *p.rpp = 1.0 / one_plus_delta;
}

pub(crate) fn update_ptau(p: &mut LocalPrtl, new_ptau: Float) {
    let beta0 = p.scal.beta0;
    let one_plus_delta = (new_ptau * new_ptau + 2.0 * new_ptau / beta0 + 1.0).sqrt();
    *p.delta = one_plus_delta - 1.0;
    *p.ptau = new_ptau;
    *p.rvv = one_plus_delta / (1.0 + beta0 * new_ptau);
    *p.rpp = 1.0 / one_plus_delta;
}

pub(crate) fn add_to_energy(p: &mut LocalPrtl, delta_energy: Float, pz_only: bool) {
    let new_ptau = *p.ptau + delta_energy / p.scal.p0c;
    let old_rpp = *p.rpp;
    update_ptau(p, new_ptau);
    if !pz_only {
        // a pure energy kick leaves the absolute transverse momentum alone,
        // so its normalized form must be rescaled
        let f = old_rpp / *p.rpp;
        *p.px *= f;
        *p.py *= f;
    }
}

pub(crate) fn rescale_reference(p: &mut LocalPrtl, p0c_ratio: Float, beta0_ratio: Float) {
    // total momentum p0c*(1+delta) is held fixed while the reference moves
    let new_delta = (1.0 + *p.delta) * p0c_ratio - 1.0;
    update_delta(p, new_delta);
    *p.px *= p0c_ratio;
    *p.py *= p0c_ratio;
    *p.zeta *= beta0_ratio;
}

pub(crate) fn kill(p: &mut LocalPrtl, kill_state: i64) {
    // a never-initialized slot is not a particle to lose
    if *p.state == LAST_INVALID_STATE {
        return;
    }
    *p.x = KILL_COORD;
    *p.px = KILL_COORD;
    *p.y = KILL_COORD;
    *p.py = KILL_COORD;
    *p.zeta = KILL_COORD;
    update_delta(p, -1.0); // zero total energy
    *p.state = kill_state;
}

#[cfg(feature = "poslimit")]
pub(crate) fn global_aperture_check(p: &mut LocalPrtl, limit: Float) {
    // only reached for alive slots, so a lost particle keeps its cause code
    let inside = p.x.abs() <= limit && p.y.abs() <= limit;
    if !inside {
        *p.state = STATE_LOST_APERTURE;
    }
}

pub(crate) fn advance_turn(p: &mut LocalPrtl) {
    *p.at_turn += 1;
    *p.at_element = 0;
}

pub(crate) fn flag_non_finite(p: &mut LocalPrtl) {
    let finite = p.x.is_finite()
        && p.y.is_finite()
        && p.px.is_finite()
        && p.py.is_finite()
        && p.zeta.is_finite()
        && p.delta.is_finite()
        && p.ptau.is_finite();
    if !finite {
        kill(p, STATE_LOST_NAN);
    }
}

// --- chunk plumbing -------------------------------------------------------

/// A disjoint window over every per-particle array. Backends receive a set of
/// these and may walk them in any order or concurrently; inside a chunk the
/// walk is sequential.
pub struct PrtlChunk<'a> {
    pub(crate) scal: RefScalars,
    /// Offset of this chunk's first slot inside the dispatch range.
    pub(crate) offset: usize,
    pub(crate) s: &'a mut [Float],
    pub(crate) x: &'a mut [Float],
    pub(crate) y: &'a mut [Float],
    pub(crate) px: &'a mut [Float],
    pub(crate) py: &'a mut [Float],
    pub(crate) zeta: &'a mut [Float],
    pub(crate) delta: &'a mut [Float],
    pub(crate) ptau: &'a mut [Float],
    pub(crate) rvv: &'a mut [Float],
    pub(crate) rpp: &'a mut [Float],
    pub(crate) mass_ratio: &'a mut [Float],
    pub(crate) chi: &'a mut [Float],
    pub(crate) charge_ratio: &'a mut [Float],
    pub(crate) weight: &'a mut [Float],
    pub(crate) particle_id: &'a mut [i64],
    pub(crate) parent_particle_id: &'a mut [i64],
    pub(crate) at_turn: &'a mut [i64],
    pub(crate) at_element: &'a mut [i64],
    pub(crate) state: &'a mut [i64],
    pub(crate) rng_state: &'a mut [u64],
}

impl<'a> PrtlChunk<'a> {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Split into two disjoint chunks at `mid`, like `slice::split_at_mut`
    /// applied to every array at once.
    pub fn split_at_mut(self, mid: usize) -> (PrtlChunk<'a>, PrtlChunk<'a>) {
        let PrtlChunk {
            scal,
            offset,
            s,
            x,
            y,
            px,
            py,
            zeta,
            delta,
            ptau,
            rvv,
            rpp,
            mass_ratio,
            chi,
            charge_ratio,
            weight,
            particle_id,
            parent_particle_id,
            at_turn,
            at_element,
            state,
            rng_state,
        } = self;
        let (s_a, s_b) = s.split_at_mut(mid);
        let (x_a, x_b) = x.split_at_mut(mid);
        let (y_a, y_b) = y.split_at_mut(mid);
        let (px_a, px_b) = px.split_at_mut(mid);
        let (py_a, py_b) = py.split_at_mut(mid);
        let (zeta_a, zeta_b) = zeta.split_at_mut(mid);
        let (delta_a, delta_b) = delta.split_at_mut(mid);
        let (ptau_a, ptau_b) = ptau.split_at_mut(mid);
        let (rvv_a, rvv_b) = rvv.split_at_mut(mid);
        let (rpp_a, rpp_b) = rpp.split_at_mut(mid);
        let (mass_ratio_a, mass_ratio_b) = mass_ratio.split_at_mut(mid);
        let (chi_a, chi_b) = chi.split_at_mut(mid);
        let (charge_ratio_a, charge_ratio_b) = charge_ratio.split_at_mut(mid);
        let (weight_a, weight_b) = weight.split_at_mut(mid);
        let (particle_id_a, particle_id_b) = particle_id.split_at_mut(mid);
        let (parent_a, parent_b) = parent_particle_id.split_at_mut(mid);
        let (at_turn_a, at_turn_b) = at_turn.split_at_mut(mid);
        let (at_element_a, at_element_b) = at_element.split_at_mut(mid);
        let (state_a, state_b) = state.split_at_mut(mid);
        let (rng_a, rng_b) = rng_state.split_at_mut(mid);
        (
            PrtlChunk {
                scal,
                offset,
                s: s_a,
                x: x_a,
                y: y_a,
                px: px_a,
                py: py_a,
                zeta: zeta_a,
                delta: delta_a,
                ptau: ptau_a,
                rvv: rvv_a,
                rpp: rpp_a,
                mass_ratio: mass_ratio_a,
                chi: chi_a,
                charge_ratio: charge_ratio_a,
                weight: weight_a,
                particle_id: particle_id_a,
                parent_particle_id: parent_a,
                at_turn: at_turn_a,
                at_element: at_element_a,
                state: state_a,
                rng_state: rng_a,
            },
            PrtlChunk {
                scal,
                offset: offset + mid,
                s: s_b,
                x: x_b,
                y: y_b,
                px: px_b,
                py: py_b,
                zeta: zeta_b,
                delta: delta_b,
                ptau: ptau_b,
                rvv: rvv_b,
                rpp: rpp_b,
                mass_ratio: mass_ratio_b,
                chi: chi_b,
                charge_ratio: charge_ratio_b,
                weight: weight_b,
                particle_id: particle_id_b,
                parent_particle_id: parent_b,
                at_turn: at_turn_b,
                at_element: at_element_b,
                state: state_b,
                rng_state: rng_b,
            },
        )
    }

    /// Walk every slot of this chunk, applying `kernel` to the slots it is
    /// allowed to visit.
    pub fn run(&mut self, kernel: &PrtlKernel<'_>) {
        if !cfg!(feature = "unchecked") {
            // all arrays are parallel by construction
            assert_eq!(self.s.len(), self.x.len());
            assert_eq!(self.state.len(), self.x.len());
            assert_eq!(self.rng_state.len(), self.x.len());
        }
        let lost_too = kernel.applies_to_lost();
        for i in 0..self.x.len() {
            if !lost_too && self.state[i] <= 0 {
                continue;
            }
            let mut p = LocalPrtl {
                scal: self.scal,
                s: &mut self.s[i],
                x: &mut self.x[i],
                y: &mut self.y[i],
                px: &mut self.px[i],
                py: &mut self.py[i],
                zeta: &mut self.zeta[i],
                delta: &mut self.delta[i],
                ptau: &mut self.ptau[i],
                rvv: &mut self.rvv[i],
                rpp: &mut self.rpp[i],
                mass_ratio: &mut self.mass_ratio[i],
                chi: &mut self.chi[i],
                charge_ratio: &mut self.charge_ratio[i],
                weight: &mut self.weight[i],
                particle_id: &mut self.particle_id[i],
                parent_particle_id: &mut self.parent_particle_id[i],
                at_turn: &mut self.at_turn[i],
                at_element: &mut self.at_element[i],
                state: &mut self.state[i],
                rng_state: &mut self.rng_state[i],
            };
            kernel.apply(self.offset + i, &mut p);
        }
    }
}
