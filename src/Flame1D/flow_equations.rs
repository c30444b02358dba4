//! # Free-flow domain: governing equations of the freely propagating flame
//!
//! Unknowns at every grid point, in order: axial velocity `u`, temperature `T`, electric field `E`
//! and the mass fractions `Y_k` of all species.
//!
//! ```text
//! continuity   d(ρu)/dz = 0                        (forward upstream of the fixed point, backward downstream)
//! energy       ρ u cp dT/dz = d/dz(λ dT/dz) - Σ h_k ω_k
//! species      ρ u dY_k/dz = -dj_k/dz + W_k ω_k
//! Poisson      dE/dz = e N_A ρ Σ z_k Y_k / W_k / ε0    (field stage only)
//! ```
//!
//! Neutral fluxes are Fickian, `j_k = -ρ D_k dY_k/dz`. Charged species use the Scharfetter–Gummel
//! discretization of `j_k = ρ Y_k z_k μ_k E - ρ D_k dY_k/dz`, which stays upwind-stable when the
//! drift Péclet number of an interval is large. Without an applied field charged species are
//! transported ambipolarly (ions at twice their diffusivity, no drift) and the electron row enforces
//! local charge neutrality. The mass fraction of the bath species closes `Σ Y_k = 1`.
//!
//! At the fixed point the temperature row pins `T = T_fix` and the continuity row carries the energy
//! balance, which turns the mass flux into an eigenvalue: the laminar flame speed.
//!
//! Species rows are divided by `ρ`, the energy row by `ρ cp`; pseudo-transient terms
//! `-(x - x_old)/dt` are added to differential rows of interior points only.
use super::domains::{AssemblyContext, Domain1D, PointProperties, SpeciesRoles, C_E, C_T, C_U, C_Y};
use super::flame_error::FlameError;
use super::grid::Grid;
use crate::Providers::provider_api::{
    AVOGADRO, BOLTZMANN, ELEMENTARY_CHARGE, EPS0, GasState, Providers,
};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Solver stage: ambipolar charged transport without field, then the full field problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStage {
    NoField,
    WithField,
}

/// Bernoulli function `x / (e^x - 1)`
pub fn bernoulli(x: f64) -> f64 {
    if x.abs() < 1e-6 {
        1.0 - 0.5 * x + x * x / 12.0
    } else if x > 700.0 {
        0.0
    } else {
        x / x.exp_m1()
    }
}

#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct FreeFlow1D {
    /// pressure (Pa), uniform over the domain
    pub pressure: f64,
    pub species_names: Vec<String>,
    pub roles: SpeciesRoles,
    pub stage: SolveStage,
    /// temperature pinned at the fixed point
    pub fixed_temperature: Option<f64>,
    /// axial position of the fixed point; survives refinement because grid points never move
    pub fixed_position: Option<f64>,
}

impl FreeFlow1D {
    pub fn new(providers: &Providers, pressure: f64) -> Result<Self, FlameError> {
        if !pressure.is_finite() || pressure <= 0.0 {
            return Err(FlameError::InvalidInput(format!(
                "pressure must be positive, got {}",
                pressure
            )));
        }
        let thermo = providers.thermo;
        let roles = SpeciesRoles::from_thermo(thermo)?;
        Ok(Self {
            pressure,
            species_names: thermo.species_names().to_vec(),
            roles,
            stage: SolveStage::NoField,
            fixed_temperature: None,
            fixed_position: None,
        })
    }

    pub fn n_species(&self) -> usize {
        self.species_names.len()
    }

    pub fn set_stage(&mut self, stage: SolveStage) {
        self.stage = stage;
    }

    /// index of the fixed point on `grid`
    pub fn fixed_point(&self, grid: &Grid) -> Option<usize> {
        self.fixed_position.and_then(|z| grid.locate(z))
    }

    /// Property bundle of one grid point, queried from the providers.
    #[allow(non_snake_case)]
    pub fn point_properties(
        &self,
        providers: &Providers,
        T: f64,
        Y: &[f64],
    ) -> Result<PointProperties, FlameError> {
        let state = GasState::new(T, self.pressure, Y);
        state.validate(self.n_species())?;
        let rho = providers.thermo.density(&state)?;
        let cp = providers.thermo.cp_mass(&state)?;
        let lambda = providers.transport.thermal_conductivity(&state)?;
        let diffusivity = providers.transport.mix_diffusion_coeffs(&state)?;
        let mobility = providers.transport.mobilities(&state)?;
        let wdot = providers.kinetics.net_production_rates(&state)?;
        let h_molar = providers.thermo.enthalpies_molar(T)?;
        let charge: f64 = Y
            .iter()
            .zip(self.roles.charges.iter().zip(&self.roles.mw))
            .map(|(yk, (zk, wk))| zk * yk / wk)
            .sum();
        let charge_density = ELEMENTARY_CHARGE * AVOGADRO * rho * charge;
        if !(rho.is_finite() && cp.is_finite() && lambda.is_finite()) {
            return Err(FlameError::PropertyEvaluationFailure(format!(
                "non-finite properties at T = {} K",
                T
            )));
        }
        Ok(PointProperties {
            rho,
            cp,
            lambda,
            diffusivity,
            mobility,
            wdot,
            h_molar,
            charge_density,
        })
    }

    pub fn evaluate_properties(
        &self,
        providers: &Providers,
        flow: &DMatrix<f64>,
    ) -> Result<Vec<PointProperties>, FlameError> {
        let n_species = self.n_species();
        let mut y = vec![0.0; n_species];
        (0..flow.ncols())
            .map(|j| {
                for k in 0..n_species {
                    y[k] = flow[(C_Y + k, j)];
                }
                self.point_properties(providers, flow[(C_T, j)], &y)
            })
            .collect()
    }

    /// Species mass fluxes at the interval midpoints, (species × intervals).
    pub fn species_fluxes(
        &self,
        grid: &Grid,
        flow: &DMatrix<f64>,
        props: &[PointProperties],
    ) -> DMatrix<f64> {
        let n_species = self.n_species();
        let n_intervals = grid.len() - 1;
        let mut fluxes = DMatrix::zeros(n_species, n_intervals);
        for i in 0..n_intervals {
            let dz = grid.dz(i);
            let (a, b) = (&props[i], &props[i + 1]);
            let rho = 0.5 * (a.rho + b.rho);
            let e_mid = 0.5 * (flow[(C_E, i)] + flow[(C_E, i + 1)]);
            for k in 0..n_species {
                let y0 = flow[(C_Y + k, i)];
                let y1 = flow[(C_Y + k, i + 1)];
                let d = 0.5 * (a.diffusivity[k] + b.diffusivity[k]);
                let z = self.roles.charges[k];
                fluxes[(k, i)] = if z == 0.0 {
                    -rho * d * (y1 - y0) / dz
                } else {
                    match self.stage {
                        SolveStage::NoField => -2.0 * rho * d * (y1 - y0) / dz,
                        SolveStage::WithField => {
                            let mu = 0.5 * (a.mobility[k] + b.mobility[k]);
                            let peclet = z * mu * e_mid * dz / d;
                            rho * d / dz * (bernoulli(-peclet) * y0 - bernoulli(peclet) * y1)
                        }
                    }
                };
            }
        }
        fluxes
    }

    /// species rows holding an algebraic closure instead of a transport equation
    fn is_algebraic_species(&self, k: usize) -> bool {
        k == self.roles.bath
            || (self.stage == SolveStage::NoField && self.roles.electron == Some(k))
    }

    /// algebraic species rows, valid at every point including the boundaries
    fn closure_row(&self, k: usize, j: usize, ctx: &AssemblyContext) -> f64 {
        let x = ctx.flow;
        if k == self.roles.bath {
            let sum: f64 = (0..self.n_species()).map(|s| x[(C_Y + s, j)]).sum();
            sum - 1.0
        } else {
            // charge neutrality expressed as an electron mass fraction
            let w_e = self.roles.mw[k];
            (0..self.n_species())
                .filter(|s| self.roles.charges[*s] != 0.0)
                .map(|s| self.roles.charges[s] * x[(C_Y + s, j)] / self.roles.mw[s])
                .sum::<f64>()
                * w_e
        }
    }

    fn mass_flux(&self, j: usize, ctx: &AssemblyContext) -> f64 {
        ctx.props[j].rho * ctx.flow[(C_U, j)]
    }

    fn continuity(&self, j: usize, ctx: &AssemblyContext) -> f64 {
        let grid = ctx.grid;
        match ctx.fixed_point {
            Some(pin) if j < pin => {
                -(self.mass_flux(j + 1, ctx) - self.mass_flux(j, ctx)) / grid.dz(j)
            }
            _ if j == 0 => 0.0,
            _ => -(self.mass_flux(j, ctx) - self.mass_flux(j - 1, ctx)) / grid.dz(j - 1),
        }
    }

    /// steady energy balance at interior point j, scaled by ρ cp
    fn energy(&self, j: usize, ctx: &AssemblyContext) -> f64 {
        let (x, grid, props) = (ctx.flow, ctx.grid, &ctx.props);
        let (dzm, dzp) = (grid.dz(j - 1), grid.dz(j));
        let dzc = 0.5 * (dzm + dzp);
        let p = &props[j];
        let u = x[(C_U, j)];
        let (tm, t, tp) = (x[(C_T, j - 1)], x[(C_T, j)], x[(C_T, j + 1)]);
        let dtdz = if u >= 0.0 { (t - tm) / dzm } else { (tp - t) / dzp };
        let lam_m = 0.5 * (props[j - 1].lambda + p.lambda);
        let lam_p = 0.5 * (p.lambda + props[j + 1].lambda);
        let conduction = (lam_p * (tp - t) / dzp - lam_m * (t - tm) / dzm) / dzc;
        let heat_release: f64 = -p
            .wdot
            .iter()
            .zip(&p.h_molar)
            .map(|(w, h)| w * h)
            .sum::<f64>();
        (-p.rho * u * p.cp * dtdz + conduction + heat_release) / (p.rho * p.cp)
    }

    /// steady species balance at interior point j, scaled by ρ
    fn species(&self, k: usize, j: usize, ctx: &AssemblyContext) -> f64 {
        let (x, grid) = (ctx.flow, ctx.grid);
        let (dzm, dzp) = (grid.dz(j - 1), grid.dz(j));
        let dzc = 0.5 * (dzm + dzp);
        let p = &ctx.props[j];
        let u = x[(C_U, j)];
        let c = C_Y + k;
        let dydz = if u >= 0.0 {
            (x[(c, j)] - x[(c, j - 1)]) / dzm
        } else {
            (x[(c, j + 1)] - x[(c, j)]) / dzp
        };
        let divergence = (ctx.fluxes[(k, j)] - ctx.fluxes[(k, j - 1)]) / dzc;
        (-p.rho * u * dydz - divergence + self.roles.mw[k] * p.wdot[k]) / p.rho
    }

    fn poisson(&self, j: usize, ctx: &AssemblyContext) -> f64 {
        let x = ctx.flow;
        let dzm = ctx.grid.dz(j - 1);
        let q = 0.5 * (ctx.props[j].charge_density + ctx.props[j - 1].charge_density);
        (x[(C_E, j)] - x[(C_E, j - 1)]) / dzm - q / EPS0
    }

    fn transient(&self, c: usize, j: usize, ctx: &AssemblyContext) -> f64 {
        if !self.is_transient_row(c, j, ctx.grid.len(), ctx.fixed_point) {
            return 0.0;
        }
        match ctx.flow_old {
            Some(old) if ctx.rdt > 0.0 => ctx.rdt * (ctx.flow[(c, j)] - old[(c, j)]),
            _ => 0.0,
        }
    }

    /// Whether row `c` of point `j` carries a time derivative during pseudo-transient stepping.
    pub fn is_transient_row(&self, c: usize, j: usize, n_points: usize, fixed: Option<usize>) -> bool {
        if j == 0 || j + 1 == n_points {
            return false;
        }
        match c {
            C_U | C_E => false,
            C_T => fixed != Some(j),
            _ => !self.is_algebraic_species(c - C_Y),
        }
    }

    /// Electron Debye length (m) at one point, infinite where no electrons are present.
    pub fn debye_length(&self, props: &PointProperties, t: f64, y: &[f64]) -> f64 {
        let electrons = match self.roles.electron {
            Some(e) => AVOGADRO * props.rho * y[e] / self.roles.mw[e],
            None => 0.0,
        };
        if electrons <= 0.0 {
            return f64::INFINITY;
        }
        (EPS0 * BOLTZMANN * t / (electrons * ELEMENTARY_CHARGE * ELEMENTARY_CHARGE)).sqrt()
    }
}

impl Domain1D for FreeFlow1D {
    fn domain_name(&self) -> &'static str {
        "FreeFlow"
    }

    fn n_components(&self) -> usize {
        C_Y + self.n_species()
    }

    fn component_names(&self) -> Vec<String> {
        let mut names = vec!["velocity".to_string(), "T".to_string(), "eField".to_string()];
        names.extend(self.species_names.iter().cloned());
        names
    }

    fn n_points(&self, grid: &Grid) -> usize {
        grid.len()
    }

    fn residual_at(&self, j: usize, ctx: &AssemblyContext) -> Vec<f64> {
        let n_points = ctx.grid.len();
        let boundary = j == 0 || j + 1 == n_points;
        let x = ctx.flow;
        let mut r = vec![0.0; self.n_components()];

        r[C_U] = self.continuity(j, ctx);
        r[C_E] = match self.stage {
            _ if j == 0 => 0.0,
            SolveStage::NoField => x[(C_E, j)],
            SolveStage::WithField => self.poisson(j, ctx),
        };
        for k in 0..self.n_species() {
            if self.is_algebraic_species(k) {
                r[C_Y + k] = self.closure_row(k, j, ctx);
            } else if !boundary {
                r[C_Y + k] = self.species(k, j, ctx) - self.transient(C_Y + k, j, ctx);
            }
        }
        if !boundary {
            if ctx.fixed_point == Some(j) {
                r[C_T] = x[(C_T, j)] - self.fixed_temperature.unwrap_or(x[(C_T, j)]);
                r[C_U] = self.energy(j, ctx);
            } else {
                r[C_T] = self.energy(j, ctx) - self.transient(C_T, j, ctx);
            }
        }
        r
    }

    fn boundary_stitch(&self, _ctx: &AssemblyContext, _flow_rsd: &mut DMatrix<f64>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bernoulli() {
        assert_relative_eq!(bernoulli(0.0), 1.0);
        assert_relative_eq!(bernoulli(1e-8), 1.0, epsilon = 1e-8);
        assert_relative_eq!(bernoulli(1.0), 1.0 / (1.0f64.exp() - 1.0), epsilon = 1e-14);
        // B(-x) = B(x) + x
        for x in [0.3, 2.0, 15.0] {
            assert_relative_eq!(bernoulli(-x), bernoulli(x) + x, epsilon = 1e-10);
        }
        assert_eq!(bernoulli(800.0), 0.0);
        assert_relative_eq!(bernoulli(-800.0), 800.0, epsilon = 1e-9);
    }
}
