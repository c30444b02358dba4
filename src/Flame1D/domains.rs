//! Domains of the composite problem and the data shared by one residual assembly.
//!
//! The composite is a fixed sequence Inlet → FreeFlow → Outlet. Every domain exposes the same
//! capability set through [`Domain1D`]; dispatch is static via `enum_dispatch` over [`Domain`].
//! Boundary domains own the rows of the neighbouring flow point that depend on them
//! (`boundary_stitch`), so the flow never reads another domain's parameters directly.
use super::flame_error::FlameError;
use super::flow_equations::{FreeFlow1D, SolveStage};
use super::grid::Grid;
use crate::Providers::provider_api::{Providers, ThermoProvider};
use enum_dispatch::enum_dispatch;
use nalgebra::DMatrix;

/// flow component offsets
pub const C_U: usize = 0;
pub const C_T: usize = 1;
pub const C_E: usize = 2;
pub const C_Y: usize = 3;

/// inlet component offsets
pub const I_MDOT: usize = 0;
pub const I_T: usize = 1;
pub const I_E: usize = 2;

/// Which species play special roles in the equations
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesRoles {
    pub n_species: usize,
    pub charges: Vec<f64>,
    pub mw: Vec<f64>,
    /// species whose mass fraction closes Σ Y = 1
    pub bath: usize,
    /// lightest negatively charged species
    pub electron: Option<usize>,
}

impl SpeciesRoles {
    /// Bath species is "N2" when present, otherwise the heaviest neutral species.
    pub fn from_thermo(thermo: &dyn ThermoProvider) -> Result<Self, FlameError> {
        let charges = thermo.charges().to_vec();
        let mw = thermo.molecular_weights().to_vec();
        let n_species = thermo.n_species();
        if n_species == 0 || charges.len() != n_species || mw.len() != n_species {
            return Err(FlameError::InvalidInput(
                "provider reports inconsistent species data".to_string(),
            ));
        }
        let bath = match thermo.species_index("N2") {
            Some(k) => k,
            None => (0..n_species)
                .filter(|k| charges[*k] == 0.0)
                .max_by(|a, b| mw[*a].total_cmp(&mw[*b]))
                .ok_or_else(|| {
                    FlameError::InvalidInput("mechanism has no neutral species".to_string())
                })?,
        };
        let electron = (0..n_species)
            .filter(|k| charges[*k] < 0.0)
            .min_by(|a, b| mw[*a].total_cmp(&mw[*b]));
        Ok(Self {
            n_species,
            charges,
            mw,
            bath,
            electron,
        })
    }

    pub fn is_charged(&self, k: usize) -> bool {
        self.charges[k] != 0.0
    }
}

/// Properties of one grid point at the current iterate
#[derive(Debug, Clone)]
pub struct PointProperties {
    /// density (kg/m³)
    pub rho: f64,
    /// heat capacity (J/kg/K)
    pub cp: f64,
    /// thermal conductivity (W/m/K)
    pub lambda: f64,
    /// mixture-averaged diffusion coefficients (m²/s)
    pub diffusivity: Vec<f64>,
    /// mobilities (m²/V/s)
    pub mobility: Vec<f64>,
    /// net production rates (kmol/m³/s)
    pub wdot: Vec<f64>,
    /// molar enthalpies (J/kmol)
    pub h_molar: Vec<f64>,
    /// space charge density (C/m³)
    pub charge_density: f64,
}

/// Frozen view of the composite solution used by one residual assembly.
///
/// Point properties and midpoint fluxes are evaluated once per assembly; every point residual then
/// reads only its own and its neighbours' entries.
pub struct AssemblyContext<'a> {
    pub providers: Providers<'a>,
    pub grid: &'a Grid,
    pub stage: SolveStage,
    /// inlet unknowns: mass flux, temperature, field
    pub inlet: &'a [f64],
    /// flow unknowns, (components × points)
    pub flow: &'a DMatrix<f64>,
    /// flow unknowns at the previous pseudo-time level
    pub flow_old: Option<&'a DMatrix<f64>>,
    /// reciprocal pseudo-time step, zero for steady solves
    pub rdt: f64,
    pub fixed_point: Option<usize>,
    pub props: Vec<PointProperties>,
    /// species fluxes at interval midpoints, (species × intervals)
    pub fluxes: DMatrix<f64>,
}

#[enum_dispatch]
pub trait Domain1D {
    fn domain_name(&self) -> &'static str;
    fn n_components(&self) -> usize;
    fn component_names(&self) -> Vec<String>;
    fn n_points(&self, grid: &Grid) -> usize;
    /// residuals of all components of this domain at `point`
    fn residual_at(&self, point: usize, ctx: &AssemblyContext) -> Vec<f64>;
    /// overwrite the flow rows this boundary is responsible for
    fn boundary_stitch(&self, ctx: &AssemblyContext, flow_rsd: &mut DMatrix<f64>);
}

#[derive(Debug, Clone)]
#[enum_dispatch(Domain1D)]
pub enum Domain {
    Inlet(Inlet1D),
    FreeFlow(FreeFlow1D),
    Outlet(Outlet1D),
}

/// Upstream boundary: fixed temperature and composition, applied field, floating mass flux.
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct Inlet1D {
    /// inlet temperature (K)
    pub temperature: f64,
    /// inlet mass fractions
    pub Y: Vec<f64>,
    /// imposed mass flux (kg/m²/s), only used when the flow has no fixed point
    pub mdot: f64,
    /// applied electric field (V/m)
    pub e_field: f64,
    pub roles: SpeciesRoles,
    pub stage: SolveStage,
}

impl Inlet1D {
    #[allow(non_snake_case)]
    pub fn new(temperature: f64, Y: Vec<f64>, mdot: f64, roles: SpeciesRoles) -> Self {
        Self {
            temperature,
            Y,
            mdot,
            e_field: 0.0,
            roles,
            stage: SolveStage::NoField,
        }
    }

    pub fn set_e_field(&mut self, e_field: f64) {
        self.e_field = e_field;
    }
}

impl Domain1D for Inlet1D {
    fn domain_name(&self) -> &'static str {
        "Inlet"
    }

    fn n_components(&self) -> usize {
        3
    }

    fn component_names(&self) -> Vec<String> {
        vec!["mdot".to_string(), "temperature".to_string(), "eField".to_string()]
    }

    fn n_points(&self, _grid: &Grid) -> usize {
        1
    }

    fn residual_at(&self, _point: usize, ctx: &AssemblyContext) -> Vec<f64> {
        let x = ctx.inlet;
        let mdot = match ctx.fixed_point {
            Some(_) => x[I_MDOT] - ctx.props[0].rho * ctx.flow[(C_U, 0)],
            None => x[I_MDOT] - self.mdot,
        };
        vec![mdot, x[I_T] - self.temperature, x[I_E] - self.e_field]
    }

    fn boundary_stitch(&self, ctx: &AssemblyContext, flow_rsd: &mut DMatrix<f64>) {
        let (x, inlet) = (ctx.flow, ctx.inlet);
        let mdot = inlet[I_MDOT];
        if ctx.fixed_point.is_none() {
            flow_rsd[(C_U, 0)] = mdot - ctx.props[0].rho * x[(C_U, 0)];
        }
        flow_rsd[(C_T, 0)] = x[(C_T, 0)] - inlet[I_T];
        flow_rsd[(C_E, 0)] = x[(C_E, 0)] - inlet[I_E];
        for k in 0..self.roles.n_species {
            if k == self.roles.bath
                || (self.stage == SolveStage::NoField && self.roles.electron == Some(k))
            {
                continue;
            }
            let c = C_Y + k;
            flow_rsd[(c, 0)] = if self.roles.is_charged(k) {
                // charged species are absorbed at the inlet
                x[(c, 0)]
            } else {
                mdot * self.Y[k] - (mdot * x[(c, 0)] + ctx.fluxes[(k, 0)])
            };
        }
    }
}

/// Downstream boundary: zero axial gradients, no unknowns of its own.
#[derive(Debug, Clone)]
pub struct Outlet1D {
    pub roles: SpeciesRoles,
    pub stage: SolveStage,
}

impl Outlet1D {
    pub fn new(roles: SpeciesRoles) -> Self {
        Self {
            roles,
            stage: SolveStage::NoField,
        }
    }
}

impl Domain1D for Outlet1D {
    fn domain_name(&self) -> &'static str {
        "Outlet"
    }

    fn n_components(&self) -> usize {
        0
    }

    fn component_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn n_points(&self, _grid: &Grid) -> usize {
        0
    }

    fn residual_at(&self, _point: usize, _ctx: &AssemblyContext) -> Vec<f64> {
        Vec::new()
    }

    fn boundary_stitch(&self, ctx: &AssemblyContext, flow_rsd: &mut DMatrix<f64>) {
        let x = ctx.flow;
        let last = ctx.grid.len() - 1;
        flow_rsd[(C_T, last)] = x[(C_T, last)] - x[(C_T, last - 1)];
        for k in 0..self.roles.n_species {
            if k == self.roles.bath
                || (self.stage == SolveStage::NoField && self.roles.electron == Some(k))
            {
                continue;
            }
            let c = C_Y + k;
            flow_rsd[(c, last)] = x[(c, last)] - x[(c, last - 1)];
        }
    }
}

impl Domain {
    pub fn set_stage(&mut self, stage: SolveStage) {
        match self {
            Domain::Inlet(d) => d.stage = stage,
            Domain::FreeFlow(d) => d.set_stage(stage),
            Domain::Outlet(d) => d.stage = stage,
        }
    }
}
