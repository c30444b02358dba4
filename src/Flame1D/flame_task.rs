//! # Flame Speed Task
//!
//! One complete run: inlet mixture from the equivalence ratio, adiabatic flame temperature,
//! composite setup with the initial guess, the two-stage solve and the outputs.
//!
//! ```rust, ignore
//! let task = FlameSpeedTask::new(FlameConfig::default(), RunParameters::new(1.0, 1e4))?;
//! let run = task.run_default_mechanism()?;
//! run.write_outputs(Path::new("."))?;
//! ```
//! Stage failures do not make `run` fail: they end up in `FlameRun::failure`, with the gap voltage
//! set to NaN and the Stage-1 profile kept when it exists.
use super::continuation::{ContinuationDriver, DriverState, StageSummary};
use super::domains::{Domain, Inlet1D, Outlet1D, SpeciesRoles};
use super::flame_config::FlameConfig;
use super::flame_error::FlameError;
use super::flame_utils::{InitialConfig, InitialTemplate};
use super::flow_equations::{FreeFlow1D, SolveStage};
use super::grid::Grid;
use super::newton_solver::{DampedNewton, TimeStepper};
use super::results::{
    FlameProfile, GapVoltageRecord, SolutionSnapshot, snapshot_path, write_gap_voltage_csv,
    write_profile_csv,
};
use super::sim1d::Sim1D;
use crate::Providers::methane_air_ions::MethaneAirIons;
use crate::Providers::provider_api::{EquilibriumConstraint, GasState, Providers};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Parameters given on the command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    /// equivalence ratio
    pub phi: f64,
    /// applied electric field (V/m)
    pub e_field: f64,
    pub refine_grid: bool,
    pub loglevel: usize,
}

impl RunParameters {
    pub fn new(phi: f64, e_field: f64) -> Self {
        Self {
            phi,
            e_field,
            refine_grid: true,
            loglevel: 1,
        }
    }

    pub fn validate(&self) -> Result<(), FlameError> {
        if !self.phi.is_finite() || self.phi <= 0.0 {
            return Err(FlameError::InvalidInput(format!(
                "equivalence ratio must be positive, got {}",
                self.phi
            )));
        }
        if !self.e_field.is_finite() {
            return Err(FlameError::InvalidInput(format!(
                "electric field must be finite, got {}",
                self.e_field
            )));
        }
        Ok(())
    }
}

/// Unburnt and burnt states bracketing the flame
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct InletMixture {
    pub Y_in: Vec<f64>,
    pub rho_in: f64,
    /// adiabatic flame temperature (K)
    pub Tad: f64,
    pub Y_out: Vec<f64>,
    pub rho_out: f64,
}

/// Everything a run produced, including partial data after a failed stage
#[derive(Debug)]
pub struct FlameRun {
    pub params: RunParameters,
    #[allow(non_snake_case)]
    pub Tad: f64,
    pub stages: Vec<StageSummary>,
    pub final_state: DriverState,
    pub history: Vec<DriverState>,
    pub failure: Option<FlameError>,
    pub profile: Option<FlameProfile>,
    /// NaN unless the field stage converged
    pub gap_voltage: f64,
    pub snapshot: Option<SolutionSnapshot>,
}

impl FlameRun {
    pub fn converged(&self) -> bool {
        self.failure.is_none() && self.stages.len() == 2
    }

    pub fn flame_speed(&self) -> f64 {
        self.profile
            .as_ref()
            .map(|p| p.flame_speed())
            .unwrap_or(f64::NAN)
    }

    /// Writes the gap-voltage table, and the profile and snapshot when a profile exists.
    pub fn write_outputs(&self, dir: &Path) -> Result<Vec<PathBuf>, FlameError> {
        let (phi, e_field) = (self.params.phi, self.params.e_field);
        let record = GapVoltageRecord {
            e_field,
            gap_voltage: self.gap_voltage,
        };
        let mut written = vec![write_gap_voltage_csv(dir, phi, e_field, &[record])?];
        if let Some(profile) = &self.profile {
            written.push(write_profile_csv(dir, phi, e_field, profile)?);
        }
        if let Some(snapshot) = &self.snapshot {
            let path = snapshot_path(dir, phi, e_field);
            snapshot.save(&path)?;
            written.push(path);
        }
        Ok(written)
    }

    pub fn pretty_print(&self) {
        use prettytable::{Table, row};
        println!("\n=== FLAME SPEED RUN ===");
        let mut table = Table::new();
        table.add_row(row!["Stage", "Points", "Newton its", "Time steps", "Refinements", "mdot (kg/m2/s)"]);
        for s in &self.stages {
            table.add_row(row![
                format!("{:?}", s.stage),
                s.grid_points,
                s.newton_iterations,
                s.time_steps,
                s.refinements,
                format!("{:.6e}", s.mdot)
            ]);
        }
        table.printstd();
        println!("Adiabatic flame temperature: {:.2} K", self.Tad);
        println!("Flame speed: {:.5} m/s", self.flame_speed());
        println!("Gap voltage: {:.6e} V", self.gap_voltage);
        match &self.failure {
            Some(e) => println!("Terminated in {} ({})", self.final_state, e),
            None => println!("Terminated in {}", self.final_state),
        }
    }
}

/// Control values of a guess that holds `a` up to the second location, `b` from the
/// second-to-last one on, and varies linearly in between.
pub fn ramp_values(locs: &[f64], a: f64, b: f64) -> Vec<f64> {
    let n = locs.len();
    if n < 4 {
        return vec![a; n];
    }
    let (start, end) = (locs[1], locs[n - 2]);
    locs.iter()
        .map(|s| {
            if *s <= start {
                a
            } else if *s >= end {
                b
            } else {
                a + (b - a) * (s - start) / (end - start)
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct FlameSpeedTask {
    pub config: FlameConfig,
    pub params: RunParameters,
}

impl FlameSpeedTask {
    /// Validates both inputs; nothing is built when either is invalid.
    pub fn new(config: FlameConfig, params: RunParameters) -> Result<Self, FlameError> {
        params.validate()?;
        config.validate()?;
        Ok(Self { config, params })
    }

    pub fn pretty_print_task(&self) {
        use prettytable::{Table, row};
        let c = &self.config;
        println!("\n=== FLAME SPEED TASK ===");
        let mut table = Table::new();
        table.add_row(row!["Parameter", "Value", "Units"]);
        table.add_row(row!["Equivalence ratio (phi)", format!("{:.4}", self.params.phi), "-"]);
        table.add_row(row!["Applied field (eField)", format!("{:.4e}", self.params.e_field), "V/m"]);
        table.add_row(row!["Pressure (P)", format!("{:.2}", c.pressure), "Pa"]);
        table.add_row(row!["Inlet temperature", format!("{:.2}", c.inlet_temperature), "K"]);
        table.add_row(row!["Inlet velocity", format!("{:.4}", c.inlet_velocity), "m/s"]);
        table.add_row(row!["Domain length", format!("{:.4}", c.domain_length), "m"]);
        table.add_row(row!["Initial points", c.initial_points, "-"]);
        table.add_row(row!["Maximum points", c.max_points, "-"]);
        table.add_row(row!["Grid refinement", self.params.refine_grid, "-"]);
        table.add_row(row![
            "Refine (ratio, slope, curve)",
            format!("{}, {}, {}", c.refine.ratio, c.refine.slope, c.refine.curve),
            "-"
        ]);
        table.add_row(row!["Fuel", c.fuel, "-"]);
        table.add_row(row!["Oxidizer", c.oxidizer, "-"]);
        table.printstd();
    }

    /// Inlet composition and the HP equilibrium state reached from it.
    pub fn inlet_mixture(&self, providers: &Providers) -> Result<InletMixture, FlameError> {
        let thermo = providers.thermo;
        let c = &self.config;
        let x = thermo.equivalence_ratio_mole_fractions(self.params.phi, &c.fuel, &c.oxidizer)?;
        let y_in = thermo.mole_to_mass(&x);
        let state = GasState::new(c.inlet_temperature, c.pressure, &y_in);
        let rho_in = thermo.density(&state)?;
        let burnt = thermo.equilibrate(&state, EquilibriumConstraint::HP)?;
        Ok(InletMixture {
            Y_in: y_in,
            rho_in,
            Tad: burnt.T,
            Y_out: burnt.Y,
            rho_out: burnt.density,
        })
    }

    /// Builds the composite Inlet → FreeFlow → Outlet with the initial guess and the fixed point set.
    pub fn build_sim<'a>(
        &self,
        providers: Providers<'a>,
        mixture: &InletMixture,
    ) -> Result<Sim1D<'a>, FlameError> {
        let c = &self.config;
        let roles = SpeciesRoles::from_thermo(providers.thermo)?;
        let flow = FreeFlow1D::new(&providers, c.pressure)?;
        let mdot = mixture.rho_in * c.inlet_velocity;
        let u_out = mdot / mixture.rho_out;
        let inlet = Inlet1D::new(c.inlet_temperature, mixture.Y_in.clone(), mdot, roles.clone());
        let domains = vec![
            Domain::from(inlet),
            Domain::from(flow),
            Domain::from(Outlet1D::new(roles)),
        ];
        let grid = Grid::uniform(c.initial_points, c.domain_length, c.max_points)?;
        let mut sim = Sim1D::new(
            providers,
            domains,
            grid,
            c.tolerances.clone(),
            c.bounds.clone(),
            c.refine.clone(),
        )?;

        let locs = &c.guess_locations;
        let ramp = |a: f64, b: f64| InitialTemplate::piecewise(locs, &ramp_values(locs, a, b));
        let mut guess = InitialConfig::new();
        guess.set_template("velocity", ramp(c.inlet_velocity, u_out)?);
        guess.set_template("T", ramp(c.inlet_temperature, mixture.Tad)?);
        guess.set_template("eField", InitialTemplate::Constant { value: 0.0 });
        for (k, name) in providers.thermo.species_names().iter().enumerate() {
            guess.set_template(name, ramp(mixture.Y_in[k], mixture.Y_out[k])?);
        }
        sim.set_initial_profiles(&guess);
        sim.set_fixed_temperature(0.5 * (c.inlet_temperature + mixture.Tad))?;
        Ok(sim)
    }

    /// Runs both stages with the given providers.
    ///
    /// Returns `Err` only for failures before the first Newton iteration.
    pub fn run(&self, providers: Providers) -> Result<FlameRun, FlameError> {
        let (phi, e_field) = (self.params.phi, self.params.e_field);
        let mixture = self.inlet_mixture(&providers)?;
        println!("phi = {}, Tad = {}", phi, mixture.Tad);
        let mut sim = self.build_sim(providers, &mixture)?;
        if self.params.loglevel > 1 {
            sim.show_solution();
        }

        let mut driver = ContinuationDriver::new(
            DampedNewton::new(self.config.newton.clone()),
            TimeStepper::new(self.config.time_step.clone()),
            self.params.refine_grid,
        );
        let (stages, failure) = driver.run(&mut sim, e_field);
        if let Some(e) = &failure {
            error!("run stopped in {}: {}", e.kind(), e);
        }

        let has_profile = !stages.is_empty()
            || matches!(failure, Some(FlameError::RefinementLimitExceeded { .. }));
        let (profile, snapshot) = if has_profile {
            (
                Some(FlameProfile::from_sim(&sim)?),
                Some(SolutionSnapshot::from_sim(&sim)?),
            )
        } else {
            (None, None)
        };
        let field_converged = failure.is_none()
            && stages.last().map(|s| s.stage) == Some(SolveStage::WithField);
        let gap_voltage = match (&profile, field_converged) {
            (Some(p), true) => p.gap_voltage(),
            _ => f64::NAN,
        };
        println!("Electric Field: {} Gap voltage: {}", e_field, gap_voltage);
        if let Ok(debye) = sim.min_debye_length() {
            info!("smallest Debye length {:.3e} m", debye);
        }
        if self.params.loglevel > 0 {
            sim.show_solution();
        }

        Ok(FlameRun {
            params: self.params.clone(),
            Tad: mixture.Tad,
            stages,
            final_state: driver.state,
            history: driver.history,
            failure,
            profile,
            gap_voltage,
            snapshot,
        })
    }

    /// Runs with the built-in reduced mechanism configured by `config.mechanism`.
    pub fn run_default_mechanism(&self) -> Result<FlameRun, FlameError> {
        let mechanism = MethaneAirIons::new(self.config.mechanism.clone());
        self.run(Providers::from_mechanism(&mechanism))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ramp_values() {
        let locs = [0.0, 0.3, 0.7, 1.0];
        assert_eq!(ramp_values(&locs, 300.0, 2200.0), vec![300.0, 300.0, 2200.0, 2200.0]);

        let locs = [0.0, 0.2, 0.4, 0.6, 1.0];
        let v = ramp_values(&locs, 0.0, 1.0);
        assert_eq!(v[0], 0.0);
        assert_eq!(v[1], 0.0);
        assert_relative_eq!(v[2], 0.5, epsilon = 1e-12);
        assert_eq!(v[3], 1.0);
        assert_eq!(v[4], 1.0);
    }

    #[test]
    fn test_build_with_more_guess_locations() {
        let gas = MethaneAirIons::default();
        let providers = Providers::from_mechanism(&gas);
        let config = FlameConfig {
            guess_locations: vec![0.0, 0.2, 0.5, 0.8, 1.0],
            ..FlameConfig::default()
        };
        let task = FlameSpeedTask::new(config, RunParameters::new(1.0, 0.0)).unwrap();
        let mixture = task.inlet_mixture(&providers).unwrap();
        let sim = task.build_sim(providers, &mixture).unwrap();
        let t = sim.flow_profile("T").unwrap();
        assert_relative_eq!(t[0], 300.0);
        assert_relative_eq!(*t.last().unwrap(), mixture.Tad, max_relative = 1e-12);
        assert!(t.windows(2).all(|w| w[1] >= w[0]));
        assert!(sim.flow().unwrap().fixed_point(&sim.grid).is_some());
    }
}
