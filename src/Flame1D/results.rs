//! # Results
//!
//! Projection of a converged [`Sim1D`] state onto the outputs of a run: flame profile, gap voltage,
//! CSV tables and a JSON solution snapshot. Nothing here evaluates physics; every value is read
//! from the unknown vector or the grid.
//!
//! ## CSV layout
//! ```text
//! gapvoltage_phi1.000000_eField10000.000000.csv
//! eField, gapVoltage
//!  1.000000000000e+04, 9.999999999999e+02
//!
//! flamespeed_phi1.000000_eField10000.000000.csv
//!   Grid,   Temperature,   Uvec,   E,    eField
//!  0.000000000000e+00, 3.000000000000e+02, ...
//! ```
use super::flame_error::FlameError;
use super::flow_equations::SolveStage;
use super::sim1d::{FLOW, INLET, Sim1D};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Per-point arrays of the flow solution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct FlameProfile {
    /// axial position (m)
    pub z: Vec<f64>,
    /// temperature (K)
    pub T: Vec<f64>,
    /// axial velocity (m/s)
    pub velocity: Vec<f64>,
    /// electron mass fraction
    pub E: Vec<f64>,
    /// electric field (V/m)
    pub eField: Vec<f64>,
}

impl FlameProfile {
    pub fn from_sim(sim: &Sim1D) -> Result<Self, FlameError> {
        let flow = sim.flow()?;
        let electron = match flow.roles.electron {
            Some(k) => sim.flow_profile(&flow.species_names[k])?,
            None => vec![0.0; sim.n_points()],
        };
        Ok(Self {
            z: sim.grid.points().to_vec(),
            T: sim.flow_profile("T")?,
            velocity: sim.flow_profile("velocity")?,
            E: electron,
            eField: sim.flow_profile("eField")?,
        })
    }

    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    /// Potential difference across the domain, trapezoidal ∫ eField dz (V).
    pub fn gap_voltage(&self) -> f64 {
        self.z
            .windows(2)
            .zip(self.eField.windows(2))
            .map(|(z, e)| 0.5 * (e[0] + e[1]) * (z[1] - z[0]))
            .sum()
    }

    /// unburnt gas velocity at the inlet (m/s)
    pub fn flame_speed(&self) -> f64 {
        self.velocity.first().copied().unwrap_or(f64::NAN)
    }
}

/// One row of the gap-voltage table; `gap_voltage` is NaN when the field stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapVoltageRecord {
    pub e_field: f64,
    pub gap_voltage: f64,
}

/// `{:16.12e}` with a signed, at least two-digit exponent: ` 1.000000000000e+04`.
pub fn format_scientific(value: f64) -> String {
    let body = if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let inf = if value > 0.0 { "inf" } else { "-inf" };
        inf.to_string()
    } else {
        let s = format!("{:.12e}", value);
        match s.split_once('e') {
            Some((mantissa, exponent)) => {
                let exp: i32 = exponent.parse().unwrap_or(0);
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{}e{}{:02}", mantissa, sign, exp.abs())
            }
            None => s,
        }
    };
    format!("{:>16}", body)
}

/// `phi{phi}_eField{eField}` with six decimals, as used by every output file name
pub fn output_stem(phi: f64, e_field: f64) -> String {
    format!("phi{:.6}_eField{:.6}", phi, e_field)
}

fn csv_row(values: &[f64]) -> String {
    let cells: Vec<String> = values.iter().map(|v| format_scientific(*v)).collect();
    format!(" {}\n", cells.join(", "))
}

pub fn write_gap_voltage_csv(
    dir: &Path,
    phi: f64,
    e_field: f64,
    records: &[GapVoltageRecord],
) -> Result<PathBuf, FlameError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("gapvoltage_{}.csv", output_stem(phi, e_field)));
    let mut content = String::from("eField, gapVoltage\n");
    for r in records {
        content.push_str(&csv_row(&[r.e_field, r.gap_voltage]));
    }
    fs::write(&path, content)?;
    info!("gap voltage written to {}", path.display());
    Ok(path)
}

pub fn write_profile_csv(
    dir: &Path,
    phi: f64,
    e_field: f64,
    profile: &FlameProfile,
) -> Result<PathBuf, FlameError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("flamespeed_{}.csv", output_stem(phi, e_field)));
    let mut content = String::from("  Grid,   Temperature,   Uvec,   E,    eField\n");
    for j in 0..profile.len() {
        content.push_str(&csv_row(&[
            profile.z[j],
            profile.T[j],
            profile.velocity[j],
            profile.E[j],
            profile.eField[j],
        ]));
    }
    fs::write(&path, content)?;
    info!("profile written to {}", path.display());
    Ok(path)
}

/// Converged state that can re-seed a later run on the same grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionSnapshot {
    pub grid: Vec<f64>,
    pub max_points: usize,
    pub inlet_names: Vec<String>,
    pub inlet: Vec<f64>,
    pub component_names: Vec<String>,
    /// flow values, one inner vector per grid point
    pub flow: Vec<Vec<f64>>,
    pub stage: SolveStage,
    pub fixed_temperature: Option<f64>,
    pub fixed_position: Option<f64>,
}

impl SolutionSnapshot {
    pub fn from_sim(sim: &Sim1D) -> Result<Self, FlameError> {
        let flow_domain = sim.flow()?;
        let flow = sim.flow_solution();
        let n_inlet = sim.component_names(INLET).len();
        Ok(Self {
            grid: sim.grid.points().to_vec(),
            max_points: sim.grid.max_points,
            inlet_names: sim.component_names(INLET),
            inlet: sim.x.as_slice()[..n_inlet].to_vec(),
            component_names: sim.component_names(FLOW),
            flow: flow
                .column_iter()
                .map(|col| col.iter().copied().collect())
                .collect(),
            stage: flow_domain.stage,
            fixed_temperature: flow_domain.fixed_temperature,
            fixed_position: flow_domain.fixed_position,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), FlameError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, FlameError> {
        let content = fs::read_to_string(path)?;
        let snapshot = serde_json::from_str(&content)?;
        Ok(snapshot)
    }
}

pub fn snapshot_path(dir: &Path, phi: f64, e_field: f64) -> PathBuf {
    dir.join(format!("flamespeed_{}.json", output_stem(phi, e_field)))
}
