//! Reduced methane/air mechanism with chemi-ionization.
//!
//! Ideal gas with constant molar heat capacities, one global combustion step, one
//! chemi-ionization step producing HCO+ and free electrons, and dissociative recombination.
//! Transport is mixture-averaged with fixed Lewis numbers for the neutrals; charged species get
//! their diffusivities from the mobility through the Einstein relation.
use super::provider_api::{
    BOLTZMANN, ELEMENTARY_CHARGE, EquilibriumConstraint, EquilibriumState, GasState,
    KineticsProvider, ONE_ATM, ProviderError, R_GAS, T_REF, ThermoProvider, TransportProvider,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const ATOMIC_WEIGHTS: [(&str, f64); 5] = [
    ("C", 12.011),
    ("H", 1.008),
    ("O", 15.999),
    ("N", 14.007),
    ("E", 5.48579909e-4),
];

/// Tunable constants of the reduced mechanism
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[allow(non_snake_case)]
pub struct MechanismConfig {
    /// pre-exponential factor of the global step (m³/kmol/s)
    pub A: f64,
    /// activation temperature of the global step (K)
    pub Ta: f64,
    /// ion pairs produced per fuel molecule burnt
    pub ionization_yield: f64,
    /// recombination rate constant at 300 K (m³/kmol/s)
    pub recombination_k300: f64,
    /// thermal conductivity at 300 K (W/m/K)
    pub lambda0: f64,
    /// HCO+ mobility at 300 K and 1 atm (m²/V/s)
    pub ion_mobility0: f64,
    /// electron mobility (m²/V/s)
    pub electron_mobility: f64,
}

impl Default for MechanismConfig {
    fn default() -> Self {
        Self {
            A: 1.0e11,
            Ta: 15100.0,
            ionization_yield: 1.0e-11,
            recombination_k300: 1.45e14,
            lambda0: 0.0262,
            ion_mobility0: 2.5e-4,
            electron_mobility: 0.4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpeciesData {
    pub name: String,
    pub elements: HashMap<String, f64>,
    pub charge: f64,
    /// constant molar heat capacity (J/kmol/K)
    pub cp_molar: f64,
    /// formation enthalpy at 298.15 K (J/kmol)
    pub h_formation: f64,
    /// Lewis number used for neutral diffusivities
    pub lewis: f64,
}

impl SpeciesData {
    fn new(
        name: &str,
        elements: &[(&str, f64)],
        charge: f64,
        cp_molar: f64,
        h_formation: f64,
        lewis: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            elements: elements
                .iter()
                .map(|(el, n)| (el.to_string(), *n))
                .collect(),
            charge,
            cp_molar,
            h_formation,
            lewis,
        }
    }

    pub fn molar_mass(&self) -> f64 {
        self.elements
            .iter()
            .map(|(el, n)| {
                let w = ATOMIC_WEIGHTS
                    .iter()
                    .find(|(name, _)| name == el)
                    .map(|(_, w)| *w)
                    .unwrap_or(0.0);
                n * w
            })
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct MethaneAirIons {
    pub species: Vec<SpeciesData>,
    pub config: MechanismConfig,
    names: Vec<String>,
    mw: Vec<f64>,
    charges: Vec<f64>,
    elements: Vec<HashMap<String, f64>>,
}

// species indices
const CH4: usize = 0;
const O2: usize = 1;
const H2O: usize = 2;
const CO2: usize = 3;
const N2: usize = 4;
const HCO_ION: usize = 5;
const ELECTRON: usize = 6;

impl MethaneAirIons {
    pub fn new(config: MechanismConfig) -> Self {
        let species = vec![
            SpeciesData::new("CH4", &[("C", 1.0), ("H", 4.0)], 0.0, 70.0e3, -74.6e6, 0.97),
            SpeciesData::new("O2", &[("O", 2.0)], 0.0, 36.0e3, 0.0, 1.11),
            SpeciesData::new("H2O", &[("H", 2.0), ("O", 1.0)], 0.0, 44.0e3, -241.826e6, 0.83),
            SpeciesData::new("CO2", &[("C", 1.0), ("O", 2.0)], 0.0, 55.0e3, -393.51e6, 1.39),
            SpeciesData::new("N2", &[("N", 2.0)], 0.0, 34.5e3, 0.0, 1.0),
            SpeciesData::new(
                "HCO+",
                &[("H", 1.0), ("C", 1.0), ("O", 1.0), ("E", -1.0)],
                1.0,
                45.0e3,
                8.25e8,
                1.0,
            ),
            SpeciesData::new("E", &[("E", 1.0)], -1.0, 2.5 * R_GAS, 0.0, 1.0),
        ];
        let names = species.iter().map(|s| s.name.clone()).collect();
        let mw = species.iter().map(|s| s.molar_mass()).collect();
        let charges = species.iter().map(|s| s.charge).collect();
        let elements = species.iter().map(|s| s.elements.clone()).collect();
        Self {
            species,
            config,
            names,
            mw,
            charges,
            elements,
        }
    }

    /// index of the bath gas, whose mass fraction closes the sum of mass fractions
    pub fn bath_species(&self) -> usize {
        N2
    }

    fn concentrations(&self, state: &GasState, rho: f64) -> Vec<f64> {
        state
            .Y
            .iter()
            .zip(&self.mw)
            .map(|(y, w)| (rho * y / w).max(0.0))
            .collect()
    }

    fn cp_mass_of(&self, y: &[f64]) -> f64 {
        y.iter()
            .zip(self.species.iter().zip(&self.mw))
            .map(|(yk, (s, wk))| yk * s.cp_molar / wk)
            .sum()
    }

    /// complete-combustion product mole numbers of a mixture given by mole numbers `n`
    fn complete_combustion(&self, n: &[f64]) -> Vec<f64> {
        let mut p = n.to_vec();
        // ions recombine before the products are formed
        let pairs = p[HCO_ION].min(p[ELECTRON]);
        p[HCO_ION] -= pairs;
        p[ELECTRON] -= pairs;
        p[CO2] += pairs;
        p[H2O] += 0.5 * pairs;
        p[O2] -= 0.75 * pairs;
        let burnt = p[CH4].min(0.5 * p[O2].max(0.0));
        p[CH4] -= burnt;
        p[O2] -= 2.0 * burnt;
        p[CO2] += burnt;
        p[H2O] += 2.0 * burnt;
        p.iter_mut().for_each(|pk| *pk = pk.max(0.0));
        p
    }
}

impl Default for MethaneAirIons {
    fn default() -> Self {
        Self::new(MechanismConfig::default())
    }
}

impl ThermoProvider for MethaneAirIons {
    fn n_species(&self) -> usize {
        self.species.len()
    }
    fn species_names(&self) -> &[String] {
        &self.names
    }
    fn molecular_weights(&self) -> &[f64] {
        &self.mw
    }
    fn charges(&self) -> &[f64] {
        &self.charges
    }
    fn species_elements(&self) -> &[HashMap<String, f64>] {
        &self.elements
    }

    fn density(&self, state: &GasState) -> Result<f64, ProviderError> {
        state.validate(self.n_species())?;
        let w = self.mean_molecular_weight(state.Y);
        let rho = state.P * w / (R_GAS * state.T);
        if !rho.is_finite() || rho <= 0.0 {
            return Err(ProviderError::UnphysicalState(format!(
                "density {} kg/m3 at T = {} K",
                rho, state.T
            )));
        }
        Ok(rho)
    }

    fn cp_mass(&self, state: &GasState) -> Result<f64, ProviderError> {
        state.validate(self.n_species())?;
        let cp = self.cp_mass_of(state.Y);
        if cp <= 0.0 {
            return Err(ProviderError::UnphysicalState(format!(
                "heat capacity {} J/kg/K",
                cp
            )));
        }
        Ok(cp)
    }

    fn enthalpies_molar(&self, t: f64) -> Result<Vec<f64>, ProviderError> {
        if !t.is_finite() || t <= 0.0 {
            return Err(ProviderError::UnphysicalState(format!("temperature {} K", t)));
        }
        Ok(self
            .species
            .iter()
            .map(|s| s.h_formation + s.cp_molar * (t - T_REF))
            .collect())
    }

    fn equilibrate(
        &self,
        state: &GasState,
        constraint: EquilibriumConstraint,
    ) -> Result<EquilibriumState, ProviderError> {
        state.validate(self.n_species())?;
        let n: Vec<f64> = state.Y.iter().zip(&self.mw).map(|(y, w)| y / w).collect();
        let products = self.complete_combustion(&n);
        let total: f64 = products.iter().sum();
        if total <= 0.0 {
            return Err(ProviderError::EquilibriumFailed(
                "empty product mixture".to_string(),
            ));
        }
        let x: Vec<f64> = products.iter().map(|p| p / total).collect();
        let y = self.mole_to_mass(&x);
        let t = match constraint {
            EquilibriumConstraint::TP => state.T,
            EquilibriumConstraint::HP => {
                let h0 = self.enthalpy_mass(state)?;
                let cp = self.cp_mass_of(&y);
                let mut t = state.T;
                let mut converged = false;
                for iter in 0..50 {
                    let h = self.enthalpy_mass(&GasState::new(t, state.P, &y))?;
                    let dt = (h0 - h) / cp;
                    t += dt;
                    debug!("HP equilibrium iteration {}: T = {}", iter, t);
                    if dt.abs() < 1e-9 * t {
                        converged = true;
                        break;
                    }
                }
                if !converged || !t.is_finite() || t <= 0.0 {
                    return Err(ProviderError::EquilibriumFailed(format!(
                        "enthalpy balance did not converge, T = {}",
                        t
                    )));
                }
                t
            }
        };
        let density = self.density(&GasState::new(t, state.P, &y))?;
        Ok(EquilibriumState { T: t, Y: y, density })
    }
}

impl KineticsProvider for MethaneAirIons {
    fn net_production_rates(&self, state: &GasState) -> Result<Vec<f64>, ProviderError> {
        let rho = self.density(state)?;
        let c = self.concentrations(state, rho);
        let t = state.T;
        let cfg = &self.config;
        let r1 = cfg.A * (-cfg.Ta / t).exp() * c[CH4] * c[O2];
        let r2 = cfg.ionization_yield * r1;
        let r3 = cfg.recombination_k300 * (300.0 / t).powf(0.7) * c[HCO_ION] * c[ELECTRON];
        let mut wdot = vec![0.0; self.n_species()];
        wdot[CH4] = -r1 - r2;
        wdot[O2] = -2.0 * r1 - 1.25 * r2 - 0.75 * r3;
        wdot[H2O] = 2.0 * r1 + 1.5 * r2 + 0.5 * r3;
        wdot[CO2] = r1 + r3;
        wdot[HCO_ION] = r2 - r3;
        wdot[ELECTRON] = r2 - r3;
        Ok(wdot)
    }
}

impl TransportProvider for MethaneAirIons {
    fn thermal_conductivity(&self, state: &GasState) -> Result<f64, ProviderError> {
        state.validate(self.n_species())?;
        Ok(self.config.lambda0 * (state.T / 300.0).powf(0.7))
    }

    fn mix_diffusion_coeffs(&self, state: &GasState) -> Result<Vec<f64>, ProviderError> {
        let rho = self.density(state)?;
        let cp = self.cp_mass(state)?;
        let lambda = self.thermal_conductivity(state)?;
        let mobilities = self.mobilities(state)?;
        let thermal_voltage = BOLTZMANN * state.T / ELEMENTARY_CHARGE;
        Ok(self
            .species
            .iter()
            .zip(mobilities)
            .map(|(s, mu)| {
                if s.charge != 0.0 {
                    mu * thermal_voltage
                } else {
                    lambda / (rho * cp * s.lewis)
                }
            })
            .collect())
    }

    fn mobilities(&self, state: &GasState) -> Result<Vec<f64>, ProviderError> {
        state.validate(self.n_species())?;
        let mut mu = vec![0.0; self.n_species()];
        mu[HCO_ION] = self.config.ion_mobility0 * (state.T / 300.0) * (ONE_ATM / state.P);
        mu[ELECTRON] = self.config.electron_mobility;
        Ok(mu)
    }
}
