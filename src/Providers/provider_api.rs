//! Provider interfaces, physical constants and the local gas state.
use std::collections::HashMap;
use thiserror::Error;

/// Universal gas constant in J/(kmol·K)
pub const R_GAS: f64 = 8314.462618;
/// Avogadro's number in 1/kmol
pub const AVOGADRO: f64 = 6.02214076e26;
/// Boltzmann constant (J/K)
pub const BOLTZMANN: f64 = 1.380649e-23;
/// Elementary charge (C)
pub const ELEMENTARY_CHARGE: f64 = 1.602176634e-19;
/// Vacuum permittivity (F/m)
pub const EPS0: f64 = 8.8541878128e-12;
/// One standard atmosphere (Pa)
pub const ONE_ATM: f64 = 101325.0;
/// Reference temperature of the formation enthalpies (K)
pub const T_REF: f64 = 298.15;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Unphysical state: {0}")]
    UnphysicalState(String),
    #[error("Equilibrium calculation failed: {0}")]
    EquilibriumFailed(String),
    #[error("Unknown species: {0}")]
    UnknownSpecies(String),
    #[error("Failed to parse composition: {0}")]
    CompositionParse(String),
}

/// Local thermodynamic state of one grid point
#[derive(Debug, Clone, Copy)]
#[allow(non_snake_case)]
pub struct GasState<'a> {
    /// temperature (K)
    pub T: f64,
    /// pressure (Pa)
    pub P: f64,
    /// mass fractions in species index order
    pub Y: &'a [f64],
}

impl<'a> GasState<'a> {
    #[allow(non_snake_case)]
    pub fn new(T: f64, P: f64, Y: &'a [f64]) -> Self {
        Self { T, P, Y }
    }

    pub fn validate(&self, n_species: usize) -> Result<(), ProviderError> {
        if !self.T.is_finite() || self.T <= 0.0 {
            return Err(ProviderError::UnphysicalState(format!(
                "temperature {} K",
                self.T
            )));
        }
        if !self.P.is_finite() || self.P <= 0.0 {
            return Err(ProviderError::UnphysicalState(format!(
                "pressure {} Pa",
                self.P
            )));
        }
        if self.Y.len() != n_species {
            return Err(ProviderError::UnphysicalState(format!(
                "{} mass fractions given for {} species",
                self.Y.len(),
                n_species
            )));
        }
        if let Some(k) = self.Y.iter().position(|y| !y.is_finite()) {
            return Err(ProviderError::UnphysicalState(format!(
                "mass fraction of species {} is not finite",
                k
            )));
        }
        Ok(())
    }
}

/// Which pair of state variables is held constant during an equilibrium calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquilibriumConstraint {
    /// enthalpy and pressure
    HP,
    /// temperature and pressure
    TP,
}

#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct EquilibriumState {
    pub T: f64,
    pub Y: Vec<f64>,
    pub density: f64,
}

pub trait ThermoProvider {
    fn n_species(&self) -> usize;
    fn species_names(&self) -> &[String];
    /// molar masses (kg/kmol)
    fn molecular_weights(&self) -> &[f64];
    /// charge numbers (multiples of the elementary charge)
    fn charges(&self) -> &[f64];
    /// element composition of every species, e.g. {"C": 1, "H": 4}
    fn species_elements(&self) -> &[HashMap<String, f64>];
    fn density(&self, state: &GasState) -> Result<f64, ProviderError>;
    /// mass-specific heat capacity (J/kg/K)
    fn cp_mass(&self, state: &GasState) -> Result<f64, ProviderError>;
    /// molar enthalpies of all species at temperature T (J/kmol)
    fn enthalpies_molar(&self, t: f64) -> Result<Vec<f64>, ProviderError>;
    fn equilibrate(
        &self,
        state: &GasState,
        constraint: EquilibriumConstraint,
    ) -> Result<EquilibriumState, ProviderError>;

    fn species_index(&self, name: &str) -> Option<usize> {
        self.species_names().iter().position(|s| s == name)
    }

    fn mean_molecular_weight(&self, y: &[f64]) -> f64 {
        let inv: f64 = y
            .iter()
            .zip(self.molecular_weights())
            .map(|(yk, wk)| yk / wk)
            .sum();
        1.0 / inv
    }

    /// mixture enthalpy (J/kg)
    fn enthalpy_mass(&self, state: &GasState) -> Result<f64, ProviderError> {
        let h = self.enthalpies_molar(state.T)?;
        Ok(state
            .Y
            .iter()
            .zip(h.iter().zip(self.molecular_weights()))
            .map(|(yk, (hk, wk))| yk * hk / wk)
            .sum())
    }

    fn mole_to_mass(&self, x: &[f64]) -> Vec<f64> {
        let w = self.molecular_weights();
        let mean: f64 = x.iter().zip(w).map(|(xk, wk)| xk * wk).sum();
        x.iter().zip(w).map(|(xk, wk)| xk * wk / mean).collect()
    }

    fn mass_to_mole(&self, y: &[f64]) -> Vec<f64> {
        let mean = self.mean_molecular_weight(y);
        y.iter()
            .zip(self.molecular_weights())
            .map(|(yk, wk)| yk * mean / wk)
            .collect()
    }

    /// Mole fractions of a fuel/oxidizer mixture with equivalence ratio `phi`.
    ///
    /// `fuel` and `oxidizer` are compositions like "CH4" or "O2:0.21,N2:0.79". Carbon burns to CO2 and
    /// hydrogen to H2O, so the stoichiometric oxygen demand follows from the element counts.
    fn equivalence_ratio_mole_fractions(
        &self,
        phi: f64,
        fuel: &str,
        oxidizer: &str,
    ) -> Result<Vec<f64>, ProviderError> {
        if !phi.is_finite() || phi <= 0.0 {
            return Err(ProviderError::UnphysicalState(format!(
                "equivalence ratio {}",
                phi
            )));
        }
        let x_fuel = composition_vector(self, &parse_composition(fuel)?)?;
        let x_ox = composition_vector(self, &parse_composition(oxidizer)?)?;
        let o_demand = |x: &[f64]| -> f64 {
            x.iter()
                .zip(self.species_elements())
                .map(|(xk, el)| {
                    let c = el.get("C").copied().unwrap_or(0.0);
                    let h = el.get("H").copied().unwrap_or(0.0);
                    let o = el.get("O").copied().unwrap_or(0.0);
                    xk * (2.0 * c + 0.5 * h - o)
                })
                .sum()
        };
        let fuel_demand = o_demand(&x_fuel);
        let ox_supply = -o_demand(&x_ox);
        if fuel_demand <= 0.0 || ox_supply <= 0.0 {
            return Err(ProviderError::CompositionParse(format!(
                "fuel '{}' / oxidizer '{}' pair has no stoichiometric point",
                fuel, oxidizer
            )));
        }
        // moles of fuel per mole of oxidizer at the requested equivalence ratio
        let fuel_per_ox = phi * ox_supply / fuel_demand;
        let mut x: Vec<f64> = x_fuel
            .iter()
            .zip(x_ox.iter())
            .map(|(f, o)| fuel_per_ox * f + o)
            .collect();
        let total: f64 = x.iter().sum();
        x.iter_mut().for_each(|xk| *xk /= total);
        Ok(x)
    }
}

pub trait KineticsProvider {
    /// net molar production rates of all species (kmol/m³/s)
    fn net_production_rates(&self, state: &GasState) -> Result<Vec<f64>, ProviderError>;
}

pub trait TransportProvider {
    /// mixture thermal conductivity (W/m/K)
    fn thermal_conductivity(&self, state: &GasState) -> Result<f64, ProviderError>;
    /// mixture-averaged diffusion coefficients (m²/s)
    fn mix_diffusion_coeffs(&self, state: &GasState) -> Result<Vec<f64>, ProviderError>;
    /// electrical mobilities (m²/V/s), zero for neutral species
    fn mobilities(&self, state: &GasState) -> Result<Vec<f64>, ProviderError>;
}

/// References to the three property providers, injected into every residual evaluation
#[derive(Clone, Copy)]
pub struct Providers<'a> {
    pub thermo: &'a dyn ThermoProvider,
    pub kinetics: &'a dyn KineticsProvider,
    pub transport: &'a dyn TransportProvider,
}

impl<'a> Providers<'a> {
    pub fn new(
        thermo: &'a dyn ThermoProvider,
        kinetics: &'a dyn KineticsProvider,
        transport: &'a dyn TransportProvider,
    ) -> Self {
        Self {
            thermo,
            kinetics,
            transport,
        }
    }

    /// bundle a single object implementing all three interfaces
    pub fn from_mechanism<M>(mechanism: &'a M) -> Self
    where
        M: ThermoProvider + KineticsProvider + TransportProvider,
    {
        Self {
            thermo: mechanism,
            kinetics: mechanism,
            transport: mechanism,
        }
    }
}

/// Parses compositions like "O2:0.21, N2:0.79" or a bare species name "CH4" (amount 1).
pub fn parse_composition(input: &str) -> Result<HashMap<String, f64>, ProviderError> {
    let pair = regex::Regex::new(r"^\s*([A-Za-z][A-Za-z0-9+\-]*)\s*(?::\s*(\S+))?\s*$")
        .map_err(|e| ProviderError::CompositionParse(e.to_string()))?;
    let mut composition = HashMap::new();
    for item in input.split(',').filter(|s| !s.trim().is_empty()) {
        let caps = pair
            .captures(item)
            .ok_or_else(|| ProviderError::CompositionParse(item.to_string()))?;
        let name = caps[1].to_string();
        let amount = match caps.get(2) {
            Some(m) => m
                .as_str()
                .parse::<f64>()
                .map_err(|_| ProviderError::CompositionParse(item.to_string()))?,
            None => 1.0,
        };
        if !amount.is_finite() || amount < 0.0 {
            return Err(ProviderError::CompositionParse(item.to_string()));
        }
        *composition.entry(name).or_insert(0.0) += amount;
    }
    if composition.is_empty() {
        return Err(ProviderError::CompositionParse(input.to_string()));
    }
    Ok(composition)
}

/// normalized mole fraction vector in species index order
pub fn composition_vector<T: ThermoProvider + ?Sized>(
    thermo: &T,
    composition: &HashMap<String, f64>,
) -> Result<Vec<f64>, ProviderError> {
    let mut x = vec![0.0; thermo.n_species()];
    for (name, amount) in composition {
        let k = thermo
            .species_index(name)
            .ok_or_else(|| ProviderError::UnknownSpecies(name.clone()))?;
        x[k] += amount;
    }
    let total: f64 = x.iter().sum();
    if total <= 0.0 {
        return Err(ProviderError::CompositionParse(
            "composition sums to zero".to_string(),
        ));
    }
    x.iter_mut().for_each(|xk| *xk /= total);
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_composition() {
        let comp = parse_composition("O2:0.21,N2:0.79").unwrap();
        assert_eq!(comp.len(), 2);
        assert_eq!(comp["O2"], 0.21);
        assert_eq!(comp["N2"], 0.79);
        let fuel = parse_composition("CH4").unwrap();
        assert_eq!(fuel["CH4"], 1.0);
        let ion = parse_composition(" HCO+ : 2.0 ").unwrap();
        assert_eq!(ion["HCO+"], 2.0);
    }

    #[test]
    fn test_parse_composition_rejects_garbage() {
        assert!(parse_composition("").is_err());
        assert!(parse_composition("O2:abc").is_err());
        assert!(parse_composition("O2:-1.0").is_err());
    }

    #[test]
    fn test_gas_state_validation() {
        let y = [0.5, 0.5];
        assert!(GasState::new(300.0, ONE_ATM, &y).validate(2).is_ok());
        assert!(GasState::new(-1.0, ONE_ATM, &y).validate(2).is_err());
        assert!(GasState::new(300.0, 0.0, &y).validate(2).is_err());
        assert!(GasState::new(300.0, ONE_ATM, &y).validate(3).is_err());
        let bad = [f64::NAN, 1.0];
        assert!(GasState::new(300.0, ONE_ATM, &bad).validate(2).is_err());
    }
}
