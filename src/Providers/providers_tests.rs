#[cfg(test)]
mod tests {
    use super::super::methane_air_ions::{MechanismConfig, MethaneAirIons};
    use super::super::provider_api::{
        EquilibriumConstraint, GasState, KineticsProvider, ONE_ATM, ThermoProvider,
        TransportProvider,
    };
    use approx::assert_relative_eq;

    fn stoichiometric_air(gas: &MethaneAirIons, phi: f64) -> Vec<f64> {
        let x = gas
            .equivalence_ratio_mole_fractions(phi, "CH4", "O2:0.21,N2:0.79")
            .unwrap();
        gas.mole_to_mass(&x)
    }

    #[test]
    fn test_molar_masses() {
        let gas = MethaneAirIons::default();
        let w = gas.molecular_weights();
        assert_relative_eq!(w[0], 16.043, epsilon = 1e-3);
        assert_relative_eq!(w[1], 31.998, epsilon = 1e-3);
        assert_relative_eq!(w[4], 28.014, epsilon = 1e-3);
        // HCO+ is HCO minus one electron
        assert_relative_eq!(w[5] + w[6], 12.011 + 1.008 + 15.999, epsilon = 1e-9);
    }

    #[test]
    fn test_equivalence_ratio_stoichiometric() {
        let gas = MethaneAirIons::default();
        let x = gas
            .equivalence_ratio_mole_fractions(1.0, "CH4", "O2:0.21,N2:0.79")
            .unwrap();
        let ch4 = gas.species_index("CH4").unwrap();
        let o2 = gas.species_index("O2").unwrap();
        let n2 = gas.species_index("N2").unwrap();
        assert_relative_eq!(x[o2] / x[ch4], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[n2] / x[o2], 0.79 / 0.21, epsilon = 1e-12);
        assert_relative_eq!(x.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_equivalence_ratio_invalid() {
        let gas = MethaneAirIons::default();
        assert!(gas
            .equivalence_ratio_mole_fractions(0.0, "CH4", "O2:0.21,N2:0.79")
            .is_err());
        assert!(gas
            .equivalence_ratio_mole_fractions(1.0, "C8H18", "O2:0.21,N2:0.79")
            .is_err());
    }

    #[test]
    fn test_density_ideal_gas() {
        let gas = MethaneAirIons::default();
        let y = stoichiometric_air(&gas, 1.0);
        let rho = gas.density(&GasState::new(300.0, ONE_ATM, &y)).unwrap();
        // stoichiometric methane/air at ambient conditions
        assert!(rho > 1.08 && rho < 1.14, "rho = {}", rho);
        assert!(gas.density(&GasState::new(0.0, ONE_ATM, &y)).is_err());
    }

    #[test]
    fn test_adiabatic_flame_temperature_exceeds_inlet() {
        let gas = MethaneAirIons::default();
        for phi in [0.5, 0.7, 0.9, 1.0, 1.2, 1.5, 2.0] {
            let y = stoichiometric_air(&gas, phi);
            let eq = gas
                .equilibrate(&GasState::new(300.0, ONE_ATM, &y), EquilibriumConstraint::HP)
                .unwrap();
            assert!(eq.T > 300.0, "phi = {}, Tad = {}", phi, eq.T);
            assert_relative_eq!(eq.Y.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
        let y = stoichiometric_air(&gas, 1.0);
        let eq = gas
            .equilibrate(&GasState::new(300.0, ONE_ATM, &y), EquilibriumConstraint::HP)
            .unwrap();
        assert!(eq.T > 2000.0 && eq.T < 2600.0, "Tad = {}", eq.T);
    }

    #[test]
    fn test_equilibrium_conserves_enthalpy() {
        let gas = MethaneAirIons::default();
        let y = stoichiometric_air(&gas, 0.8);
        let inlet = GasState::new(300.0, ONE_ATM, &y);
        let eq = gas.equilibrate(&inlet, EquilibriumConstraint::HP).unwrap();
        let h_in = gas.enthalpy_mass(&inlet).unwrap();
        let h_out = gas
            .enthalpy_mass(&GasState::new(eq.T, ONE_ATM, &eq.Y))
            .unwrap();
        assert_relative_eq!(h_in, h_out, epsilon = 1e-6 * h_in.abs().max(1.0));
        let tp = gas.equilibrate(&inlet, EquilibriumConstraint::TP).unwrap();
        assert_eq!(tp.T, 300.0);
    }

    #[test]
    fn test_production_rates_conserve_mass() {
        let gas = MethaneAirIons::default();
        let mut y = stoichiometric_air(&gas, 1.0);
        y[5] = 1e-8;
        y[6] = 1e-8 * gas.molecular_weights()[6] / gas.molecular_weights()[5];
        let total: f64 = y.iter().sum();
        y.iter_mut().for_each(|yk| *yk /= total);
        let wdot = gas
            .net_production_rates(&GasState::new(1800.0, ONE_ATM, &y))
            .unwrap();
        let mass: f64 = wdot
            .iter()
            .zip(gas.molecular_weights())
            .map(|(w, m)| w * m)
            .sum();
        let scale: f64 = wdot
            .iter()
            .zip(gas.molecular_weights())
            .map(|(w, m)| (w * m).abs())
            .sum();
        assert!(scale > 0.0);
        assert!(mass.abs() < 1e-10 * scale, "mass imbalance {}", mass);
        // fuel is consumed, ion pairs are produced and recombined in equal numbers
        assert!(wdot[0] < 0.0);
        assert_relative_eq!(wdot[5], wdot[6], epsilon = 1e-30);
    }

    #[test]
    fn test_no_ionization_without_fuel() {
        let gas = MethaneAirIons::new(MechanismConfig::default());
        let x = [0.0, 0.21, 0.0, 0.0, 0.79, 0.0, 0.0];
        let y = gas.mole_to_mass(&x);
        let wdot = gas
            .net_production_rates(&GasState::new(2000.0, ONE_ATM, &y))
            .unwrap();
        assert!(wdot.iter().all(|w| *w == 0.0));
    }

    #[test]
    fn test_transport_properties() {
        let gas = MethaneAirIons::default();
        let y = stoichiometric_air(&gas, 1.0);
        let cold = GasState::new(300.0, ONE_ATM, &y);
        let hot = GasState::new(2000.0, ONE_ATM, &y);
        assert_relative_eq!(gas.thermal_conductivity(&cold).unwrap(), 0.0262);
        assert!(gas.thermal_conductivity(&hot).unwrap() > 0.0262);
        let d_cold = gas.mix_diffusion_coeffs(&cold).unwrap();
        let d_hot = gas.mix_diffusion_coeffs(&hot).unwrap();
        for k in 0..gas.n_species() {
            assert!(d_cold[k] > 0.0);
            assert!(d_hot[k] > d_cold[k]);
        }
        let mu = gas.mobilities(&hot).unwrap();
        assert_eq!(mu[0], 0.0);
        assert!(mu[5] > 0.0);
        assert_eq!(mu[6], 0.4);
        // electrons diffuse much faster than the ions
        assert!(d_hot[6] > 100.0 * d_hot[5]);
    }
}
