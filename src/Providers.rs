//! # Property Providers Module
//!
//! Thermodynamic, kinetic and transport property evaluation consumed by the one-dimensional flame
//! solver. The solver never owns a provider: it receives a [`provider_api::Providers`] bundle of
//! references and queries it with the current local state of every grid point.
//!
//! ## Main Structures
//!
//! - **`ThermoProvider`**, **`KineticsProvider`**, **`TransportProvider`**: the interfaces the
//!   solver needs. Every query takes a [`provider_api::GasState`] (temperature, pressure, mass
//!   fractions) and is a pure function of it.
//! - **`MethaneAirIons`**: the built-in reduced methane/air mechanism with a chemi-ionization
//!   sub-mechanism (HCO+ and free electrons).
//!
//! ## Reduced mechanism
//!
//! | Reaction | Rate |
//! |----------|------|
//! | CH4 + 2 O2 => CO2 + 2 H2O | `A exp(-Ta/T) [CH4][O2]` |
//! | CH4 + 1.25 O2 => HCO+ + E + 1.5 H2O | `β·r1` |
//! | HCO+ + E + 0.75 O2 => CO2 + 0.5 H2O | `k_r (300/T)^0.7 [HCO+][E]` |
//!
//! Molar masses are computed from element composition, so every reaction conserves mass exactly.

pub mod methane_air_ions;
pub mod provider_api;
mod providers_tests;
