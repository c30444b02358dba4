#[allow(non_snake_case)]
pub mod Flame1D;
#[allow(non_snake_case)]
pub mod Providers;
#[allow(non_snake_case)]
pub mod Utils;
pub mod cli;
