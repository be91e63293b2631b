// src/config/mod.rs
pub mod harvest;

pub use harvest::HarvestConfig;
