// src/simulation/mod.rs
//! Synthetic value generation
//!
//! - **Value Engine**: computes a provider's current value on demand
//! - **Precision**: decimal precision derived from textual bounds

pub mod precision;
pub mod value_engine;

pub use value_engine::{compute_value, ProviderValue, Refresh, Sample};
