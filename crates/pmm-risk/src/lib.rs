//! Risk gate.
//!
//! Screens every decision before it reaches the execution engine, tracks
//! position and realized PnL from fills, and escalates sustained breaches
//! into an emergency teardown.

pub mod config;
pub mod gate;
pub mod inventory;
pub mod service;

pub use config::RiskConfig;
pub use gate::{GateVerdict, RiskGate, RiskOutcome};
pub use inventory::Inventory;
pub use service::run_risk_gate;
