//! Benchwarden - compiler benchmark orchestration with statistical
//! regression detection
//!
//! This library tracks a compiler's performance across its commit history:
//! it executes benchmark suites against build artifacts, reduces noisy
//! repeated measurements into robust estimates, compares them against
//! historical baselines, and emits deterministic pass/regression verdicts
//! usable by automation such as merge gates.

pub mod aggregate;
pub mod analysis;
pub mod case;
pub mod cli;
pub mod history;
pub mod orchestrator;
pub mod record;
pub mod report;
pub mod resolver;
pub mod runner;
