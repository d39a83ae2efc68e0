//! The SAT solver contract consumed by the ic3 reachability engine.
//!
//! This crate defines the contract ([`SatSolver`]) and the scoped-assumption-frame guard
//! ([`scoped`]) the engine is built against, a call-accounting wrapper ([`SatMonitor`]), and a
//! minimal in-tree reference implementation ([`RefSolver`]) used by the engine's own test suite.
//! No production CDCL solver lives here; the engine is meant to be paired with a real one through
//! the same trait.
pub mod contract;
pub mod monitor;
pub mod refsolver;

pub use contract::{scoped, Deadline, SatSolver, SolveResult, TestScope};
pub use monitor::{SatMonitor, Stats as SatMonitorStats};
pub use refsolver::RefSolver;
