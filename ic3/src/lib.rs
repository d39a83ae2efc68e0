//! An incremental inductive checker (IC3 / PDR) for AIG transition systems.
//!
//! [`Driver`] orchestrates the rest of this crate's modules into the main proof-obligation loop
//! (§4.10): [`Cnf`] stores frame clauses, [`Obligations`] is the proof-obligation forest,
//! [`Primer`] and [`Justifier`] turn a SAT model into a predecessor cube, [`Generalizer`] shrinks
//! a blocked cube into a clause, [`Pusher`] propagates clauses forward and re-shrinks saturated
//! frames, [`Preprocessor`] eliminates variables from the circuit's own Tseitin CNF before the
//! main loop starts, and [`TraceBuilder`] replays a counterexample's obligation chain into a
//! concrete, checkable [`ic3_formula::Trace`].
pub mod arena;
pub mod cnf;
pub mod config;
pub mod driver;
pub mod error;
pub mod generalizer;
pub mod justifier;
pub mod obligations;
pub mod preprocessor;
pub mod primer;
pub mod pusher;
pub mod resolver;
pub mod trace_builder;

pub use config::{Config, RequeuePolicy};
pub use driver::{Driver, Status};
pub use error::{IcError, Outcome, Result};
