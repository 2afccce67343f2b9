//! `simdock-agent` library crate.
//!
//! The worker daemon that runs on each compute host: books simulations
//! from the dispatcher, supervises detached simulator processes, ships
//! result archives back, and reconciles on-disk state with the
//! dispatcher's view after a crash. Re-exports internal modules for
//! integration testing; the binary entrypoint lives in `main.rs`.

pub mod archive;
pub mod client;
pub mod config;
pub mod control;
pub mod error;
pub mod machine;
pub mod monitor;
pub mod probe;
pub mod recovery;
pub mod supervisor;
