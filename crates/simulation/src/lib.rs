//! Deterministic simulation for the tallyscan engine.
//!
//! Provides an in-memory base chain with explicit reorgs, a reference
//! interpreter, seeded workload generation and a harness that ties them to
//! a real [`Engine`](tallyscan_engine::Engine).
//!
//! # Determinism
//!
//! Workloads are generated with `ChaCha8Rng` from a `u64` seed and block
//! hashes are derived from height, parent and branch tag. Running the same
//! seed twice yields byte-identical checkpoints and consensus hashes.

mod builder;
mod chain;
mod harness;
mod interpreter;
mod observer;
mod workload;

pub use builder::{
    funding, tagged, txid, Payload, FUNDING_VALUE, PAYLOAD_LEN, REFERENCE_VALUE, TAGGED_FEE,
};
pub use chain::SimulatedChain;
pub use harness::Harness;
pub use interpreter::{
    ReferenceInterpreter, ERR_BAD_AMOUNT, ERR_BAD_VERSION, ERR_FREEZING, ERR_INSUFFICIENT,
    ERR_NOT_ISSUER, ERR_NO_PROPERTY, ERR_NO_REFERENCE, ERR_STORAGE, ERR_UNKNOWN_TYPE,
};
pub use observer::{ObservedEvent, RecordingObserver};
pub use workload::{Workload, WorkloadConfig, MANAGED_PROPERTY};
