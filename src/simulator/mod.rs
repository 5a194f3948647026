//! Deterministic simulation support
//!
//! - [`DeterministicRng`] / [`buggify`]: seeded randomness for workloads and
//!   fault injection
//! - [`dst`]: the autosave DST harness

mod rng;
pub mod dst;

pub use dst::{
    run_dst_batch, summarize_batch, AutosaveDSTConfig, AutosaveDSTHarness, AutosaveDSTResult,
    AutosaveOperation, AutosaveWorkload,
};
pub use rng::{buggify, DeterministicRng};
