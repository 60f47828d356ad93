//! Concrete profilers shipped with the crate.

pub mod memory;

pub use memory::{MemoryProfiler, ProcessMemorySample};
