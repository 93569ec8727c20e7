//! User-space IA-32 subset emulator.
//!
//! The machine couples the [`intel_386`] CPU core to a byte-addressable
//! DRAM model behind a two-level cache, loads ELF32 images, and drives
//! everything from an interactive monitor with expression evaluation and
//! watchpoints.

pub mod cache;
pub mod dram;
pub mod expr;
pub mod loader;
pub mod machine;
pub mod memory;
pub mod monitor;
pub mod watchpoint;

pub use machine::Machine;
