use mimalloc::MiMalloc;

/// Global allocator.
/// Requires the `mimalloc` feature to be enabled in the `Cargo.toml` file.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod core;

pub use crate::core::prelude;
