//! # Thistle Core
//!
//! Engine-wide utilities shared by the Thistle crates:
//!
//! - [`arena`] - generational storage used for stable resource identity
//! - [`profiling`] - Tracy instrumentation macros (feature `profiling`)

pub mod arena;
pub mod profiling;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the core crate.
pub fn init() {
    log::info!("Thistle Core v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
