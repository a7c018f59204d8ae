// ABOUTME: Configuration constants shared across csbx packages
// ABOUTME: Re-exports environment variable names so callers never hardcode them

pub mod constants;

pub use constants::*;
