//! # Skiff Platform
//!
//! Core platform types and utilities for the Skiff SSH stack.
//!
//! This crate provides:
//! - Unified error types (`SkiffError`, `SkiffResult`)
//! - The diagnostic log sink contract (`LogSink`) with in-memory and
//!   discarding implementations
//!
//! # Examples
//!
//! ```
//! use skiff_platform::{SkiffError, SkiffResult};
//!
//! fn example_function() -> SkiffResult<String> {
//!     Ok("Hello, Skiff!".to_string())
//! }
//!
//! # fn main() -> SkiffResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, Skiff!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;
pub mod log;

pub use error::{SkiffError, SkiffResult};
pub use log::{LogSink, MemoryLog, NullLog};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
