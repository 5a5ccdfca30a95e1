//! Utility functions shared by the build and query sides.
//!
//! ## Modules
//!
//! - [`encoding`] - Variable-length integers, gap coding and little-endian helpers
//! - [`tokenizer`] - The `Tokenizer` collaborator and its default implementation
//! - [`progress`] - Progress bars that compile to no-ops without the `progress` feature

pub mod encoding;
pub mod progress;
pub mod tokenizer;

pub use encoding::*;
pub use tokenizer::*;
