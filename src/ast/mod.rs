//! Abstract Syntax Tree for mlld documents.

pub mod types;

pub use types::*;
