//! Error types for taskledger.
//!
//! Every crate in the workspace shares one error enum, defined in
//! `taskledger-core`. Chain-integrity findings are not errors; they are
//! reported as data in [`ChainVerification`](crate::ChainVerification).

pub use taskledger_core::error::{Error, Result};
