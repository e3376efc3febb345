//! CLI library components for the Bazaar Buddy update executor.

#![allow(missing_docs)]

pub mod cli;
pub mod logging;
