//! Individual steps of the executor state machine.
//!
//! Each step is a separate module with functions (and, where tests or
//! platforms need to swap behaviour, a trait) called by [`crate::executor`].

pub mod cleanup;
pub mod download;
pub mod extract;
pub mod launch;
pub mod probe;
pub mod replace;
pub mod verify;
