//! Host collaborators used by the executor.
//!
//! Each module exposes a trait for the executor to call through and a
//! concrete implementation backed by the real system.

pub mod extract;
pub mod fetch;
pub mod process;
