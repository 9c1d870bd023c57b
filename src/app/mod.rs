//! Binary-side wiring: configuration and the run sequence.

pub(crate) mod config;
pub(crate) mod runtime;
