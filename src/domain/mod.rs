//! Domain layer: models, ports, and errors.
//!
//! Everything in this module is free of I/O. Adapters that talk to git,
//! docker, the model backend, or the code host implement the traits in
//! [`ports`] and live under `infrastructure`.

pub mod errors;
pub mod models;
pub mod ports;
