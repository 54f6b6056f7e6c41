//! civic-core library.
//!
//! Client-side state for the civic issue reporter: a keyed snapshot cache
//! of issues and users, speculative mutations reconciled against the
//! backend's response, and role-gated route evaluation.
//!
//! # Conventions
//!
//! - **Errors**: module error enums derive `thiserror::Error`; config and
//!   binaries use `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod error;
pub mod model;
pub mod mutation;
pub mod session;
pub mod store;
pub mod transport;

pub use mutation::{Mutator, MutationIntent, MutationKind};
pub use store::{FingerprintStore, QueryKey};
