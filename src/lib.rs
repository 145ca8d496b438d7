//! Iamsim library crate.
//!
//! Simulates an identity and access management event chain over an
//! append-only, topic-partitioned event store.

pub mod choreography;
pub mod core;
pub mod sources;
pub mod store;

pub use core::config;
pub use core::event;
pub use core::traits;
