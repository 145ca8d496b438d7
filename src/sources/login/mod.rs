//! Synthetic login traffic, plus optional subject access attempts.

pub mod generator;
pub mod templates;

pub use generator::LoginAttemptGenerator;
