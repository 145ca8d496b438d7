pub mod config;
pub mod event;
pub mod random;
pub mod traits;
