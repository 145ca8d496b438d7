//! The event chain: codec, handlers, the routing graph and the loops that
//! drive it.

pub mod codec;
pub mod cursor;
pub mod graph;
pub mod handlers;
pub mod publisher;
pub mod runtime;
pub mod stats;

pub use graph::ChoreographyGraph;
pub use publisher::Publisher;
pub use runtime::{Choreography, RuntimeError};
