//! Ports for the dynamic query controller.

pub mod inbound;
pub mod outbound;

pub use inbound::DynamicQueryApi;
pub use outbound::{QueryNetwork, UltrapeerLink};
