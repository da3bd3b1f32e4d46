//! Ports for the message router.

pub mod inbound;
pub mod outbound;

pub use inbound::MessageRouterApi;
pub use outbound::{
    ConnectBackDialer, DatagramSender, HostCatcher, LocalResponder, LocalSearchSink,
    QueryKeyValidator,
};
