//! # Adapters
//!
//! Implementations of the message router's outbound ports.
//!
//! | Port | Adapter |
//! |------|---------|
//! | `DatagramSender` | [`UdpOutbox`] |
//! | `HostCatcher` | [`LruHostCatcher`] |
//! | `QueryKeyValidator` | [`HashedQueryKeys`] |
//! | `ConnectBackDialer` | [`TcpConnectBackDialer`] |
//! | `LocalSearchSink` | [`TallyingSearchSink`] |
//! | `LocalResponder` | [`SharedContentResponder`] |

pub mod dialer;
pub mod host_catcher;
pub mod query_keys;
pub mod responder;
pub mod search_sink;
pub mod udp;

pub use dialer::TcpConnectBackDialer;
pub use host_catcher::{HostInfo, LruHostCatcher};
pub use query_keys::HashedQueryKeys;
pub use responder::{SharedContentResponder, SharedFile};
pub use search_sink::TallyingSearchSink;
pub use udp::{run_receive_loop, run_send_loop, Datagram, UdpOutbox};
