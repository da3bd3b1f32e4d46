//! # Routing Scenarios
//!
//! Edge cases of the routing core observed across real node boundaries:
//!
//! 1. **Route expiry**: a reply route outlives one window and dies with the second
//! 2. **Route capacity**: a full query table evicts its oldest route first
//! 3. **Leaf guidance**: a satisfied leaf stops its ultrapeer's query for good
//! 4. **Pong cache**: pongs from the mesh are cached per hop, served, then expire,
//!    within the hop and lifetime limits the node is configured with
//! 5. **Listeners**: registered listeners take matching pongs exclusively

#[cfg(test)]
mod tests {
    use crate::overlay::{NodeId, Overlay};
    use gn_01_route_table::RouteTableConfig;
    use gn_03_pong_cache::PongCacheConfig;
    use gn_04_dynamic_query::{DynamicQueryApi, QueryState};
    use gn_05_message_router::{MessageListener, MessageRouterApi};
    use parking_lot::Mutex;
    use shared_types::{
        encode, Guid, Message, Payload, PingReply, PingRequest, QueryReply, QueryRequest,
        ReplyHandler, VendorMessage,
    };
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
    use std::sync::Arc;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn query(guid: Guid, ttl: u8, text: &str) -> Message {
        Message::new(guid, ttl, 0, Payload::Query(QueryRequest::new(text)))
    }

    fn reply(guid: Guid) -> Message {
        let body = QueryReply::new(Guid::new_random(), Ipv4Addr::new(70, 1, 2, 3), 6346, 1);
        Message::new(guid, 3, 0, Payload::QueryReply(body))
    }

    fn replies_to(net: &Overlay, to: NodeId, guid: Guid) -> usize {
        net.received(to, guid)
            .iter()
            .filter(|d| d.message.as_query_reply().is_some())
            .count()
    }

    fn pong_ips(messages: &[Message]) -> Vec<Ipv4Addr> {
        messages
            .iter()
            .filter_map(|m| m.as_pong().map(|p| p.ip))
            .collect()
    }

    /// Keeps every message it is handed.
    #[derive(Default)]
    struct RecordingListener {
        seen: Mutex<Vec<Message>>,
    }

    impl MessageListener for RecordingListener {
        fn process_message(&self, message: &Message, _handler: &dyn ReplyHandler) {
            self.seen.lock().push(message.clone());
        }
    }

    impl RecordingListener {
        fn count(&self) -> usize {
            self.seen.lock().len()
        }
    }

    // =============================================================================
    // ROUTE TABLE SCENARIOS
    // =============================================================================

    #[tokio::test]
    async fn test_reply_route_expires_after_two_windows() {
        let mut net = Overlay::new();
        let hub = net.add_configured("hub", true, &[], |c| {
            c.routes.query = RouteTableConfig::new(1_000, 100);
        });
        let searcher = net.add_node("searcher", true, &[]);
        let responder = net.add_node("responder", true, &[]);
        net.connect(hub, searcher);
        net.connect(hub, responder);

        let guid = Guid::new_random();
        net.inject(searcher, hub, query(guid, 1, "beatles"));
        net.pump();
        assert!(net.router(hub).query_routes().has_route(&guid));

        // One window later the route sits in the old generation.
        net.clock().advance(1_001);
        net.router(hub).purge_routes();
        assert!(net.router(hub).query_routes().has_route(&guid));

        // The second swap drops it.
        net.clock().advance(1_001);
        net.router(hub).purge_routes();
        assert!(!net.router(hub).query_routes().has_route(&guid));

        let misses = net.router(hub).metrics().snapshot().route_misses;
        net.inject(responder, hub, reply(guid));
        net.pump();
        assert_eq!(replies_to(&net, searcher, guid), 0);
        assert_eq!(net.router(hub).metrics().snapshot().route_misses, misses + 1);
    }

    #[tokio::test]
    async fn test_reply_within_window_reaches_searcher() {
        let mut net = Overlay::new();
        let hub = net.add_configured("hub", true, &[], |c| {
            c.routes.query = RouteTableConfig::new(1_000, 100);
        });
        let searcher = net.add_node("searcher", true, &[]);
        let responder = net.add_node("responder", true, &[]);
        net.connect(hub, searcher);
        net.connect(hub, responder);

        let guid = Guid::new_random();
        net.inject(searcher, hub, query(guid, 1, "beatles"));
        net.pump();
        net.clock().advance(1_001);
        net.router(hub).purge_routes();

        net.inject(responder, hub, reply(guid));
        net.pump();
        assert_eq!(replies_to(&net, searcher, guid), 1);
    }

    #[tokio::test]
    async fn test_full_route_table_evicts_oldest_route() {
        let mut net = Overlay::new();
        let hub = net.add_configured("hub", true, &[], |c| {
            c.routes.query = RouteTableConfig::new(60_000, 1);
        });
        let a = net.add_node("a", true, &[]);
        let b = net.add_node("b", true, &[]);
        net.connect(hub, a);
        net.connect(hub, b);

        let first = Guid::new_random();
        let second = Guid::new_random();
        net.inject(a, hub, query(first, 1, "beatles"));
        net.pump();
        net.inject(b, hub, query(second, 1, "stones"));
        net.pump();

        let routes = net.router(hub).query_routes();
        assert_eq!(routes.len(), 1);
        assert!(!routes.has_route(&first));
        assert!(routes.has_route(&second));

        net.inject(b, hub, reply(first));
        net.inject(a, hub, reply(second));
        net.pump();
        assert_eq!(replies_to(&net, a, first), 0);
        assert_eq!(replies_to(&net, b, second), 1);
    }

    // =============================================================================
    // LEAF GUIDANCE
    // =============================================================================

    #[tokio::test]
    async fn test_satisfied_leaf_query_never_forwarded_again() {
        let mut net = Overlay::new();
        let leaf = net.add_node("leaf", false, &[]);
        let hub = net.add_node("hub", true, &[]);
        let east = net.add_node("east", true, &[]);
        let west = net.add_node("west", true, &[]);
        net.connect(leaf, hub);
        net.connect(hub, east);
        net.connect(hub, west);
        net.settle();

        let guid = Guid::new_random();
        net.node(leaf).container.search_sink.track(guid);
        net.router(leaf)
            .send_dynamic_query(&query(guid, 3, "beatles"))
            .unwrap();
        net.pump();
        assert_eq!(net.router(hub).dispatcher().active_queries(), 1);
        assert_eq!(net.router(hub).query_status(&guid), Some(QueryState::Probe));

        // The leaf reports it has every result it wants.
        let status = VendorMessage::QueryStatusResponse { results: u16::MAX };
        net.inject(leaf, hub, Message::new(guid, 1, 0, Payload::Vendor(status)));
        net.pump();
        assert_eq!(net.router(hub).query_status(&guid), Some(QueryState::Satisfied));
        assert_eq!(net.router(hub).dispatcher().active_queries(), 0);

        // A late copy from the mesh and further dispatcher ticks go nowhere.
        net.clear_log();
        let duplicates = net.router(hub).metrics().snapshot().duplicates_dropped;
        net.inject(east, hub, query(guid, 3, "beatles"));
        net.pump();
        for _ in 0..5 {
            net.clock().advance(10_000);
            net.router(hub).dispatcher().process_queries();
            net.pump();
        }

        assert!(net.received(west, guid).is_empty());
        assert!(net.received(leaf, guid).is_empty());
        assert_eq!(
            net.router(hub).metrics().snapshot().duplicates_dropped,
            duplicates + 1
        );
        assert!(net.failures().is_empty());
    }

    // =============================================================================
    // PONG CACHE
    // =============================================================================

    #[tokio::test]
    async fn test_mesh_pongs_cached_served_and_expired() {
        let mut net = Overlay::new();
        let hub = net.add_node("hub", true, &[]);
        let pinger = net.add_node("pinger", true, &[]);
        let near = net.add_node("near", true, &["bach.mp3"]);
        let far = net.add_node("far", true, &[]);
        net.connect(hub, pinger);
        net.connect(hub, near);
        net.connect(near, far);
        net.settle();

        let ping = Message::originate(Guid::new_random(), 3, Payload::Ping(PingRequest::new()));
        let conn = net.connection(pinger, hub).unwrap();
        assert!(net.router(pinger).send_ping_request(&ping, &conn));
        net.pump();

        // near answered from one hop away, far from two.
        let near_ip = net.node(near).ip;
        let far_ip = net.node(far).ip;
        let best = net.router(hub).pong_cacher().get_best_pongs("en");
        assert_eq!(pong_ips(&best), vec![far_ip, near_ip]);
        assert_eq!(best[0].hops(), 2);
        assert_eq!(best[1].hops(), 1);

        let to_pinger: Vec<Message> = net
            .received(pinger, ping.guid())
            .iter()
            .map(|d| d.message.clone())
            .collect();
        let ips = pong_ips(&to_pinger);
        assert!(ips.contains(&near_ip));
        assert!(ips.contains(&far_ip));

        // A newcomer's first ping is answered from the cache.
        let newcomer = net.add_node("newcomer", true, &[]);
        net.connect(hub, newcomer);
        net.clear_log();
        let ping = Message::originate(Guid::new_random(), 3, Payload::Ping(PingRequest::new()));
        let conn = net.connection(newcomer, hub).unwrap();
        assert!(net.router(newcomer).send_ping_request(&ping, &conn));
        net.pump();
        let from_hub: Vec<Message> = net
            .received(newcomer, ping.guid())
            .iter()
            .filter(|d| d.from == hub)
            .map(|d| d.message.clone())
            .collect();
        let ips = pong_ips(&from_hub);
        assert!(ips.contains(&near_ip));
        assert!(ips.contains(&far_ip));
        assert!(ips.contains(&net.node(hub).ip));

        // The default locale keeps pongs for six seconds.
        net.clock().advance(6_001);
        assert!(net.router(hub).pong_cacher().get_best_pongs("en").is_empty());
        assert_eq!(net.router(hub).pong_cacher().len(), 0);
    }

    #[tokio::test]
    async fn test_pong_cache_follows_node_config() {
        let mut net = Overlay::new();
        let hub = net.add_configured("hub", true, &[], |c| {
            c.pong_cache = PongCacheConfig {
                hop_buckets: 2,
                expiry_ms: 30_000,
                ..PongCacheConfig::for_testing()
            };
        });
        let pinger = net.add_node("pinger", true, &[]);
        let near = net.add_node("near", true, &[]);
        let far = net.add_node("far", true, &[]);
        net.connect(hub, pinger);
        net.connect(hub, near);
        net.connect(near, far);
        net.settle();

        let ping = Message::originate(Guid::new_random(), 3, Payload::Ping(PingRequest::new()));
        let conn = net.connection(pinger, hub).unwrap();
        assert!(net.router(pinger).send_ping_request(&ping, &conn));
        net.pump();

        // far's pong is two hops out, past the last bucket, but still routed.
        let near_ip = net.node(near).ip;
        let far_ip = net.node(far).ip;
        let cacher = net.router(hub).pong_cacher();
        assert_eq!(pong_ips(&cacher.get_best_pongs("en")), vec![near_ip]);
        let to_pinger: Vec<Message> = net
            .received(pinger, ping.guid())
            .iter()
            .map(|d| d.message.clone())
            .collect();
        assert!(pong_ips(&to_pinger).contains(&far_ip));

        // Past the default lifetime, within the configured one.
        net.clock().advance(6_001);
        assert_eq!(pong_ips(&cacher.get_best_pongs("en")), vec![near_ip]);
        net.clock().advance(24_000);
        assert!(cacher.get_best_pongs("en").is_empty());
    }

    // =============================================================================
    // LISTENERS
    // =============================================================================

    #[tokio::test]
    async fn test_listeners_claim_udp_pongs_until_unregistered() {
        let mut net = Overlay::new();
        let hub = net.add_node("hub", true, &[]);
        let router = net.router(hub).clone();

        let host = SocketAddrV4::new(Ipv4Addr::new(70, 1, 2, 3), 6346);
        let guid = Guid::new_random();
        let body = PingReply::new(*host.ip(), host.port(), 3, 300).with_ultrapeer(4, 4);
        let bytes = encode(&Message::new(guid, 1, 0, Payload::Pong(body))).unwrap();

        let first = Arc::new(RecordingListener::default());
        let second = Arc::new(RecordingListener::default());
        let first_dyn: Arc<dyn MessageListener> = first.clone();
        let second_dyn: Arc<dyn MessageListener> = second.clone();
        router.register_listener(guid, first_dyn.clone());
        router.register_listener(guid, second_dyn.clone());

        router.handle_udp_packet(&bytes, SocketAddr::V4(host)).unwrap();
        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 1);
        assert!(net.node(hub).container.host_catcher.get(&host).is_none());

        assert!(router.unregister_listener(&guid, &second_dyn));
        assert!(!router.unregister_listener(&guid, &second_dyn));
        router.handle_udp_packet(&bytes, SocketAddr::V4(host)).unwrap();
        assert_eq!(first.count(), 2);
        assert_eq!(second.count(), 1);

        // Unclaimed, the pong reaches the host cache.
        assert!(router.unregister_listener(&guid, &first_dyn));
        router.handle_udp_packet(&bytes, SocketAddr::V4(host)).unwrap();
        assert_eq!(first.count(), 2);
        assert!(net.node(hub).container.host_catcher.get(&host).is_some());
    }
}
