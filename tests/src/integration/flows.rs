//! # Integration Test Flows
//!
//! End-to-end message flows between complete nodes.
//!
//! ## Flows Tested:
//!
//! 1. **Probe search**: leaf → ultrapeer → QRP-guided TTL-1 probe → hit routed back
//! 2. **Push routing**: the reply teaches push routes back to the responder
//! 3. **Leaf QRP**: a leaf's table reaches its ultrapeer, steers last-hop queries
//!    and is folded into the table the ultrapeer advertises
//! 4. **UDP query keys**: key request, keyed query, forged key

#[cfg(test)]
mod tests {
    use crate::overlay::{NodeId, Overlay};
    use gn_02_query_routing::QueryRouteTable;
    use gn_05_message_router::{LocalSearchSink, MessageRouterApi};
    use shared_types::{
        encode, Guid, Message, Payload, PingRequest, PushRequest, QueryRequest, TimeSource,
    };
    use std::net::{Ipv4Addr, SocketAddr};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn query(guid: Guid, ttl: u8, text: &str) -> Message {
        Message::new(guid, ttl, 0, Payload::Query(QueryRequest::new(text)))
    }

    fn now(net: &Overlay) -> u64 {
        net.clock().now_ms()
    }

    /// Leaf `leaf` under `hub`, which peers with `sharer`. Only `sharer` has
    /// content, and `hub` already holds its route table.
    fn search_overlay() -> (Overlay, NodeId, NodeId, NodeId) {
        let mut net = Overlay::new();
        let leaf = net.add_node("leaf", false, &[]);
        let hub = net.add_node("hub", true, &[]);
        let sharer = net.add_node("sharer", true, &["Mozart - Requiem.mp3"]);
        net.connect(leaf, hub);
        net.connect(hub, sharer);

        let t = now(&net);
        assert!(net.router(sharer).forward_query_route_tables(t) > 0);
        net.pump();
        (net, leaf, hub, sharer)
    }

    // =============================================================================
    // SEARCH
    // =============================================================================

    #[tokio::test]
    async fn test_route_table_reaches_peer_ultrapeer() {
        let (net, leaf, hub, sharer) = search_overlay();

        let conn = net.connection(hub, sharer).unwrap();
        assert!(conn.has_received_table());
        assert!(conn.hits_route_table(&query(Guid::new_random(), 1, "requiem")));
        assert!(!conn.hits_route_table(&query(Guid::new_random(), 1, "beethoven")));
        assert!(net.failures().is_empty());
    }

    #[tokio::test]
    async fn test_leaf_search_answered_through_probe() {
        let (mut net, leaf, hub, sharer) = search_overlay();
        net.clear_log();

        let guid = Guid::new_random();
        net.node(leaf).container.search_sink.track(guid);
        net.router(leaf)
            .send_dynamic_query(&query(guid, 3, "mozart"))
            .unwrap();
        net.pump();

        // The probe went out at TTL 1 because sharer's table matched.
        let probes = net.received(sharer, guid);
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].message.ttl(), 1);
        assert_eq!(net.router(hub).dispatcher().active_queries(), 1);

        assert_eq!(net.node(leaf).container.search_sink.result_count(&guid), Some(1));
        let replies = net.received(leaf, guid);
        assert_eq!(replies.len(), 1);
        let hit = replies[0].message.as_query_reply().unwrap();
        assert_eq!(hit.ip, net.node(sharer).ip);
        assert_eq!(net.router(hub).metrics().snapshot().replies_routed, 1);
    }

    #[tokio::test]
    async fn test_unmatched_search_not_probed_at_ttl_one() {
        let (mut net, leaf, hub, sharer) = search_overlay();

        let guid = Guid::new_random();
        net.router(leaf)
            .send_dynamic_query(&query(guid, 3, "beethoven"))
            .unwrap();
        net.pump();

        // sharer's table blocks the query; it only sees a TTL-2 probe.
        let probes = net.received(sharer, guid);
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].message.ttl(), 2);
        assert!(net.received(leaf, guid).is_empty());
        assert_eq!(net.node(leaf).container.search_sink.result_count(&guid), None);
    }

    #[tokio::test]
    async fn test_push_follows_reply_back_to_responder() {
        let (mut net, leaf, hub, sharer) = search_overlay();

        let guid = Guid::new_random();
        net.router(leaf)
            .send_dynamic_query(&query(guid, 3, "requiem"))
            .unwrap();
        net.pump();
        assert_eq!(net.received(leaf, guid).len(), 1);

        let responder = net.node(sharer).container.config.network.client_guid.unwrap();
        let body = PushRequest::new(responder, 0, net.node(leaf).ip, 6346);
        let push = Message::originate(Guid::new_random(), 3, Payload::Push(body));
        net.router(leaf).send_push_request(&push).unwrap();
        net.pump();

        assert_eq!(net.received(sharer, push.guid()).len(), 1);
        assert_eq!(net.node(sharer).container.search_sink.pushes(), 1);
        assert_eq!(net.router(hub).metrics().snapshot().pushes_routed, 1);
    }

    #[tokio::test]
    async fn test_push_without_route_fails() {
        let (net, leaf, _hub, _sharer) = search_overlay();
        let body = PushRequest::new(Guid::new_random(), 0, net.node(leaf).ip, 6346);
        let push = Message::originate(Guid::new_random(), 3, Payload::Push(body));
        assert!(net.router(leaf).send_push_request(&push).is_err());
    }

    // =============================================================================
    // LEAF QRP
    // =============================================================================

    #[tokio::test]
    async fn test_leaf_table_steers_last_hop_queries() {
        let mut net = Overlay::new();
        let hub = net.add_node("hub", true, &[]);
        let leaf = net.add_node("leaf", false, &["bach cantata.mp3"]);
        let quiet = net.add_node("quiet", false, &["satie.mp3"]);
        let peer = net.add_node("peer", true, &[]);
        net.connect(leaf, hub);
        net.connect(quiet, hub);
        net.connect(hub, peer);

        let t = now(&net);
        assert!(net.router(leaf).forward_query_route_tables(t) > 0);
        assert!(net.router(quiet).forward_query_route_tables(t) > 0);
        net.pump();
        assert!(net.connection(hub, leaf).unwrap().has_received_table());

        let guid = Guid::new_random();
        net.inject(peer, hub, query(guid, 2, "cantata"));
        net.pump();

        assert_eq!(net.received(leaf, guid).len(), 1);
        assert!(net.received(quiet, guid).is_empty());
        let back: Vec<_> = net
            .received(peer, guid)
            .into_iter()
            .filter(|d| d.message.as_query_reply().is_some())
            .collect();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].message.as_query_reply().unwrap().ip, net.node(leaf).ip);
    }

    #[tokio::test]
    async fn test_ultrapeer_advertises_leaf_content() {
        let mut net = Overlay::new();
        let hub = net.add_node("hub", true, &["haydn.mp3"]);
        let leaf = net.add_node("leaf", false, &["bach cantata.mp3"]);
        let peer = net.add_node("peer", true, &[]);
        net.connect(leaf, hub);
        net.connect(hub, peer);

        let t = now(&net);
        net.router(leaf).forward_query_route_tables(t);
        net.pump();
        assert!(net.router(hub).forward_query_route_tables(t) > 0);
        net.pump();

        let advertised = net.connection(peer, hub).unwrap().received_table().unwrap();
        assert!(advertised.contains(&QueryRequest::new("cantata")));
        assert!(advertised.contains(&QueryRequest::new("haydn")));
        assert!(!advertised.contains(&QueryRequest::new("vivaldi")));

        // Nothing changed, nothing to send.
        assert_eq!(net.router(hub).forward_query_route_tables(t), 0);
    }

    // =============================================================================
    // UDP QUERY KEYS
    // =============================================================================

    #[tokio::test]
    async fn test_udp_search_with_issued_query_key() {
        let mut net = Overlay::new();
        let hub = net.add_node("hub", true, &["mozart requiem.mp3"]);
        let searcher = SocketAddr::from(([70, 7, 7, 7], 6346));

        let ask = Message::new(
            Guid::new_random(),
            1,
            0,
            Payload::Ping(PingRequest::query_key_request()),
        );
        net.router(hub)
            .handle_udp_packet(&encode(&ask).unwrap(), searcher)
            .unwrap();
        let sent = net.take_datagrams(hub);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, searcher);
        let key = sent[0].0.as_pong().unwrap().query_key().unwrap().to_vec();
        assert!(!key.is_empty());

        let guid = Guid::new_random();
        let keyed = QueryRequest::new("mozart").with_query_key(key.clone());
        let search = Message::new(guid, 1, 0, Payload::Query(keyed));
        net.router(hub)
            .handle_udp_packet(&encode(&search).unwrap(), searcher)
            .unwrap();
        let sent = net.take_datagrams(hub);
        assert!(sent.iter().all(|(m, to)| *to == searcher && m.guid() == guid));
        assert!(sent.iter().any(|(m, _)| m.as_query_reply().is_some()));
        assert!(sent.iter().any(|(m, _)| m.as_pong().is_some()));

        // The same key from another host is worthless.
        let thief = SocketAddr::from((Ipv4Addr::new(70, 8, 8, 8), 6346));
        let stolen = QueryRequest::new("mozart").with_query_key(key);
        let search = Message::new(Guid::new_random(), 1, 0, Payload::Query(stolen));
        net.router(hub)
            .handle_udp_packet(&encode(&search).unwrap(), thief)
            .unwrap();
        assert!(net.take_datagrams(hub).is_empty());
        assert_eq!(net.router(hub).metrics().snapshot().udp_queries_rejected, 1);
    }
}
