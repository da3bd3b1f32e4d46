//! # Routing Core Benchmarks
//!
//! Hot paths of an ultrapeer under load:
//!
//! | Crate | Path | Why it matters |
//! |-------|------|----------------|
//! | gn-01 Route Table | route insert, reply lookup | once per query and per reply |
//! | gn-02 Query Routing | keyword lookup, table diff | once per query per connection |
//! | shared-types | wire encode/decode | every message in and out |

// Allow excessive nesting in benchmark code
#![allow(clippy::excessive_nesting)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gn_01_route_table::{RouteTable, RouteTableConfig};
use gn_02_query_routing::QueryRouteTable;
use rand::Rng;
use shared_types::{
    decode, encode, Guid, HandlerId, HandlerKind, ManualTimeSource, Message, Payload,
    QueryReply, QueryRequest, ReplyHandler,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// A reply handler that drops everything.
#[derive(Debug)]
struct NullHandler(HandlerId);

impl ReplyHandler for NullHandler {
    fn id(&self) -> HandlerId {
        self.0
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Connection
    }

    fn is_open(&self) -> bool {
        true
    }

    fn address(&self) -> Option<SocketAddr> {
        None
    }

    fn handle_ping_reply(&self, _pong: &Message, _source: Option<&dyn ReplyHandler>) {}

    fn handle_query_reply(&self, _reply: &Message, _source: Option<&dyn ReplyHandler>) {}

    fn handle_push_request(&self, _push: &Message, _source: Option<&dyn ReplyHandler>) {}

    fn count_dropped_message(&self) {}
}

fn handlers(n: usize) -> Vec<Arc<dyn ReplyHandler>> {
    (0..n)
        .map(|_| Arc::new(NullHandler(HandlerId::next())) as Arc<dyn ReplyHandler>)
        .collect()
}

fn file_names(n: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|i| format!("artist{} - track{} live {}.mp3", rng.gen_range(0..500), i, i % 7))
        .collect()
}

// ============================================================================
// GN-01: Route Table
// ============================================================================

fn bench_route_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("gn-01-route-table");
    group.measurement_time(Duration::from_secs(5));
    let peers = handlers(32);

    for size in [1_000usize, 10_000, 50_000] {
        let guids: Vec<Guid> = (0..size).map(|_| Guid::new_random()).collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("route_reply", size), &guids, |b, guids| {
            b.iter(|| {
                let clock = Arc::new(ManualTimeSource::new(0));
                let table = RouteTable::new("bench", RouteTableConfig::new(60_000, size), clock);
                for (i, guid) in guids.iter().enumerate() {
                    black_box(table.route_reply(*guid, peers[i % peers.len()].clone()));
                }
            })
        });

        let clock = Arc::new(ManualTimeSource::new(0));
        let table = RouteTable::new("bench", RouteTableConfig::new(60_000, size), clock);
        for (i, guid) in guids.iter().enumerate() {
            table.route_reply(*guid, peers[i % peers.len()].clone());
        }
        group.bench_with_input(
            BenchmarkId::new("get_reply_handler", size),
            &guids,
            |b, guids| {
                b.iter(|| {
                    for guid in guids {
                        black_box(table.get_reply_handler(guid));
                    }
                })
            },
        );
    }

    // A full table evicts on every insert.
    let clock = Arc::new(ManualTimeSource::new(0));
    let table = RouteTable::new("bench", RouteTableConfig::new(60_000, 1_000), clock);
    group.throughput(Throughput::Elements(1));
    group.bench_function("route_reply_at_capacity", |b| {
        b.iter(|| black_box(table.route_reply(Guid::new_random(), peers[0].clone())))
    });

    group.finish();
}

// ============================================================================
// GN-02: Query Routing
// ============================================================================

fn bench_query_route_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("gn-02-query-routing");
    group.measurement_time(Duration::from_secs(5));

    for files in [100usize, 1_000, 10_000] {
        let names = file_names(files);
        group.throughput(Throughput::Elements(files as u64));
        group.bench_with_input(BenchmarkId::new("add", files), &names, |b, names| {
            b.iter(|| {
                let mut table = QueryRouteTable::new();
                for name in names {
                    table.add(name);
                }
                black_box(table.bits_set())
            })
        });
    }

    let mut table = QueryRouteTable::new();
    for name in file_names(5_000) {
        table.add(&name);
    }
    let hit = QueryRequest::new("artist42 track17");
    let miss = QueryRequest::new("zzyzx qwerty");
    group.throughput(Throughput::Elements(1));
    group.bench_function("contains_hit", |b| b.iter(|| black_box(table.contains(&hit))));
    group.bench_function("contains_miss", |b| b.iter(|| black_box(table.contains(&miss))));

    group.bench_function("encode_full", |b| {
        b.iter(|| black_box(table.encode(None).map(|m| m.len())))
    });

    let mut grown = table.clone();
    for name in file_names(100) {
        grown.add(&format!("new {name}"));
    }
    group.bench_function("encode_patch", |b| {
        b.iter(|| black_box(grown.encode(Some(&table)).map(|m| m.len())))
    });

    let updates = table.encode(None).unwrap_or_default();
    group.bench_function("apply_full", |b| {
        b.iter(|| {
            let mut received = QueryRouteTable::new();
            for update in &updates {
                black_box(received.apply(update).is_ok());
            }
        })
    });

    group.finish();
}

// ============================================================================
// SHARED-TYPES: Wire Codec
// ============================================================================

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared-types-codec");

    let query = Message::new(
        Guid::new_random(),
        3,
        0,
        Payload::Query(QueryRequest::new("mozart requiem").with_query_key(vec![7; 8])),
    );
    let mut results = Vec::new();
    for i in 0..50u32 {
        results.extend_from_slice(&i.to_le_bytes());
        results.extend_from_slice(&4_096u32.to_le_bytes());
        results.extend_from_slice(format!("track {i}.mp3").as_bytes());
        results.extend_from_slice(&[0, 0]);
    }
    let reply = Message::new(
        Guid::new_random(),
        3,
        0,
        Payload::QueryReply(
            QueryReply::new(Guid::new_random(), Ipv4Addr::new(64, 61, 25, 171), 6346, 50)
                .with_results(results),
        ),
    );

    for (name, message) in [("query", &query), ("reply_50_hits", &reply)] {
        let Ok(bytes) = encode(message) else {
            continue;
        };
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("encode", name), message, |b, m| {
            b.iter(|| black_box(encode(m).is_ok()))
        });
        group.bench_with_input(BenchmarkId::new("decode", name), &bytes, |b, bytes| {
            b.iter(|| black_box(decode(bytes).is_ok()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_route_table, bench_query_route_table, bench_codec);
criterion_main!(benches);
