//! # Croupier Benchmarks
//!
//! | Group | Measures |
//! |-------|----------|
//! | bus-publish | directed publish to one subscriber |
//! | bus-fanout | broadcast to 1, 8, 64 subscribers |
//! | bus-ack | publish, ack and settle one message |
//! | registry | register/deregister cycle, heartbeat |

use criterion::{criterion_group, criterion_main};
use croupier_tests::benchmarks::{bus, registry};

criterion_group!(
    broker_benches,
    bus::bench_directed_publish,
    bus::bench_broadcast_fanout,
    bus::bench_acked_publish
);
criterion_group!(registry_benches, registry::bench_register_cycle);
criterion_main!(broker_benches, registry_benches);
