//! # Broker Benchmarks
//!
//! - Directed publish: id admission, routing, enqueue
//! - Broadcast fan-out to a growing subscriber set
//! - Publish with ack tracking armed

use std::time::Duration;

use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use croupier_bus::{AckPolicy, Broker};
use croupier_types::{Message, MessageType};

fn silent(broker: &Broker, id: &str) {
    let _ = broker.subscribe_fn(id, None, |_| async { Ok(()) });
}

/// Publish addressed messages to one subscriber.
pub fn bench_directed_publish(c: &mut Criterion) {
    let rt = super::runtime();
    let _guard = rt.enter();
    let broker = Broker::builder().without_tracing().build();
    silent(&broker, "svcA");

    let mut group = c.benchmark_group("bus-publish");
    group.throughput(Throughput::Elements(1));
    group.bench_function("directed", |b| {
        b.iter(|| {
            let msg = Message::builder(MessageType::custom("Ping"), "table-1")
                .to("svcA")
                .payload("ante")
                .build();
            black_box(broker.publish(msg).is_ok())
        })
    });
    group.finish();
    broker.close();
}

/// Broadcast to 1..64 subscribers.
pub fn bench_broadcast_fanout(c: &mut Criterion) {
    let rt = super::runtime();
    let _guard = rt.enter();

    let mut group = c.benchmark_group("bus-fanout");
    for subscribers in [1usize, 8, 64] {
        let broker = Broker::builder().without_tracing().build();
        for n in 0..subscribers {
            silent(&broker, &format!("table-{n}"));
        }

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("broadcast", subscribers),
            &broker,
            |b, broker| {
                b.iter(|| {
                    let msg = Message::builder(MessageType::Heartbeat, "svcA").build();
                    black_box(broker.publish(msg).map(|r| r.delivered_to))
                })
            },
        );
        broker.close();
    }
    group.finish();
}

/// Publish `requires_ack` messages that are acked by the receiver.
pub fn bench_acked_publish(c: &mut Criterion) {
    let rt = super::runtime();
    let _guard = rt.enter();
    let broker = Broker::builder()
        .without_tracing()
        .ack_policy(AckPolicy::fixed(Duration::from_secs(5), 0))
        .build();
    let acker = broker.clone();
    let _ = broker.subscribe_fn("svcA", None, move |delivery| {
        let acker = acker.clone();
        async move {
            if delivery.message.requires_ack() {
                let _ = acker.ack(&delivery);
            }
            Ok(())
        }
    });
    silent(&broker, "table-1");

    let mut group = c.benchmark_group("bus-ack");
    group.bench_function("publish_and_settle", |b| {
        b.iter(|| {
            let msg = Message::builder(MessageType::custom("Ping"), "table-1")
                .to("svcA")
                .requires_ack(true)
                .build();
            let receipt = broker.publish(msg).expect("publish");
            black_box(rt.block_on(receipt.ack.outcome()))
        })
    });
    group.finish();
    broker.close();
}
