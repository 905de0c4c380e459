//! # Registry Benchmarks

use criterion::{black_box, Criterion};
use croupier_bus::Broker;
use croupier_registry::{RegistryConfig, ServiceRegistry};

/// Register then deregister one service, announcements included.
pub fn bench_register_cycle(c: &mut Criterion) {
    let rt = super::runtime();
    let _guard = rt.enter();
    let broker = Broker::builder().without_tracing().build();
    let registry =
        ServiceRegistry::new(broker.clone(), RegistryConfig::default()).expect("registry");

    let mut group = c.benchmark_group("registry");
    group.bench_function("register_deregister", |b| {
        b.iter(|| {
            registry
                .register_service("svcA", "Lobby", "lobby")
                .expect("register");
            black_box(registry.deregister_service("svcA").is_ok())
        })
    });
    group.bench_function("heartbeat", |b| {
        let _ = registry.register_service("svcB", "Cashier", "cashier");
        b.iter(|| black_box(registry.heartbeat("svcB").is_ok()))
    });
    group.finish();
    registry.stop();
    broker.close();
}
