//! # Croupier Benchmarks
//!
//! Criterion routines per component. `benches/bus_benchmarks.rs` groups
//! and runs them.

pub mod bus;
pub mod registry;

/// Multi-threaded runtime the routines publish from.
#[must_use]
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("benchmark runtime")
}
