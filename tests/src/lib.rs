//! # Croupier Test Suite
//!
//! Cross-crate scenarios and benchmarks. Unit tests live next to the code
//! in each crate; this crate exercises the crates together.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── benchmarks/       # Criterion routines, driven from benches/
//! │   ├── bus.rs
//! │   └── registry.rs
//! │
//! └── integration/      # Flows spanning several crates
//!     ├── flows.rs          # discovery, addressing, ack failure
//!     ├── federation.rs     # registries sharing one broker
//!     ├── shutdown_flow.rs  # tiered teardown of real components
//!     └── supervision.rs    # process groups under the coordinator
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p croupier-tests
//! cargo test -p croupier-tests integration::flows
//! cargo bench -p croupier-tests
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod benchmarks;
pub mod integration;
