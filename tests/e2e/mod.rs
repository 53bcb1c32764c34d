//! End-to-end tests for snapshot-relay.
//!
//! Each test builds a relay node from a real configuration in a temporary
//! directory: key file, durable log, pin directory and cache.
//!
//! ```bash
//! cargo test --test e2e
//! ```

mod harness;
mod relay_flow;

pub use harness::{TestClient, TestHarness};
