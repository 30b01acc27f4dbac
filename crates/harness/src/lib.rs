//! Test support: store fixtures, a small multi-store network with a
//! force-insert based replicator, and fault-injecting blob stores.

mod failing;
mod network;
mod store;

pub use failing::FailingBlobStore;
pub use network::{replicate, ReplicationStats, TestNetwork};
pub use store::TestStore;

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber for test output. Honors `RUST_LOG`, defaults to
/// `warn`, and is safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
