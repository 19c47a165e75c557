//! Tracing subscriber setup.

use std::sync::Once;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_tree::HierarchicalLayer;

static TRACING_INIT: Once = Once::new();

/// Install the global tracing subscriber.
///
/// Does nothing unless `RUST_LOG` is set, and only the first call has an
/// effect. Pass spans nest, so the output is an indented tree:
/// `RUST_LOG=kiln_passes=debug` shows per-pass statistics,
/// `RUST_LOG=kiln_passes=trace` adds the IR after every pass.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            // A subscriber installed by the embedder wins.
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    HierarchicalLayer::new(2)
                        .with_targets(true)
                        .with_bracketed_fields(true),
                )
                .try_init();
        }
    });
}
