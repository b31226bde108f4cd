//! Lifecycle trait shared by the vision nodes.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::NodeError;

/// Static information about a node, logged at startup.
///
/// Use the `node_metadata!` macro to fill name, version and description
/// from the node's Cargo.toml:
/// ```rust,ignore
/// fn metadata() -> NodeMetadata {
///     node_metadata!(
///         publishes: &["vision.evt.detected-movement"],
///         consumes: &[],
///     )
/// }
/// ```
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    /// Short name identifier from CARGO_PKG_NAME
    pub name: &'static str,
    /// SemVer version string from CARGO_PKG_VERSION
    pub version: &'static str,
    /// Human-readable description from CARGO_PKG_DESCRIPTION
    pub description: &'static str,
    /// Routing keys this node publishes under
    pub publishes: &'static [&'static str],
    /// Routing keys this node consumes
    pub consumes: &'static [&'static str],
}

/// Build a [`NodeMetadata`] from the calling package's manifest.
#[macro_export]
macro_rules! node_metadata {
    (
        publishes: $pub:expr,
        consumes: $sub:expr $(,)?
    ) => {
        $crate::NodeMetadata {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            description: env!("CARGO_PKG_DESCRIPTION"),
            publishes: $pub,
            consumes: $sub,
        }
    };
}

/// The lifecycle every vision node implements.
///
/// 1. `metadata()` - static information about the node
/// 2. `init()` - connect collaborators; failure here aborts the process
/// 3. `run()` - the node loop, until the shutdown signal fires
#[async_trait]
pub trait VisionNode: Send + Sized {
    /// Fully merged configuration (file + CLI overrides).
    type Config: Send;

    fn metadata() -> NodeMetadata;

    /// Connect to the broker, build HTTP clients, load classifiers.
    ///
    /// Anything that cannot be set up here is unrecoverable: nodes never
    /// run in a degraded mode.
    async fn init(config: Self::Config) -> Result<Self, NodeError>;

    /// Run the node loop.
    ///
    /// The current unit of work (a frame or a message) is always finished
    /// before the shutdown signal is honoured.
    async fn run(self, shutdown: watch::Receiver<()>) -> Result<(), NodeError>;
}
