//! Optional query of a running daemon for the nodes it already knows.

use async_trait::async_trait;

#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Names of every node the daemon knows about.
    ///
    /// An `Err` means the daemon could not be asked; callers carry on.
    async fn known_nodes(&self) -> Result<Vec<String>, String>;
}

/// Used when no daemon control channel is available
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDaemon;

#[async_trait]
impl NodeRegistry for NoDaemon {
    async fn known_nodes(&self) -> Result<Vec<String>, String> {
        Err("daemon is not running".to_string())
    }
}
