//! Service discovery seam

use async_trait::async_trait;
use portway_core::Context;
use serde::{Deserialize, Serialize};

use crate::Result;

/// What a bridge announces about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeAnnouncement {
    pub bridge_id: String,
    pub name: String,
    pub adapters: Vec<String>,
    pub protocols: Vec<String>,
}

/// Registry client the bridge announces itself to
///
/// Failures are logged by the bridge and never abort its lifecycle.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    async fn announce(&self, ctx: &Context, announcement: &BridgeAnnouncement) -> Result<()>;

    async fn withdraw(&self, ctx: &Context, bridge_id: &str) -> Result<()>;
}
