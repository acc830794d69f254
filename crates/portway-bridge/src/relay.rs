//! Point-to-point relay between two adapters of one bridge
//!
//! Unlike [`Bridge::call`] there is no codec and no response: every payload
//! arriving on the source adapter is sent as-is through the target adapter.

use bytes::Bytes;
use portway_core::Context;
use std::sync::Arc;
use tracing::{debug, info};

use crate::adapter::inbound_handler;
use crate::bridge::{guarded, Bridge};
use crate::{BridgeError, Result};

impl Bridge {
    /// Forward everything `source` receives to `target`.
    ///
    /// Forwarding stops when `ctx` is cancelled, when the bridge shuts down,
    /// or when [`unlink`](Self::unlink) is called. Linking a source again
    /// replaces its previous link.
    pub fn link(&self, ctx: &Context, source: &str, target: &str) -> Result<()> {
        if source == target {
            return Err(BridgeError::InvalidTarget(format!(
                "cannot relay adapter {} to itself",
                source
            )));
        }
        let source_adapter = self
            .get_adapter(source)
            .ok_or_else(|| BridgeError::AdapterNotFound(source.to_string()))?;
        let target_adapter = self
            .get_adapter(target)
            .ok_or_else(|| BridgeError::AdapterNotFound(target.to_string()))?;

        // Weak so that two adapters linked both ways do not keep each other alive
        let target_adapter = Arc::downgrade(&target_adapter);
        let target_name = target.to_string();
        let link_token = ctx.token().clone();
        let root = self.root.clone();
        let timeout = self.options.default_timeout;

        source_adapter.set_message_handler(inbound_handler(move |inbound: Context, payload: Bytes| {
            let target_adapter = target_adapter.clone();
            let target_name = target_name.clone();
            let stopped = link_token.is_cancelled() || root.is_cancelled();
            async move {
                if stopped {
                    debug!(target = %target_name, "Relay stopped, dropping payload");
                    return Ok(());
                }
                let adapter = target_adapter
                    .upgrade()
                    .ok_or_else(|| BridgeError::AdapterNotFound(target_name.clone()))?;
                let ctx = if inbound.has_deadline() {
                    inbound
                } else {
                    inbound.with_timeout(timeout)
                };
                guarded(&ctx, adapter.send(&ctx, payload))
                    .await
                    .map(|_| ())
                    .map_err(|e| BridgeError::Send(Box::new(e)))
            }
        }));

        info!(parent: &self.span, source = %source, target = %target, "Linked adapters");
        Ok(())
    }

    /// Stop relaying payloads received on `source`
    pub fn unlink(&self, source: &str) -> Result<()> {
        let adapter = self
            .get_adapter(source)
            .ok_or_else(|| BridgeError::AdapterNotFound(source.to_string()))?;
        adapter.set_message_handler(inbound_handler(|_ctx, _payload| async { Ok(()) }));
        info!(parent: &self.span, source = %source, "Unlinked adapter");
        Ok(())
    }
}
