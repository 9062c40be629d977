//! Builder pattern for constructing a [`RouterLink`].

use std::time::Duration;

use i3g_domain::config::{MudConfig, RouterConfig};

use crate::connection::RouterLink;
use crate::error::LinkError;
use crate::reconnect::ReconnectBackoff;

/// Fluent builder for [`RouterLink`].
///
/// # Example
///
/// ```rust,no_run
/// # use i3g_router_link::RouterLinkBuilder;
/// # use i3g_domain::config::{RouterConfig, MudConfig};
/// let link = RouterLinkBuilder::new()
///     .router_config(RouterConfig::default())
///     .mud_config(MudConfig { name: "ExampleMUD".into(), ..Default::default() })
///     .outbound_queue_size(1024)
///     .build()
///     .unwrap();
/// ```
pub struct RouterLinkBuilder {
    pub(crate) router: RouterConfig,
    pub(crate) mud: MudConfig,
    pub(crate) reconnect_backoff: ReconnectBackoff,
    pub(crate) outbound_queue_size: usize,
}

impl RouterLinkBuilder {
    pub fn new() -> Self {
        Self {
            router: RouterConfig::default(),
            mud: MudConfig::default(),
            reconnect_backoff: ReconnectBackoff::default(),
            outbound_queue_size: 1024,
        }
    }

    /// Set the preferred router endpoint list and handshake/idle timeouts.
    pub fn router_config(mut self, cfg: RouterConfig) -> Self {
        self.router = cfg;
        self
    }

    /// Set the mud identity fields sent in `startup-req-3`.
    pub fn mud_config(mut self, cfg: MudConfig) -> Self {
        self.mud = cfg;
        self
    }

    /// Override the reconnect/failover backoff policy.
    pub fn reconnect_backoff(mut self, cfg: ReconnectBackoff) -> Self {
        self.reconnect_backoff = cfg;
        self
    }

    /// Override the handshake timeout (default from `RouterConfig`).
    pub fn handshake_timeout(mut self, d: Duration) -> Self {
        self.router.handshake_timeout_secs = d.as_secs();
        self
    }

    /// Override the idle timeout (default from `RouterConfig`).
    pub fn idle_timeout(mut self, d: Duration) -> Self {
        self.router.idle_timeout_secs = d.as_secs();
        self
    }

    /// Bound on buffered outbound packets before `send` backpressures.
    pub fn outbound_queue_size(mut self, n: usize) -> Self {
        self.outbound_queue_size = n;
        self
    }

    /// Build the [`RouterLink`].
    pub fn build(self) -> Result<RouterLink, LinkError> {
        if self.router.endpoints.is_empty() {
            return Err(LinkError::Config("router.endpoints is empty".into()));
        }
        if self.mud.name.is_empty() {
            return Err(LinkError::Config("mud.name is required".into()));
        }

        Ok(RouterLink {
            router: self.router,
            mud: self.mud,
            reconnect_backoff: self.reconnect_backoff,
            outbound_queue_size: self.outbound_queue_size,
        })
    }
}

impl Default for RouterLinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}
