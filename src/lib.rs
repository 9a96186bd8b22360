//! Per-domain routing of outbound HTTP requests through an SSH SOCKS5 tunnel.
//!
//! Each outbound request is checked by [`route::should_route`] against a
//! fresh [`config::ProxyConfig`] snapshot. Requests that must use the tunnel
//! are given socks5h proxy settings by [`augment::RequestAugmenter`], and
//! [`client::RoutingClient`] dispatches them. The tunnel itself is
//! externally managed. [`status::StatusService`] probes it through
//! [`health::TunnelHealthChecker`] and lists local sockets on its port
//! through [`inspect::ActiveTunnelInspector`].

pub mod augment;
pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod inspect;
pub mod logging;
pub mod request;
pub mod route;
pub mod status;

#[cfg(test)]
mod test_support;

pub use augment::RequestAugmenter;
pub use client::RoutingClient;
pub use config::{ConfigStore, JsonFileStore, MemoryConfigStore, ProxyConfig};
pub use error::{ConfigError, DispatchError, StatusError};
pub use health::{Outcome, TunnelHealthChecker, TunnelStatus};
pub use inspect::{platform_inspector, ActiveTunnelInspector, CommandInspector};
pub use request::{ProxyProtocol, ProxySettings, RequestDescriptor, TransportHints, TransportMode};
pub use route::should_route;
pub use status::{Authorizer, LocalOperator, StatusReport, StatusService};
