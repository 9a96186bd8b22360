use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ConfigStore, ProxyConfig};
use crate::error::StatusError;
use crate::health::{TunnelHealthChecker, TunnelStatus};
use crate::inspect::{platform_inspector, ActiveTunnelInspector};

/// Decides whether the caller of the status surface is an operator.
///
/// Session and CSRF checks live in the host environment; this is only the seam.
pub trait Authorizer {
    fn is_operator(&self) -> bool;
}

/// Grants every caller. For local tooling where the OS user is the operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOperator;

impl Authorizer for LocalOperator {
    fn is_operator(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub tunnel_status: TunnelStatus,
    pub active_tunnels: Vec<String>,
}

/// "Test tunnel now" for operators
pub struct StatusService {
    store: Arc<dyn ConfigStore>,
    checker: TunnelHealthChecker,
    inspector: Box<dyn ActiveTunnelInspector>,
}

impl StatusService {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self::with_parts(store, TunnelHealthChecker::default(), platform_inspector())
    }

    pub fn with_parts(
        store: Arc<dyn ConfigStore>,
        checker: TunnelHealthChecker,
        inspector: Box<dyn ActiveTunnelInspector>,
    ) -> Self {
        Self {
            store,
            checker,
            inspector,
        }
    }

    /// Probe the tunnel and list local sockets on its port.
    ///
    /// Rejected before any probe runs if the caller is not an operator. Probe
    /// and inspection failures are part of the report, never an `Err`.
    pub async fn test_tunnel_now(
        &self,
        authorizer: &dyn Authorizer,
    ) -> Result<StatusReport, StatusError> {
        if !authorizer.is_operator() {
            warn!("tunnel status check refused: caller is not an operator");
            return Err(StatusError::Unauthorized);
        }

        let config = ProxyConfig::load(self.store.as_ref())?;
        let (tunnel_status, active_tunnels) = tokio::join!(
            self.checker.check_tunnel(&config),
            self.inspector.list_active_tunnels(config.tunnel_port),
        );
        info!(
            proxy = %config.proxy_url(),
            outcome = ?tunnel_status.outcome,
            active = active_tunnels.len(),
            "tunnel status checked"
        );

        Ok(StatusReport {
            tunnel_status,
            active_tunnels,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::config::{MemoryConfigStore, KEY_TUNNEL_HOST, KEY_TUNNEL_PORT};
    use crate::health::Outcome;
    use crate::test_support::{unused_port, FakeSocksProxy};

    struct Visitor;

    impl Authorizer for Visitor {
        fn is_operator(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct CannedInspector {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ActiveTunnelInspector for CannedInspector {
        async fn list_active_tunnels(&self, port: u16) -> Vec<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            vec![format!("ssh 4242 ops TCP 127.0.0.1:{port} (LISTEN)")]
        }
    }

    fn store_for(host: &str, port: u16) -> Arc<MemoryConfigStore> {
        let store = Arc::new(MemoryConfigStore::new());
        store.set(KEY_TUNNEL_HOST, json!(host)).unwrap();
        store.set(KEY_TUNNEL_PORT, json!(port)).unwrap();
        store
    }

    #[tokio::test]
    async fn non_operator_is_rejected_before_probing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = StatusService::with_parts(
            store_for("127.0.0.1", unused_port()),
            TunnelHealthChecker::new("http://ip.probe.test/"),
            Box::new(CannedInspector {
                calls: Arc::clone(&calls),
            }),
        );

        let result = service.test_tunnel_now(&Visitor).await;

        assert!(matches!(result, Err(StatusError::Unauthorized)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn report_combines_probe_and_inspection() {
        let proxy = FakeSocksProxy::serve(r#"{"ip":"203.0.113.7"}"#).await;
        let service = StatusService::with_parts(
            store_for(&proxy.host(), proxy.port()),
            TunnelHealthChecker::new("http://ip.probe.test/?format=json"),
            Box::new(CannedInspector::default()),
        );

        let report = service.test_tunnel_now(&LocalOperator).await.unwrap();

        assert_eq!(report.tunnel_status.outcome, Outcome::Success);
        assert_eq!(report.tunnel_status.external_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(
            report.active_tunnels,
            vec![format!("ssh 4242 ops TCP 127.0.0.1:{} (LISTEN)", proxy.port())]
        );

        let wire = serde_json::to_value(&report).unwrap();
        assert_eq!(wire["tunnel_status"]["status"], "success");
        assert_eq!(wire["tunnel_status"]["message"], "Tunnel is operational");
        assert_eq!(wire["tunnel_status"]["external_ip"], "203.0.113.7");
        assert!(wire["active_tunnels"].is_array());
    }

    #[tokio::test]
    async fn dead_tunnel_is_reported_not_raised() {
        let port = unused_port();
        let service = StatusService::with_parts(
            store_for("127.0.0.1", port),
            TunnelHealthChecker::new("http://ip.probe.test/"),
            Box::new(CannedInspector::default()),
        );

        let report = service.test_tunnel_now(&LocalOperator).await.unwrap();

        assert_eq!(report.tunnel_status.outcome, Outcome::Error);
        assert!(report.tunnel_status.message.starts_with("Tunnel connection failed: "));
        assert_eq!(report.active_tunnels.len(), 1);
    }
}
