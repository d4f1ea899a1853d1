use std::sync::Arc;
use tokio::time::{Instant, timeout_at};
use tracing::{info, warn};

use crate::{ChainConnection, ClientError, ClientResult, Connector, Endpoint, NodeCapabilities};

/// A connection that passed its readiness probe.
pub struct ResolvedConnection {
    pub connection: Box<dyn ChainConnection>,
    pub endpoint: Endpoint,
    pub capabilities: NodeCapabilities,
}

impl std::fmt::Debug for ResolvedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConnection")
            .field("endpoint", &self.endpoint)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Sequential fallback over an ordered endpoint list.
///
/// Candidates are tried one at a time in list order. Each attempt (connect
/// plus readiness) is bounded by the endpoint's own timeout; the first
/// candidate to become ready wins and later ones are never contacted.
#[derive(Clone)]
pub struct EndpointResolver {
    connector: Arc<dyn Connector>,
}

impl EndpointResolver {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    pub async fn resolve(&self, endpoints: &[Endpoint]) -> ClientResult<ResolvedConnection> {
        for endpoint in endpoints {
            match self.attempt(endpoint).await {
                Ok(resolved) => {
                    info!(
                        "connected to {} (contracts_enabled={})",
                        endpoint.url, resolved.capabilities.contracts_enabled
                    );
                    return Ok(resolved);
                }
                Err(reason) => {
                    warn!("failed to connect to {}: {}", endpoint.url, reason);
                }
            }
        }

        Err(ClientError::NoEndpointAvailable {
            attempted: endpoints.len(),
        })
    }

    async fn attempt(&self, endpoint: &Endpoint) -> Result<ResolvedConnection, String> {
        let deadline = Instant::now() + endpoint.timeout;

        // Dropping the pending connect future releases any half-open socket.
        let connection = match timeout_at(deadline, self.connector.connect(endpoint)).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(err)) => return Err(err.to_string()),
            Err(_) => return Err(format!("timed out after {}ms", endpoint.timeout.as_millis())),
        };

        let outcome = timeout_at(deadline, connection.ready()).await;
        match outcome {
            Ok(Ok(capabilities)) => Ok(ResolvedConnection {
                connection,
                endpoint: endpoint.clone(),
                capabilities,
            }),
            Ok(Err(err)) => {
                connection.close().await;
                Err(err.to_string())
            }
            Err(_) => {
                connection.close().await;
                Err(format!("not ready after {}ms", endpoint.timeout.as_millis()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionState;
    use crate::testing::{ScriptedConnector, ScriptedEndpoint};
    use std::time::Duration;

    const ATTEMPT: Duration = Duration::from_millis(3000);

    #[tokio::test(start_paused = true)]
    async fn skips_unreachable_candidates_in_order() {
        let connector = ScriptedConnector::new()
            .with("down-1", ScriptedEndpoint::Hang)
            .with("down-2", ScriptedEndpoint::Hang)
            .with("reachable", ScriptedEndpoint::Ready)
            .with("never", ScriptedEndpoint::Ready);
        let resolver = EndpointResolver::new(Arc::new(connector.clone()));

        let started = Instant::now();
        let resolved = resolver
            .resolve(&Endpoint::list(["down-1", "down-2", "reachable", "never"], ATTEMPT))
            .await
            .expect("reachable endpoint should win");

        assert_eq!(resolved.endpoint.url, "reachable");
        assert_eq!(resolved.connection.state(), ConnectionState::Live);
        assert_eq!(connector.attempts(), vec!["down-1", "down-2", "reachable"]);
        assert!(started.elapsed() >= ATTEMPT * 2);
        assert!(started.elapsed() < ATTEMPT * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_reachable_wins_without_further_attempts() {
        let connector = ScriptedConnector::new()
            .with("a", ScriptedEndpoint::Ready)
            .with("b", ScriptedEndpoint::Ready);
        let resolver = EndpointResolver::new(Arc::new(connector.clone()));

        let resolved = resolver.resolve(&Endpoint::list(["a", "b"], ATTEMPT)).await.unwrap();

        assert_eq!(resolved.endpoint.url, "a");
        assert_eq!(connector.attempts(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_list_reports_no_endpoint() {
        let connector = ScriptedConnector::new()
            .with("refused", ScriptedEndpoint::Refuse)
            .with("slow", ScriptedEndpoint::Hang);
        let resolver = EndpointResolver::new(Arc::new(connector.clone()));

        let err = resolver
            .resolve(&Endpoint::list(["refused", "slow", "unknown"], ATTEMPT))
            .await
            .unwrap_err();

        assert_eq!(err, ClientError::NoEndpointAvailable { attempted: 3 });
        assert_eq!(connector.attempts(), vec!["refused", "slow", "unknown"]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_list_reports_no_endpoint() {
        let resolver = EndpointResolver::new(Arc::new(ScriptedConnector::new()));
        let err = resolver.resolve(&[]).await.unwrap_err();
        assert_eq!(err, ClientError::NoEndpointAvailable { attempted: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_connections_are_closed_before_advancing() {
        let connector = ScriptedConnector::new()
            .with("stalls", ScriptedEndpoint::HangOnReady)
            .with("broken", ScriptedEndpoint::FailOnReady)
            .with("ok", ScriptedEndpoint::Ready);
        let resolver = EndpointResolver::new(Arc::new(connector.clone()));

        let resolved = resolver
            .resolve(&Endpoint::list(["stalls", "broken", "ok"], ATTEMPT))
            .await
            .unwrap();

        assert_eq!(resolved.endpoint.url, "ok");
        assert_eq!(connector.closed(), vec!["stalls", "broken"]);
    }

    #[tokio::test(start_paused = true)]
    async fn capabilities_come_from_the_ready_probe() {
        let connector = ScriptedConnector::new().with("plain", ScriptedEndpoint::ReadyWithoutContracts);
        let resolver = EndpointResolver::new(Arc::new(connector));

        let resolved = resolver.resolve(&Endpoint::list(["plain"], ATTEMPT)).await.unwrap();
        assert!(!resolved.capabilities.contracts_enabled);
    }
}
