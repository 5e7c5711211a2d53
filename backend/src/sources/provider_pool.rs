use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::transports::http::{Client, Http};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::SourceError;
use crate::types::Network;

pub type HttpProvider = RootProvider<Http<Client>>;

/// Per-network HTTP providers with health-ordered fallback
#[derive(Clone)]
pub struct ProviderPool {
    networks: HashMap<String, NetworkEndpoints>,
    health_tracker: Arc<RwLock<HashMap<String, EndpointHealth>>>,
}

#[derive(Clone)]
struct NetworkEndpoints {
    chain_id: u64,
    endpoints: Vec<Endpoint>,
}

#[derive(Clone)]
struct Endpoint {
    url: String,
    provider: HttpProvider,
}

#[derive(Clone, Debug)]
struct EndpointHealth {
    success_rate: f32,
    avg_response_time: Duration,
    last_failure: Option<Instant>,
    consecutive_failures: u32,
}

impl Default for EndpointHealth {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            avg_response_time: Duration::from_millis(500),
            last_failure: None,
            consecutive_failures: 0,
        }
    }
}

impl ProviderPool {
    pub fn new(networks: &[Network]) -> Result<Self, SourceError> {
        let mut pool = HashMap::new();

        for network in networks {
            let mut endpoints = Vec::with_capacity(network.rpc_urls.len());
            for rpc_url in &network.rpc_urls {
                let parsed_url = rpc_url
                    .parse()
                    .map_err(|e| SourceError::Network(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;
                endpoints.push(Endpoint {
                    url: rpc_url.clone(),
                    provider: ProviderBuilder::new().on_http(parsed_url),
                });
            }
            pool.insert(network.name.clone(), NetworkEndpoints {
                chain_id: network.chain_id,
                endpoints,
            });
        }

        Ok(Self {
            networks: pool,
            health_tracker: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Run `op` against the healthiest endpoint of `network`, falling back
    /// to the next endpoint on error or timeout.
    pub async fn call<T, F, Fut>(&self, network: &str, timeout: Duration, op: F) -> Result<T, SourceError>
    where
        F: Fn(HttpProvider) -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let entry = self
            .networks
            .get(network)
            .ok_or_else(|| SourceError::UnknownNetwork(network.to_string()))?;

        let mut last_error = SourceError::Network(format!("No RPC endpoints configured for {}", network));

        for endpoint in self.order_endpoints_by_health(network, &entry.endpoints) {
            let started = Instant::now();
            match tokio::time::timeout(timeout, op(endpoint.provider.clone())).await {
                Ok(Ok(value)) => {
                    self.update_health_success(network, &endpoint.url, started.elapsed());
                    return Ok(value);
                }
                Ok(Err(e)) => {
                    debug!("{} call via {} failed: {}", network, endpoint.url, e);
                    self.update_health_failure(network, &endpoint.url);
                    last_error = e;
                }
                Err(_) => {
                    debug!("{} call via {} timed out after {:?}", network, endpoint.url, timeout);
                    self.update_health_failure(network, &endpoint.url);
                    last_error = SourceError::Timeout {
                        network: network.to_string(),
                        after: timeout,
                    };
                }
            }
        }

        Err(last_error)
    }

    /// Check every network answers with its configured chain id.
    pub async fn verify_chain_ids(&self, timeout: Duration) -> Result<(), SourceError> {
        for (name, entry) in &self.networks {
            let actual = self
                .call(name, timeout, |provider| async move {
                    provider
                        .get_chain_id()
                        .await
                        .map_err(|e| SourceError::Network(e.to_string()))
                })
                .await?;

            if actual != entry.chain_id {
                return Err(SourceError::ChainIdMismatch {
                    network: name.clone(),
                    expected: entry.chain_id,
                    actual,
                });
            }
            info!("{} chain id: {}", name, actual);
        }
        Ok(())
    }

    /// Order endpoints by health score (best first)
    fn order_endpoints_by_health<'a>(&self, network: &str, endpoints: &'a [Endpoint]) -> Vec<&'a Endpoint> {
        let health = self.health_tracker.read().ok();
        let mut scored: Vec<(&Endpoint, f32)> = endpoints
            .iter()
            .map(|endpoint| {
                let score = health
                    .as_ref()
                    .and_then(|h| h.get(&health_key(network, &endpoint.url)))
                    .map(calculate_health_score)
                    .unwrap_or(1.0);
                (endpoint, score)
            })
            .collect();

        // Stable sort keeps configured order between equally healthy endpoints
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(endpoint, _)| endpoint).collect()
    }

    fn update_health_success(&self, network: &str, rpc_url: &str, elapsed: Duration) {
        if let Ok(mut health) = self.health_tracker.write() {
            let entry = health.entry(health_key(network, rpc_url)).or_default();
            entry.success_rate = entry.success_rate * 0.9 + 0.1;
            entry.avg_response_time = (entry.avg_response_time * 9 + elapsed) / 10;
            entry.consecutive_failures = 0;
        }
    }

    fn update_health_failure(&self, network: &str, rpc_url: &str) {
        if let Ok(mut health) = self.health_tracker.write() {
            let entry = health.entry(health_key(network, rpc_url)).or_default();
            entry.success_rate *= 0.9;
            entry.last_failure = Some(Instant::now());
            entry.consecutive_failures += 1;
            if entry.consecutive_failures == 3 {
                warn!("RPC endpoint {} for {} failed 3 times in a row", rpc_url, network);
            }
        }
    }
}

fn health_key(network: &str, rpc_url: &str) -> String {
    format!("{}:{}", network, rpc_url)
}

/// Health score from 0.0 (worst) to 1.0 (best)
fn calculate_health_score(health: &EndpointHealth) -> f32 {
    let mut score = health.success_rate;

    // Penalize recent failures
    if let Some(last_failure) = health.last_failure {
        if last_failure.elapsed() < Duration::from_secs(60) {
            score *= 0.5;
        }
    }

    if health.consecutive_failures > 0 {
        score *= 0.9_f32.powi(health.consecutive_failures as i32);
    }

    if health.avg_response_time < Duration::from_millis(500) {
        score *= 1.1;
    }

    score.clamp(0.0, 1.0)
}
