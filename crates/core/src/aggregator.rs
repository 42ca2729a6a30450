//! Concurrent fan-out across protocol sources.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use solshield_chain::Protocol;
use tracing::{debug, info, instrument, warn};

use crate::error::SourceError;
use crate::position::Position;
use crate::registry::SourceRegistry;
use crate::source::ProtocolAdapter;

/// One entry of an aggregate result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SourceOutcome {
    Position(Position),
    Error(SourceError),
}

impl SourceOutcome {
    pub fn position(&self) -> Option<&Position> {
        match self {
            Self::Position(p) => Some(p),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&SourceError> {
        match self {
            Self::Position(_) => None,
            Self::Error(e) => Some(e),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Position(p) => p.protocol(),
            Self::Error(e) => e.protocol,
        }
    }
}

/// Queries the registered sources concurrently and merges their results.
#[derive(Debug, Clone)]
pub struct Aggregator {
    registry: Arc<SourceRegistry>,
    source_timeout: Duration,
}

impl Aggregator {
    pub fn new(registry: Arc<SourceRegistry>, source_timeout: Duration) -> Self {
        Self {
            registry,
            source_timeout,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Fetch positions from every selected source.
    ///
    /// Results are grouped by source in registration order regardless of which
    /// source answers first. A failing or slow source contributes one
    /// [`SourceError`] and never affects the others.
    #[instrument(skip(self))]
    pub async fn fetch_all(&self, wallet: &str, filter: Option<&str>) -> Vec<SourceOutcome> {
        let started = Instant::now();
        let working_set = self.registry.select(filter);

        if working_set.is_empty() {
            debug!("No source matches the filter");
            return Vec::new();
        }

        let results = join_all(
            working_set
                .iter()
                .map(|adapter| self.fetch_with_deadline(adapter, wallet)),
        )
        .await;

        let mut merged = Vec::new();
        let mut failures = 0usize;
        for result in results {
            match result {
                Ok(positions) => merged.extend(positions.into_iter().map(SourceOutcome::Position)),
                Err(err) => {
                    failures += 1;
                    merged.push(SourceOutcome::Error(err));
                }
            }
        }

        info!(
            sources = working_set.len(),
            failures,
            entries = merged.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Aggregated positions"
        );

        merged
    }

    /// First position of one protocol, or `None` if the wallet holds none there.
    ///
    /// A protocol that is not registered also yields `None`.
    pub async fn fetch_one(
        &self,
        wallet: &str,
        protocol: Protocol,
    ) -> Result<Option<Position>, SourceError> {
        let Some(adapter) = self.registry.get(protocol) else {
            return Ok(None);
        };
        let positions = self.fetch_with_deadline(adapter, wallet).await?;
        Ok(positions.into_iter().next())
    }

    async fn fetch_with_deadline(
        &self,
        adapter: &ProtocolAdapter,
        wallet: &str,
    ) -> Result<Vec<Position>, SourceError> {
        match tokio::time::timeout(self.source_timeout, adapter.fetch_positions(wallet)).await {
            Ok(result) => {
                if let Err(err) = &result {
                    warn!(protocol = %err.protocol, error = %err.message, "Source failed");
                }
                result
            }
            Err(_) => {
                warn!(
                    protocol = %adapter.protocol(),
                    timeout_ms = self.source_timeout.as_millis(),
                    "Source timed out"
                );
                Err(SourceError::timeout(adapter.protocol(), self.source_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceErrorKind;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use solshield_chain::{
        AccountDecoder, DecodeError, DecodedAccount, ProgramAccount, RpcError, RpcTransport,
        SourceDescriptor,
    };

    const WALLET: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";

    /// Answers one scan after a delay, or fails.
    #[derive(Debug)]
    struct ScriptedTransport {
        delay: Duration,
        accounts: usize,
        fail: bool,
    }

    #[async_trait]
    impl RpcTransport for ScriptedTransport {
        async fn call(&self, _method: &str, _params: Value) -> Result<Value, RpcError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(RpcError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            let data = base64_of_owner();
            let accounts: Vec<Value> = (0..self.accounts)
                .map(|i| {
                    json!({
                        "pubkey": format!("acct{i}"),
                        "account": {"data": [data, "base64"], "owner": "p", "lamports": 0}
                    })
                })
                .collect();
            Ok(Value::Array(accounts))
        }
    }

    fn base64_of_owner() -> String {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        STANDARD.encode(bs58::decode(WALLET).into_vec().unwrap())
    }

    #[derive(Debug)]
    struct FlatDecoder(f64);

    impl AccountDecoder for FlatDecoder {
        fn decode(&self, _account: &ProgramAccount) -> Result<DecodedAccount, DecodeError> {
            Ok(DecodedAccount {
                health_factor: self.0,
                collateral_usd: 100.0,
                debt_usd: 50.0,
                collateral_reserves: Vec::new(),
                debt_reserves: Vec::new(),
            })
        }
    }

    fn adapter(protocol: Protocol, transport: ScriptedTransport, hf: f64) -> ProtocolAdapter {
        let descriptor = SourceDescriptor {
            owner_offset: 0,
            ..protocol.descriptor()
        };
        ProtocolAdapter::new(descriptor, Arc::new(transport)).with_decoder(Arc::new(FlatDecoder(hf)))
    }

    fn ok(delay_ms: u64, accounts: usize) -> ScriptedTransport {
        ScriptedTransport {
            delay: Duration::from_millis(delay_ms),
            accounts,
            fail: false,
        }
    }

    fn failing() -> ScriptedTransport {
        ScriptedTransport {
            delay: Duration::ZERO,
            accounts: 0,
            fail: true,
        }
    }

    fn aggregator(adapters: Vec<ProtocolAdapter>, timeout_ms: u64) -> Aggregator {
        Aggregator::new(
            Arc::new(SourceRegistry::from_adapters(adapters)),
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let aggregator = aggregator(
            vec![
                adapter(Protocol::Kamino, failing(), 1.3),
                adapter(Protocol::MarginFi, ok(0, 1), 2.0),
                adapter(Protocol::Solend, ok(0, 1), 1.1),
            ],
            1_000,
        );

        let results = aggregator.fetch_all(WALLET, None).await;
        assert_eq!(results.len(), 3);

        let err = results[0].error().unwrap();
        assert_eq!(err.protocol, Protocol::Kamino);
        assert_eq!(err.kind, SourceErrorKind::Transport);
        assert!(err.message.contains("503"));

        assert_eq!(results[1].protocol(), Protocol::MarginFi);
        assert_eq!(results[2].protocol(), Protocol::Solend);
        assert!(results[1].position().is_some());
    }

    #[tokio::test]
    async fn test_order_follows_registration_not_completion() {
        let aggregator = aggregator(
            vec![
                adapter(Protocol::Kamino, ok(60, 2), 1.3),
                adapter(Protocol::MarginFi, ok(30, 1), 2.0),
                adapter(Protocol::Solend, ok(0, 1), 1.1),
            ],
            1_000,
        );

        for _ in 0..3 {
            let protocols: Vec<_> = aggregator
                .fetch_all(WALLET, None)
                .await
                .iter()
                .map(SourceOutcome::protocol)
                .collect();
            assert_eq!(
                protocols,
                [
                    Protocol::Kamino,
                    Protocol::Kamino,
                    Protocol::MarginFi,
                    Protocol::Solend
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_slow_source_times_out_alone() {
        let aggregator = aggregator(
            vec![
                adapter(Protocol::Kamino, ok(0, 1), 1.3),
                adapter(Protocol::MarginFi, ok(5_000, 1), 2.0),
                adapter(Protocol::Solend, ok(0, 1), 1.1),
            ],
            50,
        );

        let started = Instant::now();
        let results = aggregator.fetch_all(WALLET, None).await;
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(results.len(), 3);
        let err = results[1].error().unwrap();
        assert_eq!(err.protocol, Protocol::MarginFi);
        assert_eq!(err.kind, SourceErrorKind::Timeout);
        assert!(results[0].position().is_some());
        assert!(results[2].position().is_some());
    }

    #[tokio::test]
    async fn test_sources_are_queried_concurrently() {
        let aggregator = aggregator(
            vec![
                adapter(Protocol::Kamino, ok(200, 1), 1.3),
                adapter(Protocol::MarginFi, ok(200, 1), 2.0),
                adapter(Protocol::Solend, ok(200, 1), 1.1),
            ],
            1_000,
        );

        let started = Instant::now();
        let results = aggregator.fetch_all(WALLET, None).await;
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.position().is_some()));
        // Three sequential scans would take at least 600ms
        assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_filter_selects_one_source() {
        let aggregator = aggregator(
            vec![
                adapter(Protocol::Kamino, ok(0, 1), 1.3),
                adapter(Protocol::Solend, ok(0, 1), 1.1),
            ],
            1_000,
        );

        let results = aggregator.fetch_all(WALLET, Some("solend")).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].protocol(), Protocol::Solend);

        assert!(aggregator.fetch_all(WALLET, Some("aave")).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_accounts_anywhere_is_empty() {
        let aggregator = aggregator(
            vec![
                adapter(Protocol::Kamino, ok(0, 0), 1.3),
                adapter(Protocol::MarginFi, ok(0, 0), 2.0),
                adapter(Protocol::Solend, ok(0, 0), 1.1),
            ],
            1_000,
        );
        assert!(aggregator.fetch_all(WALLET, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_one() {
        let aggregator = aggregator(
            vec![
                adapter(Protocol::Kamino, ok(0, 2), 1.3),
                adapter(Protocol::Solend, ok(0, 0), 1.1),
            ],
            1_000,
        );

        let kamino = aggregator.fetch_one(WALLET, Protocol::Kamino).await.unwrap();
        assert_eq!(kamino.unwrap().health_factor(), 1.3);

        assert!(aggregator
            .fetch_one(WALLET, Protocol::Solend)
            .await
            .unwrap()
            .is_none());
        assert!(aggregator
            .fetch_one(WALLET, Protocol::MarginFi)
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_outcome_serialization() {
        let err = SourceOutcome::Error(SourceError::timeout(
            Protocol::Solend,
            Duration::from_secs(1),
        ));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["protocol"], "Solend");
        assert!(value.get("error").is_some());
        assert!(value.get("health_factor").is_none());
    }
}
