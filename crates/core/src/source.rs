//! Per-protocol position source.
//!
//! A [`ProtocolAdapter`] scans one lending program for a wallet's accounts,
//! decodes each into a [`Position`], and reports any failure as a
//! [`SourceError`] scoped to its protocol.

use std::collections::BTreeMap;
use std::sync::Arc;

use solshield_chain::{
    parse_program_accounts, AccountDecoder, ProgramAccount, ProgramAccountsQuery, Protocol,
    RpcTransport, SourceDescriptor,
};
use tracing::{debug, instrument, warn};

use crate::config::FallbackMode;
use crate::error::SourceError;
use crate::position::{Position, TokenList};

/// Reserve address -> token symbol.
pub type ReserveSymbols = Arc<BTreeMap<String, String>>;

/// Position source for one protocol.
#[derive(Debug, Clone)]
pub struct ProtocolAdapter {
    descriptor: SourceDescriptor,
    transport: Arc<dyn RpcTransport>,
    decoder: Arc<dyn AccountDecoder>,
    fallback: FallbackMode,
    reserves: ReserveSymbols,
}

impl ProtocolAdapter {
    /// Create an adapter with the protocol's default decoder.
    pub fn new(descriptor: SourceDescriptor, transport: Arc<dyn RpcTransport>) -> Self {
        let decoder = descriptor.protocol.default_decoder();
        Self {
            descriptor,
            transport,
            decoder,
            fallback: FallbackMode::Disabled,
            reserves: Arc::new(BTreeMap::new()),
        }
    }

    /// Replace the account decoder.
    pub fn with_decoder(mut self, decoder: Arc<dyn AccountDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Set the behaviour on provider failure.
    pub fn with_fallback(mut self, fallback: FallbackMode) -> Self {
        self.fallback = fallback;
        self
    }

    /// Set the reserve symbol table used to label token lists.
    pub fn with_reserves(mut self, reserves: ReserveSymbols) -> Self {
        self.reserves = reserves;
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.descriptor.protocol
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    /// Fetch every position the wallet holds on this protocol.
    ///
    /// No matching accounts is an empty result, not an error.
    #[instrument(skip(self), fields(protocol = %self.protocol()))]
    pub async fn fetch_positions(&self, wallet: &str) -> Result<Vec<Position>, SourceError> {
        let protocol = self.protocol();
        let query = ProgramAccountsQuery::for_wallet(&self.descriptor, wallet);

        let raw = match self
            .transport
            .call(ProgramAccountsQuery::METHOD, query.params())
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                return match self.fallback {
                    FallbackMode::Demo => {
                        warn!(
                            %wallet,
                            error = %err,
                            "Provider call failed, emitting synthetic demo position"
                        );
                        Ok(vec![demo_position(protocol, wallet)])
                    }
                    FallbackMode::Disabled => Err(SourceError::transport(protocol, &err)),
                };
            }
        };

        let accounts =
            parse_program_accounts(raw).map_err(|e| SourceError::decode(protocol, &e))?;

        let mut positions = Vec::with_capacity(accounts.len());
        for account in &accounts {
            if !self.owned_by(account, wallet)? {
                continue;
            }
            let decoded = self
                .decoder
                .decode(account)
                .map_err(|e| SourceError::decode(protocol, &e))?;

            positions.push(Position::observed(
                protocol,
                wallet,
                decoded.health_factor,
                decoded.collateral_usd,
                decoded.debt_usd,
                self.symbols(&decoded.collateral_reserves),
                self.symbols(&decoded.debt_reserves),
            ));
        }

        debug!(
            %wallet,
            accounts = accounts.len(),
            positions = positions.len(),
            "Fetched positions"
        );

        Ok(positions)
    }

    /// The provider filters on owner, but a scan can still surface accounts
    /// that do not belong to the wallet. Those are skipped.
    fn owned_by(&self, account: &ProgramAccount, wallet: &str) -> Result<bool, SourceError> {
        let owner = account
            .key_at(self.descriptor.owner_offset)
            .map_err(|e| SourceError::decode(self.protocol(), &e))?;
        if owner != wallet {
            warn!(
                account = %account.pubkey,
                %owner,
                %wallet,
                "Skipping account owned by another wallet"
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn symbols(&self, reserves: &[String]) -> TokenList {
        let mut symbols = TokenList::new();
        for reserve in reserves {
            let symbol = self
                .reserves
                .get(reserve)
                .cloned()
                .unwrap_or_else(|| short_address(reserve));
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        symbols
    }
}

/// Abbreviated form of an unlabelled reserve address.
fn short_address(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}..{}", &address[..4], &address[address.len() - 4..])
}

/// Demonstration position for a protocol, flagged as synthetic.
pub(crate) fn demo_position(protocol: Protocol, wallet: &str) -> Position {
    match protocol {
        Protocol::Kamino => Position::synthetic(
            protocol,
            wallet,
            1.34,
            5200.0,
            3880.0,
            &["SOL", "mSOL"],
            &["USDC"],
        ),
        Protocol::MarginFi => Position::synthetic(
            protocol,
            wallet,
            2.10,
            12_500.0,
            5952.0,
            &["SOL", "JitoSOL"],
            &["USDC", "USDT"],
        ),
        Protocol::Solend => Position::synthetic(
            protocol,
            wallet,
            1.85,
            3100.0,
            1675.0,
            &["SOL"],
            &["USDC"],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceErrorKind;
    use crate::position::RiskLevel;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::{json, Value};
    use solshield_chain::{DecodeError, DecodedAccount, RpcError};

    const WALLET: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
    const OTHER: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    #[derive(Debug)]
    struct FixedTransport(Result<Value, String>);

    #[async_trait]
    impl RpcTransport for FixedTransport {
        async fn call(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
            assert_eq!(method, ProgramAccountsQuery::METHOD);
            self.0
                .clone()
                .map_err(|message| RpcError::Rpc { code: -32005, message })
        }
    }

    /// Reads the health factor from the first byte after the owner key.
    #[derive(Debug)]
    struct ByteDecoder;

    impl AccountDecoder for ByteDecoder {
        fn decode(&self, account: &ProgramAccount) -> Result<DecodedAccount, DecodeError> {
            let tenths = *account
                .data
                .get(32)
                .ok_or_else(|| DecodeError::Malformed("empty".to_string()))?;
            Ok(DecodedAccount {
                health_factor: f64::from(tenths) / 10.0,
                collateral_usd: 1000.0,
                debt_usd: 500.0,
                collateral_reserves: vec!["reserveSol".to_string()],
                debt_reserves: vec!["EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string()],
            })
        }
    }

    fn account(owner: &str, hf_tenths: u8) -> Value {
        let mut data = bs58::decode(owner).into_vec().unwrap();
        data.push(hf_tenths);
        json!({
            "pubkey": format!("acct{hf_tenths}"),
            "account": {
                "data": [STANDARD.encode(&data), "base64"],
                "owner": "prog",
                "lamports": 1,
            }
        })
    }

    fn adapter(result: Result<Value, String>) -> ProtocolAdapter {
        let descriptor = SourceDescriptor {
            owner_offset: 0,
            ..Protocol::Kamino.descriptor()
        };
        ProtocolAdapter::new(descriptor, Arc::new(FixedTransport(result)))
            .with_decoder(Arc::new(ByteDecoder))
    }

    #[tokio::test]
    async fn test_empty_scan_is_not_an_error() {
        let positions = adapter(Ok(json!([]))).fetch_positions(WALLET).await.unwrap();
        assert!(positions.is_empty());
    }

    #[tokio::test]
    async fn test_decodes_and_classifies_each_account() {
        let adapter = adapter(Ok(json!([account(WALLET, 13), account(WALLET, 11)])));
        let positions = adapter.fetch_positions(WALLET).await.unwrap();

        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].risk_level(), RiskLevel::Warning);
        assert_eq!(positions[1].risk_level(), RiskLevel::Critical);
        assert_eq!(positions[0].tokens_debt(), ["EPjF..Dt1v"]);
        assert!(positions.iter().all(|p| !p.is_synthetic()));
    }

    #[tokio::test]
    async fn test_reserve_symbols_label_tokens() {
        let reserves = Arc::new(BTreeMap::from([(
            "reserveSol".to_string(),
            "SOL".to_string(),
        )]));
        let adapter = adapter(Ok(json!([account(WALLET, 20)]))).with_reserves(reserves);
        let positions = adapter.fetch_positions(WALLET).await.unwrap();
        assert_eq!(positions[0].tokens_collateral(), ["SOL"]);
    }

    #[tokio::test]
    async fn test_foreign_accounts_are_skipped() {
        let adapter = adapter(Ok(json!([account(OTHER, 9), account(WALLET, 20)])));
        let positions = adapter.fetch_positions(WALLET).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].health_factor(), 2.0);
    }

    #[tokio::test]
    async fn test_transport_failure_without_fallback() {
        let err = adapter(Err("rate limited".to_string()))
            .fetch_positions(WALLET)
            .await
            .unwrap_err();
        assert_eq!(err.protocol, Protocol::Kamino);
        assert_eq!(err.kind, SourceErrorKind::Transport);
        assert!(err.message.contains("rate limited"));
    }

    #[derive(Debug)]
    struct TimedOutTransport;

    #[async_trait]
    impl RpcTransport for TimedOutTransport {
        async fn call(&self, _method: &str, _params: Value) -> Result<Value, RpcError> {
            Err(RpcError::Timeout)
        }
    }

    #[tokio::test]
    async fn test_provider_timeout_is_timeout_kind() {
        let adapter =
            ProtocolAdapter::new(Protocol::Solend.descriptor(), Arc::new(TimedOutTransport));
        let err = adapter.fetch_positions(WALLET).await.unwrap_err();
        assert_eq!(err.protocol, Protocol::Solend);
        assert_eq!(err.kind, SourceErrorKind::Timeout);
        assert_eq!(err.message, "request to provider timed out");
    }

    #[tokio::test]
    async fn test_transport_failure_with_demo_fallback() {
        let positions = adapter(Err("rate limited".to_string()))
            .with_fallback(FallbackMode::Demo)
            .fetch_positions(WALLET)
            .await
            .unwrap();
        assert_eq!(positions.len(), 1);
        assert!(positions[0].is_synthetic());
        assert_eq!(positions[0].health_factor(), 1.34);
        assert_eq!(positions[0].wallet(), WALLET);
    }

    #[tokio::test]
    async fn test_malformed_result_is_decode_error() {
        let err = adapter(Ok(json!({"unexpected": true})))
            .fetch_positions(WALLET)
            .await
            .unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_unsupported_decoder_is_decode_error() {
        let descriptor = SourceDescriptor {
            owner_offset: 0,
            ..Protocol::MarginFi.descriptor()
        };
        let adapter = ProtocolAdapter::new(
            descriptor,
            Arc::new(FixedTransport(Ok(json!([account(WALLET, 20)])))),
        );
        let err = adapter.fetch_positions(WALLET).await.unwrap_err();
        assert_eq!(err.protocol, Protocol::MarginFi);
        assert_eq!(err.kind, SourceErrorKind::Decode);
    }

    #[test]
    fn test_demo_positions_are_classified() {
        for protocol in Protocol::ALL {
            let position = demo_position(protocol, WALLET);
            assert!(position.is_synthetic());
            assert_eq!(position.protocol(), protocol);
        }
        assert_eq!(
            demo_position(Protocol::MarginFi, WALLET).risk_level(),
            RiskLevel::Healthy
        );
    }
}
