//! Program account scans.
//!
//! A position lookup is a pattern-filtered scan, not a key lookup: every account
//! of the program with the expected size whose owner field matches the wallet.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::layout::{pubkey_at, DecodeError};
use crate::protocol::SourceDescriptor;

/// Parameters of a `getProgramAccounts` scan for one wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramAccountsQuery {
    pub program_id: String,
    pub data_size: u64,
    pub owner_offset: usize,
    pub owner: String,
}

impl ProgramAccountsQuery {
    pub const METHOD: &'static str = "getProgramAccounts";

    /// Build the scan for a wallet against a source descriptor.
    pub fn for_wallet(descriptor: &SourceDescriptor, wallet: &str) -> Self {
        Self {
            program_id: descriptor.program_id.clone(),
            data_size: descriptor.data_size,
            owner_offset: descriptor.owner_offset,
            owner: wallet.to_string(),
        }
    }

    /// JSON-RPC params array.
    pub fn params(&self) -> Value {
        json!([
            self.program_id,
            {
                "encoding": "base64",
                "filters": [
                    {"dataSize": self.data_size},
                    {"memcmp": {"offset": self.owner_offset, "bytes": self.owner}},
                ],
            },
        ])
    }
}

/// A raw account returned by a program scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramAccount {
    /// Account address (base58)
    pub pubkey: String,
    /// Raw account data
    pub data: Vec<u8>,
    /// Owning program (base58)
    pub owner: String,
    pub lamports: u64,
}

impl ProgramAccount {
    /// Base58 key stored at `offset` in the account data.
    pub fn key_at(&self, offset: usize) -> Result<String, DecodeError> {
        Ok(bs58::encode(pubkey_at(&self.data, offset)?).into_string())
    }
}

#[derive(Deserialize)]
struct KeyedAccount {
    pubkey: String,
    account: AccountInfo,
}

#[derive(Deserialize)]
struct AccountInfo {
    data: (String, String),
    #[serde(default)]
    owner: String,
    #[serde(default)]
    lamports: u64,
}

/// Parse the `result` of a `getProgramAccounts` call.
///
/// Accepts both the bare array and the `{context, value}` shape returned when
/// `withContext` is set.
pub fn parse_program_accounts(result: Value) -> Result<Vec<ProgramAccount>, DecodeError> {
    let list = match result {
        Value::Object(mut map) if map.contains_key("value") => map
            .remove("value")
            .unwrap_or(Value::Array(Vec::new())),
        other => other,
    };

    let keyed: Vec<KeyedAccount> =
        serde_json::from_value(list).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    keyed
        .into_iter()
        .map(|entry| {
            let (encoded, encoding) = entry.account.data;
            if encoding != "base64" {
                return Err(DecodeError::Encoding {
                    pubkey: entry.pubkey,
                    encoding,
                });
            }
            let data = STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| DecodeError::Base64 {
                    pubkey: entry.pubkey.clone(),
                    reason: e.to_string(),
                })?;
            Ok(ProgramAccount {
                pubkey: entry.pubkey,
                data,
                owner: entry.account.owner,
                lamports: entry.account.lamports,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Protocol;

    #[test]
    fn test_query_params_shape() {
        let descriptor = Protocol::Solend.descriptor();
        let query = ProgramAccountsQuery::for_wallet(&descriptor, "Wallet111");
        let params = query.params();

        assert_eq!(params[0], descriptor.program_id.as_str());
        assert_eq!(params[1]["encoding"], "base64");
        assert_eq!(params[1]["filters"][0]["dataSize"], 1300);
        assert_eq!(params[1]["filters"][1]["memcmp"]["offset"], 42);
        assert_eq!(params[1]["filters"][1]["memcmp"]["bytes"], "Wallet111");
    }

    #[test]
    fn test_parse_bare_and_context_shapes() {
        let data = STANDARD.encode([1u8, 2, 3]);
        let entry = json!({
            "pubkey": "Acct1",
            "account": {"data": [data, "base64"], "owner": "Prog", "lamports": 10}
        });

        let bare = parse_program_accounts(json!([entry.clone()])).unwrap();
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].data, vec![1, 2, 3]);

        let wrapped =
            parse_program_accounts(json!({"context": {"slot": 1}, "value": [entry]})).unwrap();
        assert_eq!(wrapped, bare);

        assert!(parse_program_accounts(json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_other_encodings() {
        let entry = json!({
            "pubkey": "Acct1",
            "account": {"data": ["abc", "jsonParsed"], "owner": "Prog", "lamports": 0}
        });
        assert!(matches!(
            parse_program_accounts(json!([entry])),
            Err(DecodeError::Encoding { .. })
        ));
    }

    #[test]
    fn test_key_at() {
        let mut data = vec![0u8; 64];
        data[32..64].copy_from_slice(&[9u8; 32]);
        let account = ProgramAccount {
            pubkey: "Acct".into(),
            data,
            owner: String::new(),
            lamports: 0,
        };
        assert_eq!(account.key_at(32).unwrap(), bs58::encode([9u8; 32]).into_string());
        assert!(account.key_at(48).is_err());
    }
}
