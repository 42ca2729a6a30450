//! Supported lending protocols.
//!
//! The protocol set is closed: [`Protocol::ALL`] lists every variant in
//! registration order. Each protocol has a static [`SourceDescriptor`] describing
//! how to scan for a wallet's accounts, and a default [`AccountDecoder`] that turns
//! a raw account into position figures.
//!
//! # Example
//!
//! ```rust,ignore
//! use solshield_chain::{Protocol, ProgramAccountsQuery};
//!
//! let descriptor = Protocol::Kamino.descriptor();
//! let query = ProgramAccountsQuery::for_wallet(&descriptor, wallet);
//! let raw = transport.call(ProgramAccountsQuery::METHOD, query.params()).await?;
//! ```

mod kamino;
mod marginfi;
mod solend;

pub use kamino::KaminoObligationDecoder;
pub use marginfi::MarginfiAccountDecoder;
pub use solend::SolendObligationDecoder;

use serde::Serialize;
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;

use crate::accounts::ProgramAccount;
use crate::layout::DecodeError;

/// Lending protocol identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Protocol {
    Kamino,
    MarginFi,
    Solend,
}

impl Protocol {
    /// Every protocol, in registration order.
    pub const ALL: [Protocol; 3] = [Protocol::Kamino, Protocol::MarginFi, Protocol::Solend];

    /// Display name (e.g. "MarginFi").
    pub fn name(&self) -> &'static str {
        match self {
            Self::Kamino => "Kamino",
            Self::MarginFi => "MarginFi",
            Self::Solend => "Solend",
        }
    }

    /// Lowercase slug used by callers to select a protocol (e.g. "marginfi").
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Kamino => "kamino",
            Self::MarginFi => "marginfi",
            Self::Solend => "solend",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
    }

    /// Static scan parameters for this protocol's position accounts.
    pub fn descriptor(&self) -> SourceDescriptor {
        match self {
            Self::Kamino => SourceDescriptor {
                protocol: *self,
                program_id: kamino::PROGRAM_ID.to_string(),
                data_size: kamino::OBLIGATION_LEN,
                owner_offset: kamino::OWNER_OFFSET,
            },
            Self::MarginFi => SourceDescriptor {
                protocol: *self,
                program_id: marginfi::PROGRAM_ID.to_string(),
                data_size: marginfi::ACCOUNT_LEN,
                owner_offset: marginfi::AUTHORITY_OFFSET,
            },
            Self::Solend => SourceDescriptor {
                protocol: *self,
                program_id: solend::PROGRAM_ID.to_string(),
                data_size: solend::OBLIGATION_LEN,
                owner_offset: solend::OWNER_OFFSET,
            },
        }
    }

    /// Default decoder for this protocol's account layout.
    pub fn default_decoder(&self) -> Arc<dyn AccountDecoder> {
        match self {
            Self::Kamino => Arc::new(KaminoObligationDecoder),
            Self::MarginFi => Arc::new(MarginfiAccountDecoder),
            Self::Solend => Arc::new(SolendObligationDecoder),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown protocol: {s}"))
    }
}

/// Per-protocol scan configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub protocol: Protocol,
    /// Lending program address (base58)
    pub program_id: String,
    /// Expected position account size in bytes
    pub data_size: u64,
    /// Byte offset of the owner/authority key within the account
    pub owner_offset: usize,
}

/// Position figures extracted from one raw account.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAccount {
    /// Liquidation-weighted collateral over debt; `f64::INFINITY` when debt is zero
    pub health_factor: f64,
    pub collateral_usd: f64,
    pub debt_usd: f64,
    /// Collateral reserve addresses, in account order
    pub collateral_reserves: Vec<String>,
    /// Debt reserve addresses, in account order
    pub debt_reserves: Vec<String>,
}

impl DecodedAccount {
    /// Health factor from liquidation-weighted collateral and debt values.
    pub fn health_factor_from(weighted_collateral_usd: f64, debt_usd: f64) -> f64 {
        if debt_usd <= 0.0 {
            return f64::INFINITY;
        }
        (weighted_collateral_usd / debt_usd).max(0.0)
    }
}

/// Decodes a protocol's position account into [`DecodedAccount`].
///
/// Decoders are pure functions of the account bytes. Adapters hold one per
/// protocol and can swap it out.
pub trait AccountDecoder: Send + Sync + Debug {
    fn decode(&self, account: &ProgramAccount) -> Result<DecodedAccount, DecodeError>;
}
