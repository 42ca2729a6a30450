//! SolShield chain interaction layer.
//!
//! This crate provides:
//! - JSON-RPC transport to a Solana provider (`rpcCall(method, params)`)
//! - Pattern-filtered program account scans (`getProgramAccounts`)
//! - The closed set of supported lending protocols and their source descriptors
//! - Pluggable per-protocol account decoders (Kamino, MarginFi, Solend)

mod accounts;
mod layout;
pub mod protocol;
mod provider;

pub use accounts::{parse_program_accounts, ProgramAccount, ProgramAccountsQuery};
pub use layout::{DecodeError, PUBKEY_LEN};
pub use protocol::{
    AccountDecoder, DecodedAccount, KaminoObligationDecoder, MarginfiAccountDecoder, Protocol,
    SolendObligationDecoder, SourceDescriptor,
};
pub use provider::{RpcError, RpcProvider, RpcTransport, DEFAULT_RPC_TIMEOUT};
