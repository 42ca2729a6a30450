//! Solend obligation decoding.
//!
//! Solend obligations use the SPL token-lending packed layout. Values are
//! WAD-scaled (1e18) decimals cached by the last `refresh_obligation`.

use super::{AccountDecoder, DecodedAccount};
use crate::accounts::ProgramAccount;
use crate::layout::{non_default_pubkey, pubkey_at, u128_at, u8_at, wad_to_f64, DecodeError};

/// Solend main program (mainnet).
pub const PROGRAM_ID: &str = "So1endDq2YkqhipRh3WViPa8hFMqoontKXP7SsMy8us";

/// Packed obligation size.
pub const OBLIGATION_LEN: u64 = 1300;

// version(1) last_update(9) lending_market(32)
pub const OWNER_OFFSET: usize = 42;

const DEPOSITED_VALUE_OFFSET: usize = 74;
const BORROWED_VALUE_OFFSET: usize = 90;
const UNHEALTHY_BORROW_VALUE_OFFSET: usize = 122;

const DEPOSITS_LEN_OFFSET: usize = 202;
const BORROWS_LEN_OFFSET: usize = 203;
const DATA_FLAT_OFFSET: usize = 204;
const COLLATERAL_LEN: usize = 56;
const LIQUIDITY_LEN: usize = 80;
const MAX_RESERVES: usize = 10;

/// Decodes Solend obligations.
#[derive(Debug, Default, Clone, Copy)]
pub struct SolendObligationDecoder;

impl AccountDecoder for SolendObligationDecoder {
    fn decode(&self, account: &ProgramAccount) -> Result<DecodedAccount, DecodeError> {
        let data = &account.data;

        if u8_at(data, 0)? == 0 {
            return Err(DecodeError::Invalid {
                pubkey: account.pubkey.clone(),
                reason: "obligation is uninitialized".to_string(),
            });
        }

        let deposits_len = u8_at(data, DEPOSITS_LEN_OFFSET)? as usize;
        let borrows_len = u8_at(data, BORROWS_LEN_OFFSET)? as usize;
        if deposits_len + borrows_len > MAX_RESERVES {
            return Err(DecodeError::Invalid {
                pubkey: account.pubkey.clone(),
                reason: format!("{deposits_len} deposits + {borrows_len} borrows exceeds {MAX_RESERVES}"),
            });
        }

        let collateral_reserves = (0..deposits_len)
            .map(|i| pubkey_at(data, DATA_FLAT_OFFSET + i * COLLATERAL_LEN))
            .collect::<Result<Vec<_>, _>>()?
            .iter()
            .filter_map(non_default_pubkey)
            .collect();

        let borrows_start = DATA_FLAT_OFFSET + deposits_len * COLLATERAL_LEN;
        let debt_reserves = (0..borrows_len)
            .map(|i| pubkey_at(data, borrows_start + i * LIQUIDITY_LEN))
            .collect::<Result<Vec<_>, _>>()?
            .iter()
            .filter_map(non_default_pubkey)
            .collect();

        let collateral_usd = wad_to_f64(u128_at(data, DEPOSITED_VALUE_OFFSET)?);
        let debt_usd = wad_to_f64(u128_at(data, BORROWED_VALUE_OFFSET)?);
        let unhealthy_borrow_value = wad_to_f64(u128_at(data, UNHEALTHY_BORROW_VALUE_OFFSET)?);

        Ok(DecodedAccount {
            health_factor: DecodedAccount::health_factor_from(unhealthy_borrow_value, debt_usd),
            collateral_usd,
            debt_usd,
            collateral_reserves,
            debt_reserves,
        })
    }
}
