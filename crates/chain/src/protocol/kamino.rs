//! Kamino Lend obligation decoding.
//!
//! Obligations cache their USD valuations as U68F60 fixed-point (`*_sf`) fields,
//! refreshed on every `refresh_obligation`. Decoding reads those cached values; it
//! does not reprice deposits against reserves.

use super::{AccountDecoder, DecodedAccount};
use crate::accounts::ProgramAccount;
use crate::layout::{non_default_pubkey, pubkey_at, sf_to_f64, u128_at, DecodeError};

/// Kamino Lend program (mainnet).
pub const PROGRAM_ID: &str = "KLend2g3cP87fffoy8q1mQqGKjrxjC8boSyAYavgmjD";

/// Obligation account size, including the 8-byte Anchor discriminator.
pub const OBLIGATION_LEN: u64 = 3344;

/// Anchor discriminator for `Obligation`.
pub const OBLIGATION_DISCRIMINATOR: [u8; 8] = [168, 206, 141, 106, 88, 76, 172, 167];

// discriminator(8) tag(8) last_update(16) lending_market(32)
pub const OWNER_OFFSET: usize = 64;

const DEPOSITS_OFFSET: usize = 96;
const DEPOSIT_LEN: usize = 136;
const MAX_DEPOSITS: usize = 8;
const DEPOSITED_VALUE_OFFSET: usize = 1192;

const BORROWS_OFFSET: usize = 1208;
const BORROW_LEN: usize = 200;
const MAX_BORROWS: usize = 5;
// borrow_reserve(32) cumulative_borrow_rate_bsf(48) padding(8) borrowed_amount_sf(16)
const BORROW_MARKET_VALUE_OFFSET: usize = 104;

const BF_ADJUSTED_DEBT_OFFSET: usize = 2208;
const BORROWED_MARKET_VALUE_OFFSET: usize = 2224;
const UNHEALTHY_BORROW_VALUE_OFFSET: usize = 2256;

/// Decodes Kamino obligations.
#[derive(Debug, Default, Clone, Copy)]
pub struct KaminoObligationDecoder;

impl AccountDecoder for KaminoObligationDecoder {
    fn decode(&self, account: &ProgramAccount) -> Result<DecodedAccount, DecodeError> {
        let data = &account.data;
        if data.get(..8) != Some(&OBLIGATION_DISCRIMINATOR[..]) {
            return Err(DecodeError::Discriminator {
                pubkey: account.pubkey.clone(),
            });
        }

        let mut collateral_reserves = Vec::new();
        for i in 0..MAX_DEPOSITS {
            let entry = DEPOSITS_OFFSET + i * DEPOSIT_LEN;
            if let Some(reserve) = non_default_pubkey(&pubkey_at(data, entry)?) {
                collateral_reserves.push(reserve);
            }
        }

        let mut debt_reserves = Vec::new();
        for i in 0..MAX_BORROWS {
            let entry = BORROWS_OFFSET + i * BORROW_LEN;
            // Fully repaid slots keep their reserve key with a zero value
            if u128_at(data, entry + BORROW_MARKET_VALUE_OFFSET)? == 0 {
                continue;
            }
            if let Some(reserve) = non_default_pubkey(&pubkey_at(data, entry)?) {
                debt_reserves.push(reserve);
            }
        }

        let collateral_usd = sf_to_f64(u128_at(data, DEPOSITED_VALUE_OFFSET)?);
        let debt_usd = sf_to_f64(u128_at(data, BORROWED_MARKET_VALUE_OFFSET)?);
        let adjusted_debt = sf_to_f64(u128_at(data, BF_ADJUSTED_DEBT_OFFSET)?);
        let unhealthy_borrow_value = sf_to_f64(u128_at(data, UNHEALTHY_BORROW_VALUE_OFFSET)?);

        Ok(DecodedAccount {
            health_factor: DecodedAccount::health_factor_from(unhealthy_borrow_value, adjusted_debt),
            collateral_usd,
            debt_usd,
            collateral_reserves,
            debt_reserves,
        })
    }
}
