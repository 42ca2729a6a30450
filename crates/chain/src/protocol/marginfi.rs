//! MarginFi v2 account handling.
//!
//! MarginFi accounts store balances as bank shares without cached USD values, so
//! pricing a position needs every referenced bank and its oracle. Until that is
//! wired in, the default decoder refuses rather than reporting an empty position.

use super::{AccountDecoder, DecodedAccount};
use crate::accounts::ProgramAccount;
use crate::layout::DecodeError;

/// MarginFi v2 program (mainnet).
pub const PROGRAM_ID: &str = "MFv2hWf31Z9kbCa1snEPYctwafyhdvnV7FZnsebVacA";

/// `MarginfiAccount` size, including the 8-byte Anchor discriminator.
pub const ACCOUNT_LEN: u64 = 2312;

// discriminator(8) group(32)
pub const AUTHORITY_OFFSET: usize = 40;

/// Default MarginFi decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarginfiAccountDecoder;

impl AccountDecoder for MarginfiAccountDecoder {
    fn decode(&self, _account: &ProgramAccount) -> Result<DecodedAccount, DecodeError> {
        // TODO: load referenced banks and their oracle prices to value share balances
        Err(DecodeError::Unsupported {
            protocol: "MarginFi",
            reason: "balances are bank shares and need bank and oracle state to value",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refuses_instead_of_fabricating() {
        let account = ProgramAccount {
            pubkey: "Acct".into(),
            data: vec![0u8; ACCOUNT_LEN as usize],
            owner: PROGRAM_ID.into(),
            lamports: 0,
        };
        assert!(matches!(
            MarginfiAccountDecoder.decode(&account),
            Err(DecodeError::Unsupported { .. })
        ));
    }
}
