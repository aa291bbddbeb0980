//! Bonding-curve account layout and constant-product pricing.
//!
//! The on-chain account is a fixed byte layout: an 8-byte discriminator
//! header, five little-endian u64 reserve fields, a completion flag and the
//! creator key. All pricing is integer math in base units; intermediate
//! products widen to u128 so the reserve product never overflows.

use solana_sdk::pubkey::Pubkey;

use crate::error::{EngineError, Result};

/// Discriminator (8) + five u64 (40) + complete flag (1) + creator (32).
pub const CURVE_ACCOUNT_MIN_LEN: usize = 81;

const OFFSET_VIRTUAL_TOKEN: usize = 8;
const OFFSET_VIRTUAL_SOL: usize = 16;
const OFFSET_REAL_TOKEN: usize = 24;
const OFFSET_REAL_SOL: usize = 32;
const OFFSET_TOTAL_SUPPLY: usize = 40;
const OFFSET_COMPLETE: usize = 48;
const OFFSET_CREATOR: usize = 49;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveState {
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    /// Set when the curve graduated to an external pool; trading through
    /// the curve program is over.
    pub complete: bool,
    pub creator: Pubkey,
}

impl CurveState {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CURVE_ACCOUNT_MIN_LEN {
            return Err(EngineError::ProtocolState(format!(
                "bonding curve account too short: {} bytes",
                data.len()
            )));
        }
        let creator = Pubkey::try_from(&data[OFFSET_CREATOR..OFFSET_CREATOR + 32])
            .map_err(|_| EngineError::ProtocolState("malformed creator key".into()))?;
        Ok(Self {
            virtual_token_reserves: u64_le(data, OFFSET_VIRTUAL_TOKEN),
            virtual_sol_reserves: u64_le(data, OFFSET_VIRTUAL_SOL),
            real_token_reserves: u64_le(data, OFFSET_REAL_TOKEN),
            real_sol_reserves: u64_le(data, OFFSET_REAL_SOL),
            token_total_supply: u64_le(data, OFFSET_TOTAL_SUPPLY),
            complete: data[OFFSET_COMPLETE] != 0,
            creator,
        })
    }

    /// Tokens received for `net_sol_in` lamports (fee already deducted).
    pub fn buy_quote(&self, net_sol_in: u64) -> u64 {
        if net_sol_in == 0 || self.virtual_sol_reserves == 0 {
            return 0;
        }
        let k = self.virtual_sol_reserves as u128 * self.virtual_token_reserves as u128;
        let new_sol = self.virtual_sol_reserves as u128 + net_sol_in as u128;
        let new_tokens = k / new_sol;
        (self.virtual_token_reserves as u128).saturating_sub(new_tokens) as u64
    }

    /// Lamports received for `token_in` base units, before the fee.
    pub fn sell_quote(&self, token_in: u64) -> u64 {
        if token_in == 0 || self.virtual_token_reserves == 0 {
            return 0;
        }
        let k = self.virtual_sol_reserves as u128 * self.virtual_token_reserves as u128;
        let new_tokens = self.virtual_token_reserves as u128 + token_in as u128;
        let new_sol = k / new_tokens;
        (self.virtual_sol_reserves as u128).saturating_sub(new_sol) as u64
    }

    /// Rough price impact of spending `sol_in` lamports, in percent.
    pub fn buy_price_impact_pct(&self, sol_in: u64) -> f64 {
        if self.virtual_sol_reserves == 0 {
            return 0.0;
        }
        sol_in as f64 / self.virtual_sol_reserves as f64 * 100.0
    }
}

/// Protocol fee on `amount`, floor division.
pub fn fee_amount(amount: u64, fee_bps: u64) -> u64 {
    (amount as u128 * fee_bps as u128 / 10_000) as u64
}

fn u64_le(data: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(raw)
}
