//! Bot run configurations and protocol defaults.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::dex::DexKind;
use crate::error::{EngineError, Result};
use crate::types::{BotMode, TradeDirection};

pub mod defaults {
    pub const DEFAULT_SLIPPAGE_BPS: u16 = 300;
    pub const DEFAULT_PRIORITY_FEE_MICRO_LAMPORTS: u64 = 50_000;
    pub const DEFAULT_COMPUTE_UNIT_LIMIT: u32 = 200_000;
    pub const TX_CONFIRM_TIMEOUT_MS: u64 = 60_000;
    pub const TX_RETRY_COUNT: usize = 3;
    pub const TX_RETRY_DELAY_MS: u64 = 1_000;

    /// Flat network fee budgeted per signature.
    pub const BASE_FEE_LAMPORTS: u64 = 5_000;
    /// Rent/ATA buffer kept back when sizing a max-balance buy, so the
    /// wallet can still afford the sell leg later.
    pub const SELL_RESERVE_BUFFER_LAMPORTS: u64 = 2_500_000;

    pub const COPYTRADE_POLL_INTERVAL_MS: u64 = 3_000;
    pub const COPYTRADE_MIN_POLL_INTERVAL_MS: u64 = 1_000;
    pub const COPYTRADE_MAX_POLL_INTERVAL_MS: u64 = 30_000;
    pub const COPYTRADE_MAX_COPY_DELAY_MS: u64 = 30_000;
    pub const COPYTRADE_FIXED_AMOUNT_SOL: f64 = 0.1;
}

/// Lamports a wallet must keep back per swap on top of the traded amount.
///
/// Base signature fee, plus the priority fee at the estimated compute usage,
/// plus the sell-leg buffer.
pub fn swap_reserve_lamports(priority_fee_micro_lamports: u64) -> u64 {
    let priority =
        (priority_fee_micro_lamports * defaults::DEFAULT_COMPUTE_UNIT_LIMIT as u64).div_ceil(1_000_000);
    defaults::BASE_FEE_LAMPORTS + priority + defaults::SELL_RESERVE_BUFFER_LAMPORTS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleBotConfig {
    pub token_mint: Pubkey,
    pub dex: DexKind,
    pub wallet_ids: Vec<String>,
    pub direction: TradeDirection,
    /// Fixed per-wallet size in SOL. Ignored for buys when `use_max_amount`.
    pub amount_sol: f64,
    /// Size each buy as the wallet's balance minus the swap reserve.
    pub use_max_amount: bool,
    pub slippage_bps: u16,
    pub rounds: u32,
    pub delay_between_rounds_ms: u64,
    /// 0 dispatches the whole round in parallel.
    pub stagger_delay_ms: u64,
    pub priority_fee_micro_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeBotConfig {
    pub token_mint: Pubkey,
    pub dex: DexKind,
    pub wallet_ids: Vec<String>,
    pub buy_amount_sol: f64,
    /// Share of the wallet's live token balance sold each cycle, 50..=100.
    pub sell_percentage: u8,
    pub slippage_bps: u16,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 0 cycles until stopped.
    pub max_rounds: u32,
    pub priority_fee_micro_lamports: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyAmountMode {
    /// Always trade `fixed_amount_sol`.
    Fixed,
    /// Mirror the detected trade's SOL notional, capped by the copier's
    /// spendable balance.
    Proportional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyTradeBotConfig {
    pub target_wallet: Pubkey,
    pub dex: DexKind,
    pub wallet_ids: Vec<String>,
    pub slippage_bps: u16,
    pub amount_mode: CopyAmountMode,
    pub fixed_amount_sol: f64,
    pub copy_buys: bool,
    pub copy_sells: bool,
    pub copy_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub priority_fee_micro_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BotConfig {
    Bundle(BundleBotConfig),
    Volume(VolumeBotConfig),
    CopyTrade(CopyTradeBotConfig),
}

impl BotConfig {
    pub fn mode(&self) -> BotMode {
        match self {
            BotConfig::Bundle(_) => BotMode::Bundle,
            BotConfig::Volume(_) => BotMode::Volume,
            BotConfig::CopyTrade(_) => BotMode::CopyTrade,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            BotConfig::Bundle(c) => c.validate(),
            BotConfig::Volume(c) => c.validate(),
            BotConfig::CopyTrade(c) => c.validate(),
        }
    }
}

fn check_wallets(wallet_ids: &[String]) -> Result<()> {
    if wallet_ids.is_empty() {
        return Err(EngineError::Config("at least one wallet is required".into()));
    }
    Ok(())
}

fn check_slippage(slippage_bps: u16) -> Result<()> {
    if slippage_bps == 0 || slippage_bps > 5_000 {
        return Err(EngineError::Config(format!(
            "slippage_bps must be in 1..=5000, got {slippage_bps}"
        )));
    }
    Ok(())
}

impl BundleBotConfig {
    pub fn validate(&self) -> Result<()> {
        check_wallets(&self.wallet_ids)?;
        check_slippage(self.slippage_bps)?;
        if self.rounds == 0 {
            return Err(EngineError::Config("rounds must be at least 1".into()));
        }
        if !self.use_max_amount && self.amount_sol <= 0.0 {
            return Err(EngineError::Config(format!(
                "amount_sol must be positive, got {}",
                self.amount_sol
            )));
        }
        if self.use_max_amount && self.direction == TradeDirection::Sell {
            return Err(EngineError::Config(
                "use_max_amount only applies to buys; sells size from the token balance".into(),
            ));
        }
        Ok(())
    }
}

impl VolumeBotConfig {
    pub fn validate(&self) -> Result<()> {
        check_wallets(&self.wallet_ids)?;
        check_slippage(self.slippage_bps)?;
        if self.buy_amount_sol <= 0.0 {
            return Err(EngineError::Config(format!(
                "buy_amount_sol must be positive, got {}",
                self.buy_amount_sol
            )));
        }
        if !(50..=100).contains(&self.sell_percentage) {
            return Err(EngineError::Config(format!(
                "sell_percentage must be in 50..=100, got {}",
                self.sell_percentage
            )));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(EngineError::Config(format!(
                "min_delay_ms {} exceeds max_delay_ms {}",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

impl CopyTradeBotConfig {
    pub fn validate(&self) -> Result<()> {
        check_wallets(&self.wallet_ids)?;
        check_slippage(self.slippage_bps)?;
        if !self.copy_buys && !self.copy_sells {
            return Err(EngineError::Config(
                "at least one of copy_buys / copy_sells must be enabled".into(),
            ));
        }
        if self.amount_mode == CopyAmountMode::Fixed && self.fixed_amount_sol <= 0.0 {
            return Err(EngineError::Config(format!(
                "fixed_amount_sol must be positive, got {}",
                self.fixed_amount_sol
            )));
        }
        if !(defaults::COPYTRADE_MIN_POLL_INTERVAL_MS..=defaults::COPYTRADE_MAX_POLL_INTERVAL_MS)
            .contains(&self.poll_interval_ms)
        {
            return Err(EngineError::Config(format!(
                "poll_interval_ms must be in {}..={}, got {}",
                defaults::COPYTRADE_MIN_POLL_INTERVAL_MS,
                defaults::COPYTRADE_MAX_POLL_INTERVAL_MS,
                self.poll_interval_ms
            )));
        }
        if self.copy_delay_ms > defaults::COPYTRADE_MAX_COPY_DELAY_MS {
            return Err(EngineError::Config(format!(
                "copy_delay_ms must not exceed {}, got {}",
                defaults::COPYTRADE_MAX_COPY_DELAY_MS,
                self.copy_delay_ms
            )));
        }
        Ok(())
    }
}
