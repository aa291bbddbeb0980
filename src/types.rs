//! Core data model shared across the engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "buy",
            TradeDirection::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotMode {
    Bundle,
    Volume,
    CopyTrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    Idle,
    Running,
    Stopping,
    Error,
}

/// Inputs for one swap. Amounts are integer base units of the input mint
/// (lamports when the input is native SOL).
#[derive(Debug, Clone)]
pub struct SwapParams {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: u64,
    pub slippage_bps: u16,
    pub payer: Pubkey,
}

/// A freshly computed quote. Quotes are never cached; every build starts
/// from a new one.
#[derive(Debug, Clone)]
pub struct SwapQuote {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
    pub out_amount: u64,
    pub price_impact_pct: f64,
    pub dex: &'static str,
}

/// One unit of work for the execution engine. Immutable, consumed once.
#[derive(Debug, Clone)]
pub struct SwapTask {
    pub wallet_id: String,
    pub params: SwapParams,
    pub token_mint: Pubkey,
    pub direction: TradeDirection,
    pub mode: BotMode,
    pub round: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStatus {
    Confirmed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct SwapResult {
    pub wallet_id: String,
    pub status: SwapStatus,
    pub signature: Option<Signature>,
    pub in_amount: u64,
    pub out_amount: u64,
    pub error: Option<String>,
}

/// Outcome of a single confirmed swap, as reported by an adapter.
#[derive(Debug, Clone)]
pub struct SwapExecution {
    pub signature: Signature,
    pub in_amount: u64,
    pub out_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundAllocation {
    pub wallet_id: String,
    pub lamports: u64,
}

/// Live orchestrator snapshot. A new value replaces the previous one on
/// every transition; consumers never see partial updates.
#[derive(Debug, Clone, Serialize)]
pub struct BotState {
    pub status: BotStatus,
    pub mode: Option<BotMode>,
    pub current_round: u32,
    pub total_rounds: u32,
    pub trades_completed: u64,
    pub trades_failed: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl BotState {
    pub fn idle() -> Self {
        Self {
            status: BotStatus::Idle,
            mode: None,
            current_round: 0,
            total_rounds: 0,
            trades_completed: 0,
            trades_failed: 0,
            started_at: None,
            error: None,
        }
    }
}

/// A swap observed on the copy-trade target wallet.
#[derive(Debug, Clone)]
pub struct DetectedTrade {
    pub id: String,
    pub signature: String,
    pub target_wallet: Pubkey,
    pub token_mint: Pubkey,
    pub direction: TradeDirection,
    pub amount_sol: f64,
    pub dex: String,
    pub replicated: bool,
    pub detected_at: DateTime<Utc>,
}

/// Short opaque identifier for records created by this crate.
pub fn generate_id() -> String {
    let mut raw = [0u8; 16];
    fastrand::fill(&mut raw);
    bs58::encode(raw).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_nonempty() {
        let a = generate_id();
        let b = generate_id();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn idle_state_is_zeroed() {
        let s = BotState::idle();
        assert_eq!(s.status, BotStatus::Idle);
        assert_eq!(s.current_round, 0);
        assert!(s.mode.is_none());
        assert!(s.error.is_none());
    }
}
