//! Target-wallet activity polling for copy trading.
//!
//! Each poll pulls the target's recent confirmed transactions, drops ones
//! already seen, and classifies the rest: a transaction counts as a swap
//! when it touches a known venue program and moved tokens for the target.
//! The token delta sign decides direction; the SOL delta gives the notional.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use solana_sdk::{native_token::LAMPORTS_PER_SOL, pubkey::Pubkey, signature::Signature};
use tracing::debug;

use crate::dex::pumpfun::PUMP_FUN_PROGRAM;
use crate::error::Result;
use crate::rpc::{ChainClient, ObservedTx};
use crate::types::{generate_id, DetectedTrade, TradeDirection};

/// Venue programs the classifier recognizes, with their display names.
pub const KNOWN_SWAP_PROGRAMS: &[(Pubkey, &str)] = &[
    (
        solana_sdk::pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4"),
        "jupiter",
    ),
    (
        solana_sdk::pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8"),
        "raydium",
    ),
    (
        solana_sdk::pubkey!("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK"),
        "raydium",
    ),
    (PUMP_FUN_PROGRAM, "pumpfun"),
];

pub struct TradeMonitor {
    chain: Arc<dyn ChainClient>,
    target: Pubkey,
    seen: HashSet<Signature>,
}

impl TradeMonitor {
    pub fn new(chain: Arc<dyn ChainClient>, target: Pubkey) -> Self {
        Self { chain, target, seen: HashSet::new() }
    }

    /// Fetch and classify unseen activity, oldest first.
    pub async fn poll(&mut self, limit: usize) -> Result<Vec<DetectedTrade>> {
        let observed = self.chain.recent_transactions(&self.target, limit).await?;
        let mut trades = Vec::new();

        // recent_transactions returns newest first; emit in arrival order.
        for tx in observed.into_iter().rev() {
            if !self.seen.insert(tx.signature) {
                continue;
            }
            match classify(&self.target, &tx) {
                Some(trade) => trades.push(trade),
                None => debug!(signature = %tx.signature, "ignored non-swap activity"),
            }
        }
        Ok(trades)
    }
}

fn classify(target: &Pubkey, tx: &ObservedTx) -> Option<DetectedTrade> {
    let (_, dex) = KNOWN_SWAP_PROGRAMS
        .iter()
        .find(|(program, _)| tx.program_ids.contains(program))?;

    // The largest token movement for the target decides the traded mint.
    let (mint, delta) = tx
        .token_deltas
        .iter()
        .max_by_key(|(_, delta)| delta.unsigned_abs())?;
    if *delta == 0 {
        return None;
    }

    let direction = if *delta > 0 {
        TradeDirection::Buy
    } else {
        TradeDirection::Sell
    };

    Some(DetectedTrade {
        id: generate_id(),
        signature: tx.signature.to_string(),
        target_wallet: *target,
        token_mint: *mint,
        direction,
        amount_sol: tx.sol_delta.unsigned_abs() as f64 / LAMPORTS_PER_SOL as f64,
        dex: dex.to_string(),
        replicated: false,
        detected_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use solana_sdk::{hash::Hash, transaction::VersionedTransaction};

    use crate::error::EngineError;

    struct ScriptedChain {
        batches: Mutex<Vec<Vec<ObservedTx>>>,
    }

    #[async_trait]
    impl ChainClient for ScriptedChain {
        async fn latest_blockhash(&self) -> Result<Hash> {
            Ok(Hash::new_unique())
        }

        async fn get_balance(&self, _address: &Pubkey) -> Result<u64> {
            Ok(0)
        }

        async fn get_account_data(&self, _address: &Pubkey) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn get_token_balance(&self, _token_account: &Pubkey) -> Result<u64> {
            Ok(0)
        }

        async fn send_and_confirm(&self, _tx: &VersionedTransaction) -> Result<Signature> {
            Err(EngineError::Network("not used".into()))
        }

        async fn recent_transactions(
            &self,
            _address: &Pubkey,
            _limit: usize,
        ) -> Result<Vec<ObservedTx>> {
            let mut batches = self.batches.lock().unwrap();
            if batches.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(batches.remove(0))
            }
        }
    }

    fn swap_tx(signature_byte: u8, mint: Pubkey, token_delta: i128, sol_delta: i64) -> ObservedTx {
        ObservedTx {
            signature: Signature::from([signature_byte; 64]),
            program_ids: vec![PUMP_FUN_PROGRAM, solana_sdk::system_program::id()],
            sol_delta,
            token_deltas: vec![(mint, token_delta)],
            block_time: None,
        }
    }

    #[tokio::test]
    async fn classifies_buys_and_sells_and_dedupes_across_polls() {
        let target = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let buy = swap_tx(1, mint, 1_000_000, -500_000_000);
        let sell = swap_tx(2, mint, -900_000, 450_000_000);

        let chain = Arc::new(ScriptedChain {
            batches: Mutex::new(vec![
                vec![sell.clone(), buy.clone()],
                vec![sell, buy],
            ]),
        });
        let mut monitor = TradeMonitor::new(chain, target);

        let trades = monitor.poll(10).await.unwrap();
        assert_eq!(trades.len(), 2);
        // Oldest first.
        assert_eq!(trades[0].direction, TradeDirection::Buy);
        assert!((trades[0].amount_sol - 0.5).abs() < 1e-9);
        assert_eq!(trades[1].direction, TradeDirection::Sell);
        assert_eq!(trades[0].token_mint, mint);

        // Second poll returns the same signatures; all deduped.
        let trades = monitor.poll(10).await.unwrap();
        assert!(trades.is_empty());
    }

    #[tokio::test]
    async fn ignores_activity_without_known_programs_or_token_movement() {
        let target = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let mut plain_transfer = swap_tx(3, mint, 0, -100);
        plain_transfer.token_deltas.clear();
        let mut unknown_program = swap_tx(4, mint, 500, -100);
        unknown_program.program_ids = vec![Pubkey::new_unique()];

        let chain = Arc::new(ScriptedChain {
            batches: Mutex::new(vec![vec![plain_transfer, unknown_program]]),
        });
        let mut monitor = TradeMonitor::new(chain, target);
        assert!(monitor.poll(10).await.unwrap().is_empty());
    }
}
