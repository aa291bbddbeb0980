//! Batch swap execution.
//!
//! Consumes [`SwapTask`]s against one adapter, either sequentially with a
//! stagger delay or fanned out in parallel. Each task is isolated: one
//! wallet failing never aborts the rest of the batch.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::dex::DexAdapter;
use crate::error::EngineError;
use crate::types::{SwapResult, SwapStatus, SwapTask};
use crate::wallet::SignerResolver;

pub struct SwapExecutionEngine {
    resolver: Arc<dyn SignerResolver>,
}

impl SwapExecutionEngine {
    pub fn new(resolver: Arc<dyn SignerResolver>) -> Self {
        Self { resolver }
    }

    /// One task at a time, pausing `stagger` between dispatches.
    pub async fn execute_sequential(
        &self,
        adapter: Arc<dyn DexAdapter>,
        tasks: Vec<SwapTask>,
        stagger: Duration,
    ) -> Vec<SwapResult> {
        let total = tasks.len();
        let mut results = Vec::with_capacity(total);
        for (index, task) in tasks.into_iter().enumerate() {
            results.push(run_task(self.resolver.clone(), adapter.clone(), task).await);
            if !stagger.is_zero() && index + 1 < total {
                tokio::time::sleep(stagger).await;
            }
        }
        results
    }

    /// All tasks at once; waits for every outcome. Results come back in
    /// task order.
    pub async fn execute_parallel(
        &self,
        adapter: Arc<dyn DexAdapter>,
        tasks: Vec<SwapTask>,
    ) -> Vec<SwapResult> {
        let mut set = JoinSet::new();
        let total = tasks.len();
        for (index, task) in tasks.into_iter().enumerate() {
            let resolver = self.resolver.clone();
            let adapter = adapter.clone();
            set.spawn(async move { (index, run_task(resolver, adapter, task).await) });
        }

        let mut slots: Vec<Option<SwapResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "swap task panicked"),
            }
        }
        slots
            .into_iter()
            .flatten()
            .collect()
    }
}

async fn run_task(
    resolver: Arc<dyn SignerResolver>,
    adapter: Arc<dyn DexAdapter>,
    task: SwapTask,
) -> SwapResult {
    if task.params.amount == 0 {
        return SwapResult {
            wallet_id: task.wallet_id,
            status: SwapStatus::Skipped,
            signature: None,
            in_amount: 0,
            out_amount: 0,
            error: Some("nothing to swap".into()),
        };
    }

    let signer = match resolver.signer(&task.wallet_id) {
        Ok(signer) => signer,
        Err(e) => {
            warn!(wallet = %task.wallet_id, error = %e, "signer resolution failed");
            return failure(task.wallet_id, SwapStatus::Skipped, e);
        }
    };

    info!(
        wallet = %task.wallet_id,
        dex = adapter.name(),
        direction = task.direction.as_str(),
        round = task.round,
        amount = task.params.amount,
        "executing swap"
    );

    match adapter.execute_swap(&task.params, &signer).await {
        Ok(execution) => SwapResult {
            wallet_id: task.wallet_id,
            status: SwapStatus::Confirmed,
            signature: Some(execution.signature),
            in_amount: execution.in_amount,
            out_amount: execution.out_amount,
            error: None,
        },
        Err(e) => {
            warn!(wallet = %task.wallet_id, dex = adapter.name(), error = %e, "swap failed");
            let status = match &e {
                // A venue that cannot serve this token at all is a skip,
                // not a failure of the wallet.
                EngineError::NotFound(_) => SwapStatus::Skipped,
                _ => SwapStatus::Failed,
            };
            failure(task.wallet_id, status, e)
        }
    }
}

fn failure(wallet_id: String, status: SwapStatus, error: EngineError) -> SwapResult {
    SwapResult {
        wallet_id,
        status,
        signature: None,
        in_amount: 0,
        out_amount: 0,
        error: Some(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use solana_sdk::{pubkey::Pubkey, signature::Keypair, signature::Signature};

    use crate::error::Result;
    use crate::types::{BotMode, SwapExecution, SwapParams, SwapQuote, TradeDirection};

    struct LooseResolver;

    impl SignerResolver for LooseResolver {
        fn signer(&self, wallet_id: &str) -> Result<Keypair> {
            if wallet_id == "unknown" {
                return Err(EngineError::NotFound(format!("wallet {wallet_id}")));
            }
            Ok(Keypair::new())
        }

        fn pubkey_of(&self, _wallet_id: &str) -> Result<Pubkey> {
            Ok(Pubkey::new_unique())
        }
    }

    /// Confirms everything except tasks carrying the marked amount.
    struct ScriptedAdapter {
        executed: AtomicUsize,
        fail_amount: u64,
    }

    #[async_trait]
    impl crate::dex::DexAdapter for ScriptedAdapter {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn quote(&self, params: &SwapParams) -> Result<SwapQuote> {
            Ok(SwapQuote {
                input_mint: params.input_mint,
                output_mint: params.output_mint,
                in_amount: params.amount,
                out_amount: params.amount,
                price_impact_pct: 0.0,
                dex: "scripted",
            })
        }

        async fn build_swap_transaction(
            &self,
            _params: &SwapParams,
        ) -> Result<solana_sdk::transaction::VersionedTransaction> {
            Err(EngineError::Config("not used in tests".into()))
        }

        async fn execute_swap(
            &self,
            params: &SwapParams,
            _signer: &Keypair,
        ) -> Result<SwapExecution> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            if params.amount == self.fail_amount {
                return Err(EngineError::Network("simulated broadcast failure".into()));
            }
            Ok(SwapExecution {
                signature: Signature::default(),
                in_amount: params.amount,
                out_amount: params.amount * 2,
            })
        }
    }

    fn task(wallet_id: &str, amount: u64) -> SwapTask {
        SwapTask {
            wallet_id: wallet_id.into(),
            params: SwapParams {
                input_mint: spl_token::native_mint::id(),
                output_mint: Pubkey::new_unique(),
                amount,
                slippage_bps: 300,
                payer: Pubkey::new_unique(),
            },
            token_mint: Pubkey::new_unique(),
            direction: TradeDirection::Buy,
            mode: BotMode::Bundle,
            round: 1,
        }
    }

    #[tokio::test]
    async fn parallel_batch_isolates_failures_and_keeps_order() {
        let engine = SwapExecutionEngine::new(Arc::new(LooseResolver));
        let adapter = Arc::new(ScriptedAdapter { executed: AtomicUsize::new(0), fail_amount: 777 });

        let results = engine
            .execute_parallel(
                adapter.clone(),
                vec![task("a", 100), task("b", 777), task("c", 100)],
            )
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].wallet_id, "a");
        assert_eq!(results[0].status, SwapStatus::Confirmed);
        assert_eq!(results[1].status, SwapStatus::Failed);
        assert!(results[1].error.as_deref().unwrap_or("").contains("broadcast"));
        assert_eq!(results[2].status, SwapStatus::Confirmed);
        assert_eq!(adapter.executed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_amount_and_missing_wallet_are_skipped_without_execution() {
        let engine = SwapExecutionEngine::new(Arc::new(LooseResolver));
        let adapter = Arc::new(ScriptedAdapter { executed: AtomicUsize::new(0), fail_amount: 0 });

        let results = engine
            .execute_sequential(
                adapter.clone(),
                vec![task("a", 0), task("unknown", 50)],
                Duration::ZERO,
            )
            .await;

        assert!(results.iter().all(|r| r.status == SwapStatus::Skipped));
        assert_eq!(adapter.executed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sequential_preserves_task_order() {
        let engine = SwapExecutionEngine::new(Arc::new(LooseResolver));
        let adapter = Arc::new(ScriptedAdapter { executed: AtomicUsize::new(0), fail_amount: 0 });

        let results = engine
            .execute_sequential(
                adapter,
                vec![task("first", 1), task("second", 2), task("third", 3)],
                Duration::ZERO,
            )
            .await;

        let order: Vec<&str> = results.iter().map(|r| r.wallet_id.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
        assert_eq!(results[2].out_amount, 6);
    }
}
