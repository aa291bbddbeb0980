//! Bot orchestration: Bundle, Volume and CopyTrade state machines.
//!
//! One run at a time. The run loop owns all mutable campaign state; the
//! outside world sees a watch-published [`BotState`] snapshot and a
//! broadcast stream of [`DetectedTrade`]s. Cancellation is cooperative: the
//! token is checked at round boundaries and before scheduling new work, so
//! in-flight sends always finish and get counted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use solana_sdk::native_token::sol_to_lamports;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use crate::config::{
    swap_reserve_lamports, BotConfig, BundleBotConfig, CopyAmountMode, CopyTradeBotConfig,
    VolumeBotConfig,
};
use crate::dex::{DexAdapter, DexKind};
use crate::engine::SwapExecutionEngine;
use crate::error::{EngineError, Result};
use crate::monitor::TradeMonitor;
use crate::rpc::ChainClient;
use crate::types::{
    BotState, BotStatus, DetectedTrade, SwapParams, SwapResult, SwapStatus, SwapTask,
    TradeDirection,
};
use crate::wallet::{SignerResolver, WalletManager};

/// Builds an adapter for a venue at a given priority fee.
pub type AdapterFactory = Arc<dyn Fn(DexKind, u64) -> Arc<dyn DexAdapter> + Send + Sync>;

const MONITOR_FETCH_LIMIT: usize = 20;
const MAX_RECORDED_TRADES: usize = 500;

#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct BotOrchestrator {
    runtime: BotRuntime,
    running: Arc<AtomicBool>,
    cancel_slot: Arc<Mutex<Option<CancelToken>>>,
}

/// Everything the spawned run loop needs, cheap to clone.
#[derive(Clone)]
struct BotRuntime {
    engine: Arc<SwapExecutionEngine>,
    custody: Arc<WalletManager>,
    chain: Arc<dyn ChainClient>,
    adapters: AdapterFactory,
    state_tx: Arc<watch::Sender<BotState>>,
    trade_tx: broadcast::Sender<DetectedTrade>,
    trades: Arc<Mutex<Vec<DetectedTrade>>>,
}

impl BotOrchestrator {
    pub fn new(
        engine: Arc<SwapExecutionEngine>,
        custody: Arc<WalletManager>,
        chain: Arc<dyn ChainClient>,
        adapters: AdapterFactory,
    ) -> Self {
        let (state_tx, _) = watch::channel(BotState::idle());
        let (trade_tx, _) = broadcast::channel(256);
        Self {
            runtime: BotRuntime {
                engine,
                custody,
                chain,
                adapters,
                state_tx: Arc::new(state_tx),
                trade_tx,
                trades: Arc::new(Mutex::new(Vec::new())),
            },
            running: Arc::new(AtomicBool::new(false)),
            cancel_slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Validate and launch a run. Rejected with `Conflict` (and no side
    /// effects) while another run is active.
    pub fn start(&self, config: BotConfig) -> Result<()> {
        config.validate()?;

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::Conflict("a bot run is already active".into()));
        }

        let token = CancelToken::new();
        if let Ok(mut slot) = self.cancel_slot.lock() {
            *slot = Some(token.clone());
        }

        let mode = config.mode();
        let total_rounds = match &config {
            BotConfig::Bundle(c) => c.rounds,
            BotConfig::Volume(c) => c.max_rounds,
            BotConfig::CopyTrade(_) => 0,
        };
        self.runtime.state_tx.send_replace(BotState {
            status: BotStatus::Running,
            mode: Some(mode),
            current_round: 0,
            total_rounds,
            trades_completed: 0,
            trades_failed: 0,
            started_at: Some(Utc::now()),
            error: None,
        });
        info!(mode = ?mode, "bot run starting");

        let runtime = self.runtime.clone();
        let running = self.running.clone();
        let cancel_slot = self.cancel_slot.clone();
        tokio::spawn(async move {
            let outcome = match config {
                BotConfig::Bundle(c) => runtime.run_bundle(c, token.clone()).await,
                BotConfig::Volume(c) => runtime.run_volume(c, token.clone()).await,
                BotConfig::CopyTrade(c) => runtime.run_copytrade(c, token.clone()).await,
            };

            match outcome {
                Ok(()) => {
                    runtime.update(|s| {
                        s.status = BotStatus::Idle;
                        s.error = None;
                    });
                    info!("bot run finished");
                }
                Err(e) => {
                    error!(error = %e, "bot run aborted");
                    runtime.update(|s| {
                        s.status = BotStatus::Error;
                        s.error = Some(e.to_string());
                    });
                }
            }

            if let Ok(mut slot) = cancel_slot.lock() {
                *slot = None;
            }
            running.store(false, Ordering::SeqCst);
        });
        Ok(())
    }

    /// Request a halt. In-flight work finishes; nothing new is scheduled.
    pub fn stop(&self) {
        let token = self.cancel_slot.lock().ok().and_then(|slot| slot.clone());
        if let Some(token) = token {
            info!("bot stop requested");
            token.cancel();
            self.runtime.update(|s| {
                if s.status == BotStatus::Running {
                    s.status = BotStatus::Stopping;
                }
            });
        }
    }

    pub fn state(&self) -> BotState {
        self.runtime.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BotState> {
        self.runtime.state_tx.subscribe()
    }

    pub fn subscribe_trades(&self) -> broadcast::Receiver<DetectedTrade> {
        self.runtime.trade_tx.subscribe()
    }

    /// Most recent detections, newest first.
    pub fn detected_trades(&self, limit: usize) -> Vec<DetectedTrade> {
        self.runtime
            .trades
            .lock()
            .map(|trades| trades.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

impl BotRuntime {
    /// Replace the published snapshot with an updated copy.
    fn update<F: FnOnce(&mut BotState)>(&self, apply: F) {
        let mut next = self.state_tx.borrow().clone();
        apply(&mut next);
        self.state_tx.send_replace(next);
    }

    fn absorb(&self, results: &[SwapResult]) {
        let confirmed = results.iter().filter(|r| r.status == SwapStatus::Confirmed).count() as u64;
        let failed = results.iter().filter(|r| r.status == SwapStatus::Failed).count() as u64;
        self.update(|s| {
            s.trades_completed += confirmed;
            s.trades_failed += failed;
        });
    }

    /// Missing wallet ids are fatal for the whole run.
    fn resolve_wallets(&self, wallet_ids: &[String]) -> Result<Vec<(String, Pubkey)>> {
        wallet_ids
            .iter()
            .map(|id| Ok((id.clone(), self.custody.pubkey_of(id)?)))
            .collect()
    }

    async fn random_pause(&self, min_ms: u64, max_ms: u64, token: &CancelToken) {
        if max_ms == 0 || token.is_cancelled() {
            return;
        }
        let ms = fastrand::u64(min_ms..=max_ms.max(min_ms));
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    async fn run_bundle(&self, cfg: BundleBotConfig, token: CancelToken) -> Result<()> {
        let adapter = (self.adapters)(cfg.dex, cfg.priority_fee_micro_lamports);
        let wallets = self.resolve_wallets(&cfg.wallet_ids)?;
        let reserve = swap_reserve_lamports(cfg.priority_fee_micro_lamports);

        // Balances are read once; max-sized buys across rounds drain the
        // same initial headroom.
        let mut max_buy_budget: Vec<u64> = Vec::new();
        if cfg.use_max_amount {
            for (_, pubkey) in &wallets {
                let balance = self.chain.get_balance(pubkey).await?;
                max_buy_budget.push(balance.saturating_sub(reserve));
            }
        }

        for round in 1..=cfg.rounds {
            if token.is_cancelled() {
                break;
            }
            self.update(|s| s.current_round = round);

            let mut tasks = Vec::with_capacity(wallets.len());
            for (index, (wallet_id, pubkey)) in wallets.iter().enumerate() {
                let amount = match cfg.direction {
                    TradeDirection::Buy if cfg.use_max_amount => max_buy_budget[index],
                    TradeDirection::Buy => sol_to_lamports(cfg.amount_sol),
                    TradeDirection::Sell => {
                        let ata = get_associated_token_address(pubkey, &cfg.token_mint);
                        self.chain.get_token_balance(&ata).await.unwrap_or(0)
                    }
                };
                tasks.push(self.task(
                    wallet_id,
                    *pubkey,
                    &cfg.token_mint,
                    cfg.direction,
                    amount,
                    cfg.slippage_bps,
                    crate::types::BotMode::Bundle,
                    round,
                ));
            }

            let results = if cfg.stagger_delay_ms > 0 {
                self.engine
                    .execute_sequential(
                        adapter.clone(),
                        tasks,
                        Duration::from_millis(cfg.stagger_delay_ms),
                    )
                    .await
            } else {
                self.engine.execute_parallel(adapter.clone(), tasks).await
            };
            self.absorb(&results);

            if round < cfg.rounds && cfg.delay_between_rounds_ms > 0 && !token.is_cancelled() {
                tokio::time::sleep(Duration::from_millis(cfg.delay_between_rounds_ms)).await;
            }
        }
        Ok(())
    }

    async fn run_volume(&self, cfg: VolumeBotConfig, token: CancelToken) -> Result<()> {
        let adapter = (self.adapters)(cfg.dex, cfg.priority_fee_micro_lamports);
        let wallets = self.resolve_wallets(&cfg.wallet_ids)?;
        let buy_lamports = sol_to_lamports(cfg.buy_amount_sol);

        let mut round = 1u32;
        loop {
            if token.is_cancelled() || (cfg.max_rounds > 0 && round > cfg.max_rounds) {
                break;
            }
            self.update(|s| s.current_round = round);

            let buys: Vec<SwapTask> = wallets
                .iter()
                .map(|(id, pubkey)| {
                    self.task(
                        id,
                        *pubkey,
                        &cfg.token_mint,
                        TradeDirection::Buy,
                        buy_lamports,
                        cfg.slippage_bps,
                        crate::types::BotMode::Volume,
                        round,
                    )
                })
                .collect();
            let results = self.engine.execute_parallel(adapter.clone(), buys).await;
            self.absorb(&results);

            if token.is_cancelled() {
                break;
            }
            self.random_pause(cfg.min_delay_ms, cfg.max_delay_ms, &token).await;

            // Sell a share of whatever the wallet actually holds, so dust
            // from earlier rounds drains instead of accumulating.
            let mut sells = Vec::with_capacity(wallets.len());
            for (id, pubkey) in &wallets {
                let ata = get_associated_token_address(pubkey, &cfg.token_mint);
                let balance = self.chain.get_token_balance(&ata).await.unwrap_or(0);
                let amount = (balance as u128 * cfg.sell_percentage as u128 / 100) as u64;
                sells.push(self.task(
                    id,
                    *pubkey,
                    &cfg.token_mint,
                    TradeDirection::Sell,
                    amount,
                    cfg.slippage_bps,
                    crate::types::BotMode::Volume,
                    round,
                ));
            }
            let results = self.engine.execute_parallel(adapter.clone(), sells).await;
            self.absorb(&results);

            if token.is_cancelled() {
                break;
            }
            self.random_pause(cfg.min_delay_ms, cfg.max_delay_ms, &token).await;
            round += 1;
        }
        Ok(())
    }

    async fn run_copytrade(&self, cfg: CopyTradeBotConfig, token: CancelToken) -> Result<()> {
        let adapter = (self.adapters)(cfg.dex, cfg.priority_fee_micro_lamports);
        let wallets = self.resolve_wallets(&cfg.wallet_ids)?;
        let reserve = swap_reserve_lamports(cfg.priority_fee_micro_lamports);
        let mut monitor = TradeMonitor::new(self.chain.clone(), cfg.target_wallet);

        while !token.is_cancelled() {
            let detected = match monitor.poll(MONITOR_FETCH_LIMIT).await {
                Ok(trades) => trades,
                Err(e) => {
                    warn!(target = %cfg.target_wallet, error = %e, "activity poll failed");
                    Vec::new()
                }
            };

            for mut trade in detected {
                let wanted = match trade.direction {
                    TradeDirection::Buy => cfg.copy_buys,
                    TradeDirection::Sell => cfg.copy_sells,
                };

                if wanted && !token.is_cancelled() {
                    if cfg.copy_delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(cfg.copy_delay_ms)).await;
                    }
                    let tasks = self.copy_tasks(&cfg, &wallets, &trade, reserve).await;
                    let results = self.engine.execute_parallel(adapter.clone(), tasks).await;
                    self.absorb(&results);
                    trade.replicated =
                        results.iter().any(|r| r.status == SwapStatus::Confirmed);
                }

                info!(
                    signature = %trade.signature,
                    direction = trade.direction.as_str(),
                    replicated = trade.replicated,
                    "trade detected"
                );
                self.record_trade(trade);
            }

            if token.is_cancelled() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(cfg.poll_interval_ms)).await;
        }
        Ok(())
    }

    async fn copy_tasks(
        &self,
        cfg: &CopyTradeBotConfig,
        wallets: &[(String, Pubkey)],
        trade: &DetectedTrade,
        reserve: u64,
    ) -> Vec<SwapTask> {
        let mut tasks = Vec::with_capacity(wallets.len());
        for (id, pubkey) in wallets {
            let amount = match trade.direction {
                TradeDirection::Buy => match cfg.amount_mode {
                    CopyAmountMode::Fixed => sol_to_lamports(cfg.fixed_amount_sol),
                    CopyAmountMode::Proportional => {
                        let spendable = self
                            .chain
                            .get_balance(pubkey)
                            .await
                            .unwrap_or(0)
                            .saturating_sub(reserve);
                        sol_to_lamports(trade.amount_sol).min(spendable)
                    }
                },
                // Sells exit the copier's whole position in that mint.
                TradeDirection::Sell => {
                    let ata = get_associated_token_address(pubkey, &trade.token_mint);
                    self.chain.get_token_balance(&ata).await.unwrap_or(0)
                }
            };
            tasks.push(self.task(
                id,
                *pubkey,
                &trade.token_mint,
                trade.direction,
                amount,
                cfg.slippage_bps,
                crate::types::BotMode::CopyTrade,
                0,
            ));
        }
        tasks
    }

    #[allow(clippy::too_many_arguments)]
    fn task(
        &self,
        wallet_id: &str,
        payer: Pubkey,
        token_mint: &Pubkey,
        direction: TradeDirection,
        amount: u64,
        slippage_bps: u16,
        mode: crate::types::BotMode,
        round: u32,
    ) -> SwapTask {
        let native = spl_token::native_mint::id();
        let (input_mint, output_mint) = match direction {
            TradeDirection::Buy => (native, *token_mint),
            TradeDirection::Sell => (*token_mint, native),
        };
        SwapTask {
            wallet_id: wallet_id.to_string(),
            params: SwapParams { input_mint, output_mint, amount, slippage_bps, payer },
            token_mint: *token_mint,
            direction,
            mode,
            round,
        }
    }

    fn record_trade(&self, trade: DetectedTrade) {
        if let Ok(mut trades) = self.trades.lock() {
            trades.push(trade.clone());
            if trades.len() > MAX_RECORDED_TRADES {
                let excess = trades.len() - MAX_RECORDED_TRADES;
                trades.drain(..excess);
            }
        }
        let _ = self.trade_tx.send(trade);
    }
}
