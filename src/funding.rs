//! Native-currency distribution between the custody wallet and workers.
//!
//! Three topologies: direct transfers, caller-provided randomized
//! allocations, and multi-hop routing through single-use intermediate
//! keypairs. Transfers are spaced by jitter windows; tests zero them
//! through [`FundingConfig`]. An operation only fails wholesale when zero
//! transfers landed.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    system_instruction,
    transaction::{Transaction, VersionedTransaction},
};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::rpc::ChainClient;
use crate::types::FundAllocation;
use crate::wallet::SignerResolver;

#[derive(Debug, Clone, Copy)]
pub struct JitterWindow {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl JitterWindow {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn zero() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    async fn pause(&self) {
        if self.max_ms == 0 {
            return;
        }
        let ms = fastrand::u64(self.min_ms..=self.max_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FundingConfig {
    /// Pause between consecutive direct transfers.
    pub transfer_jitter: JitterWindow,
    /// Pause between consecutive hop transfers.
    pub hop_jitter: JitterWindow,
    /// Pause between the hop-funding phase and the drain phase.
    pub phase_pause: JitterWindow,
    /// Extra lamports given to each hop so its drain can pay its own fee.
    pub hop_fee_lamports: u64,
    /// Flat fee withheld when draining or reclaiming a wallet.
    pub network_fee_lamports: u64,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            transfer_jitter: JitterWindow::new(2_000, 8_000),
            hop_jitter: JitterWindow::new(3_000, 10_000),
            phase_pause: JitterWindow::new(5_000, 15_000),
            hop_fee_lamports: 10_000,
            network_fee_lamports: 5_000,
        }
    }
}

impl FundingConfig {
    /// All jitter zeroed; used by tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            transfer_jitter: JitterWindow::zero(),
            hop_jitter: JitterWindow::zero(),
            phase_pause: JitterWindow::zero(),
            ..Self::default()
        }
    }
}

/// Splits `total_lamports` over the wallets with weights drawn uniformly
/// from `1 ± spread`. The allocations conserve the budget exactly; the
/// floor-rounding remainder goes to the first slot.
pub fn randomized_allocations(
    wallet_ids: &[String],
    total_lamports: u64,
    spread_pct: u8,
) -> Result<Vec<FundAllocation>> {
    if wallet_ids.is_empty() {
        return Err(EngineError::Config("no wallets to allocate to".into()));
    }
    if spread_pct > 90 {
        return Err(EngineError::Config(format!(
            "spread_pct must be at most 90, got {spread_pct}"
        )));
    }

    // Integer weights in parts-per-thousand drawn from `1000 ± spread`.
    // Floor division keeps every share at or below its exact quotient, so
    // the shares never sum past the budget.
    let spread = spread_pct as u64 * 10;
    let weights: Vec<u64> = wallet_ids
        .iter()
        .map(|_| 1_000 - spread + fastrand::u64(0..=2 * spread))
        .collect();
    let weight_sum: u128 = weights.iter().map(|w| *w as u128).sum();

    let mut allocations: Vec<FundAllocation> = wallet_ids
        .iter()
        .zip(&weights)
        .map(|(id, w)| FundAllocation {
            wallet_id: id.clone(),
            lamports: (total_lamports as u128 * *w as u128 / weight_sum) as u64,
        })
        .collect();

    let assigned: u64 = allocations.iter().map(|a| a.lamports).sum();
    allocations[0].lamports += total_lamports - assigned;
    Ok(allocations)
}

/// Outcome of a distribution run. `failures` holds per-target error text;
/// the run as a whole only errors when `signatures` stayed empty.
#[derive(Debug, Default)]
pub struct FundingOutcome {
    pub signatures: Vec<Signature>,
    pub failures: Vec<String>,
}

pub struct FundingEngine {
    chain: Arc<dyn ChainClient>,
    resolver: Arc<dyn SignerResolver>,
    config: FundingConfig,
}

impl FundingEngine {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        resolver: Arc<dyn SignerResolver>,
        config: FundingConfig,
    ) -> Self {
        Self { chain, resolver, config }
    }

    /// Fixed amount from the custody wallet straight to every target.
    pub async fn fund_direct(
        &self,
        from_wallet_id: &str,
        target_ids: &[String],
        lamports_each: u64,
    ) -> Result<FundingOutcome> {
        let allocations: Vec<FundAllocation> = target_ids
            .iter()
            .map(|id| FundAllocation { wallet_id: id.clone(), lamports: lamports_each })
            .collect();
        self.fund_allocations(from_wallet_id, &allocations).await
    }

    /// Caller-provided allocation set, one transfer per slot.
    pub async fn fund_allocations(
        &self,
        from_wallet_id: &str,
        allocations: &[FundAllocation],
    ) -> Result<FundingOutcome> {
        let from = self.resolver.signer(from_wallet_id)?;
        let mut outcome = FundingOutcome::default();

        let last = allocations.len().saturating_sub(1);
        for (index, allocation) in allocations.iter().enumerate() {
            if allocation.lamports == 0 {
                continue;
            }
            match self.funded_target(allocation).await {
                Ok(to) => match self.transfer(&from, &to, allocation.lamports).await {
                    Ok(sig) => outcome.signatures.push(sig),
                    Err(e) => {
                        warn!(target = %allocation.wallet_id, error = %e, "funding transfer failed");
                        outcome.failures.push(format!("{}: {e}", allocation.wallet_id));
                    }
                },
                Err(e) => outcome.failures.push(format!("{}: {e}", allocation.wallet_id)),
            }
            if index < last {
                self.config.transfer_jitter.pause().await;
            }
        }

        info!(
            from = %from.pubkey(),
            sent = outcome.signatures.len(),
            failed = outcome.failures.len(),
            "direct funding finished"
        );
        self.finish(outcome)
    }

    /// Route every allocation through a fresh single-use keypair: custody
    /// funds the hop (amount + hop fee), then after a pause each hop drains
    /// to its real target. Breaks the direct on-chain link between custody
    /// and workers.
    pub async fn fund_hopped(
        &self,
        from_wallet_id: &str,
        allocations: &[FundAllocation],
    ) -> Result<FundingOutcome> {
        let from = self.resolver.signer(from_wallet_id)?;
        let mut outcome = FundingOutcome::default();
        let mut hops: Vec<(Keypair, Pubkey)> = Vec::new();

        for allocation in allocations {
            if allocation.lamports == 0 {
                continue;
            }
            let target = match self.funded_target(allocation).await {
                Ok(t) => t,
                Err(e) => {
                    outcome.failures.push(format!("{}: {e}", allocation.wallet_id));
                    continue;
                }
            };
            let hop = Keypair::new();
            let hop_amount = allocation.lamports + self.config.hop_fee_lamports;
            match self.transfer(&from, &hop.pubkey(), hop_amount).await {
                Ok(sig) => {
                    outcome.signatures.push(sig);
                    hops.push((hop, target));
                }
                Err(e) => {
                    warn!(target = %allocation.wallet_id, error = %e, "hop funding failed");
                    outcome.failures.push(format!("{}: {e}", allocation.wallet_id));
                }
            }
            self.config.hop_jitter.pause().await;
        }

        if !hops.is_empty() {
            self.config.phase_pause.pause().await;
        }

        for (hop, target) in &hops {
            let balance = match self.chain.get_balance(&hop.pubkey()).await {
                Ok(b) => b,
                Err(e) => {
                    outcome.failures.push(format!("hop {}: {e}", hop.pubkey()));
                    continue;
                }
            };
            let drain = balance.saturating_sub(self.config.network_fee_lamports);
            if drain == 0 {
                outcome.failures.push(format!("hop {}: nothing to drain", hop.pubkey()));
                continue;
            }
            match self.transfer(hop, target, drain).await {
                Ok(sig) => outcome.signatures.push(sig),
                Err(e) => {
                    warn!(hop = %hop.pubkey(), error = %e, "hop drain failed");
                    outcome.failures.push(format!("hop {}: {e}", hop.pubkey()));
                }
            }
            self.config.hop_jitter.pause().await;
        }

        info!(
            sent = outcome.signatures.len(),
            failed = outcome.failures.len(),
            hops = hops.len(),
            "hopped funding finished"
        );
        self.finish(outcome)
    }

    /// Sweep each wallet's balance minus the network fee back to the
    /// destination. Wallets without usable balance are skipped silently.
    pub async fn reclaim(
        &self,
        wallet_ids: &[String],
        to_wallet_id: &str,
    ) -> Result<FundingOutcome> {
        let to = self.resolver.pubkey_of(to_wallet_id)?;
        let mut outcome = FundingOutcome::default();
        let mut swept_any_balance = false;

        for id in wallet_ids {
            let from = match self.resolver.signer(id) {
                Ok(k) => k,
                Err(e) => {
                    outcome.failures.push(format!("{id}: {e}"));
                    continue;
                }
            };
            let balance = self.chain.get_balance(&from.pubkey()).await.unwrap_or(0);
            let amount = balance.saturating_sub(self.config.network_fee_lamports);
            if amount == 0 {
                debug!(wallet = %from.pubkey(), balance, "nothing to reclaim");
                continue;
            }
            swept_any_balance = true;
            match self.transfer(&from, &to, amount).await {
                Ok(sig) => outcome.signatures.push(sig),
                Err(e) => {
                    warn!(wallet = %from.pubkey(), error = %e, "reclaim failed");
                    outcome.failures.push(format!("{id}: {e}"));
                }
            }
            self.config.transfer_jitter.pause().await;
        }

        info!(swept = outcome.signatures.len(), to = %to, "reclaim finished");
        if !swept_any_balance {
            // Nothing held a balance; an empty sweep is a success.
            return Ok(outcome);
        }
        self.finish(outcome)
    }

    async fn funded_target(&self, allocation: &FundAllocation) -> Result<Pubkey> {
        self.resolver.pubkey_of(&allocation.wallet_id)
    }

    async fn transfer(&self, from: &Keypair, to: &Pubkey, lamports: u64) -> Result<Signature> {
        let blockhash = self.chain.latest_blockhash().await?;
        let ix = system_instruction::transfer(&from.pubkey(), to, lamports);
        let tx = Transaction::new_signed_with_payer(
            &[ix],
            Some(&from.pubkey()),
            &[from],
            blockhash,
        );
        self.chain.send_and_confirm(&VersionedTransaction::from(tx)).await
    }

    fn finish(&self, outcome: FundingOutcome) -> Result<FundingOutcome> {
        if outcome.signatures.is_empty() {
            if let Some(first) = outcome.failures.first() {
                return Err(EngineError::Network(format!(
                    "no transfers succeeded; first failure: {first}"
                )));
            }
        }
        Ok(outcome)
    }
}
