//! Command/event facade.
//!
//! Thin wiring layer a presentation front end talks to: wallet lifecycle,
//! funding, manual sells, bot control and the state/trade event streams.
//! All heavy lifting lives in the engines; this module only assembles them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::bot::{AdapterFactory, BotOrchestrator};
use crate::config::{defaults, BotConfig};
use crate::dex::{adapter_for, AdapterContext, DexKind};
use crate::engine::SwapExecutionEngine;
use crate::error::Result;
use crate::funding::{randomized_allocations, FundingConfig, FundingEngine, FundingOutcome};
use crate::rpc::ChainClient;
use crate::types::{BotState, DetectedTrade, FundAllocation, SwapResult, SwapTask, TradeDirection};
use crate::wallet::{
    SecretCipher, SettingsStore, SignerResolver, WalletInfo, WalletManager, WalletStore,
};
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;

/// How a funding command routes money from the custody wallet.
#[derive(Debug, Clone)]
pub enum FundingRequest {
    /// Fixed amount to every target.
    Direct { target_ids: Vec<String>, lamports_each: u64 },
    /// Caller-provided allocation set.
    Randomized { allocations: Vec<FundAllocation> },
    /// Allocations routed through single-use intermediate wallets.
    Hopped { allocations: Vec<FundAllocation> },
}

pub struct App {
    chain: Arc<dyn ChainClient>,
    settings: Arc<dyn SettingsStore>,
    cipher: Arc<dyn SecretCipher>,
    custody: Arc<WalletManager>,
    funding: FundingEngine,
    engine: Arc<SwapExecutionEngine>,
    bot: BotOrchestrator,
    adapters: AdapterFactory,
}

impl App {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn WalletStore>,
        settings: Arc<dyn SettingsStore>,
        cipher: Arc<dyn SecretCipher>,
    ) -> Self {
        Self::with_funding_config(chain, store, settings, cipher, FundingConfig::default())
    }

    pub fn with_funding_config(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn WalletStore>,
        settings: Arc<dyn SettingsStore>,
        cipher: Arc<dyn SecretCipher>,
        funding_config: FundingConfig,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let custody = Arc::new(WalletManager::new(store, cipher.clone(), chain.clone()));
        let engine = Arc::new(SwapExecutionEngine::new(custody.clone()));
        let funding = FundingEngine::new(chain.clone(), custody.clone(), funding_config);

        let adapters: AdapterFactory = {
            let chain = chain.clone();
            let settings = settings.clone();
            let cipher = cipher.clone();
            Arc::new(move |kind, priority_fee_micro_lamports| {
                adapter_for(
                    kind,
                    AdapterContext {
                        chain: chain.clone(),
                        settings: settings.clone(),
                        cipher: cipher.clone(),
                        http: http.clone(),
                        priority_fee_micro_lamports,
                        compute_unit_limit: defaults::DEFAULT_COMPUTE_UNIT_LIMIT,
                    },
                )
            })
        };

        let bot = BotOrchestrator::new(
            engine.clone(),
            custody.clone(),
            chain.clone(),
            adapters.clone(),
        );

        Self { chain, settings, cipher, custody, funding, engine, bot, adapters }
    }

    // ---- wallets ----

    pub fn import_wallet(&self, secret_bs58: &str, label: &str) -> Result<WalletInfo> {
        self.custody.import_wallet(secret_bs58, label)
    }

    pub fn generate_wallets(&self, count: usize, prefix: &str) -> Result<Vec<WalletInfo>> {
        self.custody.generate_wallets(count, prefix)
    }

    pub async fn list_wallets(&self) -> Vec<WalletInfo> {
        self.custody.list_with_balances().await
    }

    pub fn delete_wallet(&self, id: &str) -> Result<()> {
        self.custody.delete_wallet(id)
    }

    /// Encrypt and persist an external API credential.
    pub fn store_credential(&self, key: &str, value: &str) -> Result<()> {
        let encrypted = self.cipher.encrypt(value)?;
        self.settings.set(key, &encrypted);
        info!(setting = key, "credential stored");
        Ok(())
    }

    // ---- funding ----

    /// Build a jittered allocation plan that conserves `total_lamports`.
    pub fn plan_randomized_allocations(
        &self,
        target_ids: &[String],
        total_lamports: u64,
        spread_pct: u8,
    ) -> Result<Vec<FundAllocation>> {
        randomized_allocations(target_ids, total_lamports, spread_pct)
    }

    pub async fn fund(
        &self,
        from_wallet_id: &str,
        request: FundingRequest,
    ) -> Result<FundingOutcome> {
        match request {
            FundingRequest::Direct { target_ids, lamports_each } => {
                self.funding
                    .fund_direct(from_wallet_id, &target_ids, lamports_each)
                    .await
            }
            FundingRequest::Randomized { allocations } => {
                self.funding.fund_allocations(from_wallet_id, &allocations).await
            }
            FundingRequest::Hopped { allocations } => {
                self.funding.fund_hopped(from_wallet_id, &allocations).await
            }
        }
    }

    pub async fn reclaim(
        &self,
        wallet_ids: &[String],
        to_wallet_id: &str,
    ) -> Result<FundingOutcome> {
        self.funding.reclaim(wallet_ids, to_wallet_id).await
    }

    // ---- trading ----

    /// Sell each wallet's full balance of `token_mint`. Wallets holding
    /// nothing are skipped.
    pub async fn sell(
        &self,
        wallet_ids: &[String],
        token_mint: &Pubkey,
        dex: DexKind,
        slippage_bps: u16,
        priority_fee_micro_lamports: u64,
    ) -> Result<Vec<SwapResult>> {
        let adapter = (self.adapters)(dex, priority_fee_micro_lamports);
        let native = spl_token::native_mint::id();

        let mut tasks = Vec::with_capacity(wallet_ids.len());
        for id in wallet_ids {
            let payer = self.custody.pubkey_of(id)?;
            let ata = get_associated_token_address(&payer, token_mint);
            let amount = self.chain.get_token_balance(&ata).await.unwrap_or(0);
            tasks.push(SwapTask {
                wallet_id: id.clone(),
                params: crate::types::SwapParams {
                    input_mint: *token_mint,
                    output_mint: native,
                    amount,
                    slippage_bps,
                    payer,
                },
                token_mint: *token_mint,
                direction: TradeDirection::Sell,
                mode: crate::types::BotMode::Bundle,
                round: 0,
            });
        }

        Ok(self
            .engine
            .execute_sequential(adapter, tasks, Duration::ZERO)
            .await)
    }

    // ---- bot control & events ----

    pub fn start_bot(&self, config: BotConfig) -> Result<()> {
        self.bot.start(config)
    }

    pub fn stop_bot(&self) {
        self.bot.stop()
    }

    pub fn bot_state(&self) -> BotState {
        self.bot.state()
    }

    pub fn detected_trades(&self, limit: usize) -> Vec<DetectedTrade> {
        self.bot.detected_trades(limit)
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BotState> {
        self.bot.subscribe_state()
    }

    pub fn subscribe_trades(&self) -> broadcast::Receiver<DetectedTrade> {
        self.bot.subscribe_trades()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{signature::Keypair, signer::Signer};

    use crate::types::SwapStatus;
    use crate::wallet::test_support::{init_tracing, StaticChainClient, TaggedCipher};
    use crate::wallet::{MemorySettingsStore, MemoryWalletStore};

    fn app() -> App {
        init_tracing();
        App::with_funding_config(
            Arc::new(StaticChainClient::default()),
            Arc::new(MemoryWalletStore::default()),
            Arc::new(MemorySettingsStore::default()),
            Arc::new(TaggedCipher),
            FundingConfig::immediate(),
        )
    }

    #[tokio::test]
    async fn wallet_lifecycle_through_the_facade() -> anyhow::Result<()> {
        let app = app();
        let main = Keypair::new();
        let imported = app.import_wallet(&main.to_base58_string(), "main")?;
        assert_eq!(imported.pubkey, main.pubkey());

        let workers = app.generate_wallets(2, "worker")?;
        assert_eq!(app.list_wallets().await.len(), 3);

        app.delete_wallet(&workers[0].id)?;
        assert_eq!(app.list_wallets().await.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn sell_with_empty_positions_skips_every_wallet() {
        let app = app();
        let workers = app.generate_wallets(2, "w").unwrap();
        let ids: Vec<String> = workers.into_iter().map(|w| w.id).collect();

        let results = app
            .sell(&ids, &Pubkey::new_unique(), DexKind::PumpFun, 300, 0)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == SwapStatus::Skipped));
    }

    #[tokio::test]
    async fn direct_funding_flows_through_the_facade() -> anyhow::Result<()> {
        let app = app();
        let main = Keypair::new();
        let custody = app.import_wallet(&main.to_base58_string(), "main")?;
        let workers = app.generate_wallets(2, "w")?;
        let ids: Vec<String> = workers.into_iter().map(|w| w.id).collect();

        let outcome = app
            .fund(&custody.id, FundingRequest::Direct { target_ids: ids, lamports_each: 10_000 })
            .await?;
        assert_eq!(outcome.signatures.len(), 2);
        assert!(outcome.failures.is_empty());
        Ok(())
    }

    #[test]
    fn credentials_are_stored_encrypted() {
        let settings = Arc::new(MemorySettingsStore::default());
        let app = App::with_funding_config(
            Arc::new(StaticChainClient::default()),
            Arc::new(MemoryWalletStore::default()),
            settings.clone(),
            Arc::new(TaggedCipher),
            FundingConfig::immediate(),
        );

        app.store_credential("jupiter_api_key", "sekret").unwrap();
        let stored = settings.get("jupiter_api_key").unwrap();
        assert_ne!(stored, "sekret");
        assert!(stored.contains("sekret")); // TaggedCipher only prefixes
    }
}
