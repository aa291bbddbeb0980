//! Chain access boundary.
//!
//! [`ChainClient`] is the single seam between the engines and the network:
//! balance and account reads, broadcast with bounded retry, confirmation with
//! a hard timeout, and the recent-activity reads the copy-trade monitor needs.
//! Engines hold a trait object so tests can swap in a mock.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_client::GetConfirmedSignaturesForAddress2Config,
    rpc_config::{RpcSendTransactionConfig, RpcTransactionConfig},
};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use solana_transaction_status::{UiTransactionEncoding, UiTransactionTokenBalance};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::{debug, warn};

use crate::config::defaults;
use crate::error::{EngineError, Result};

/// A confirmed transaction seen on a watched address, reduced to what the
/// monitor classifies on.
#[derive(Debug, Clone)]
pub struct ObservedTx {
    pub signature: Signature,
    pub program_ids: Vec<Pubkey>,
    /// Lamport change of the watched address, post minus pre.
    pub sol_delta: i64,
    /// Base-unit change per mint for token accounts owned by the watched
    /// address.
    pub token_deltas: Vec<(Pubkey, i128)>,
    pub block_time: Option<i64>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn latest_blockhash(&self) -> Result<Hash>;
    async fn get_balance(&self, address: &Pubkey) -> Result<u64>;
    /// `Ok(None)` when the account does not exist.
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;
    /// Base-unit balance of a token account; 0 when the account is missing.
    async fn get_token_balance(&self, token_account: &Pubkey) -> Result<u64>;
    /// Broadcast with bounded retry, then wait for confirmation.
    async fn send_and_confirm(&self, tx: &VersionedTransaction) -> Result<Signature>;
    /// Most recent confirmed transactions touching `address`, newest first.
    async fn recent_transactions(&self, address: &Pubkey, limit: usize) -> Result<Vec<ObservedTx>>;
}

pub struct SolanaChainClient {
    rpc: Arc<RpcClient>,
    confirm_timeout: Duration,
}

impl SolanaChainClient {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self {
            rpc,
            confirm_timeout: Duration::from_millis(defaults::TX_CONFIRM_TIMEOUT_MS),
        }
    }

    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    async fn wait_for_confirmation(&self, signature: &Signature) -> Result<()> {
        let poll = async {
            loop {
                match self.rpc.get_signature_statuses(&[*signature]).await {
                    Ok(response) => {
                        if let Some(Some(status)) = response.value.first() {
                            if let Some(err) = &status.err {
                                return Err(EngineError::Network(format!(
                                    "transaction {signature} failed on chain: {err}"
                                )));
                            }
                            if status.satisfies_commitment(CommitmentConfig::confirmed()) {
                                return Ok(());
                            }
                        }
                    }
                    Err(e) => {
                        debug!(signature = %signature, error = %e, "status poll failed, retrying");
                    }
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        };

        match tokio::time::timeout(self.confirm_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Network(format!(
                "confirmation of {signature} timed out after {:?}",
                self.confirm_timeout
            ))),
        }
    }
}

#[async_trait]
impl ChainClient for SolanaChainClient {
    async fn latest_blockhash(&self) -> Result<Hash> {
        self.rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| EngineError::Network(format!("get_latest_blockhash: {e}")))
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        self.rpc
            .get_balance(address)
            .await
            .map_err(|e| EngineError::Network(format!("get_balance {address}: {e}")))
    }

    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let response = self
            .rpc
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await
            .map_err(|e| EngineError::Network(format!("get_account {address}: {e}")))?;
        Ok(response.value.map(|account| account.data))
    }

    async fn get_token_balance(&self, token_account: &Pubkey) -> Result<u64> {
        match self.rpc.get_token_account_balance(token_account).await {
            Ok(balance) => balance
                .amount
                .parse::<u64>()
                .map_err(|e| EngineError::Network(format!("unparseable token balance: {e}"))),
            Err(e) => {
                // Missing ATA reads as zero balance.
                debug!(token_account = %token_account, error = %e, "token balance unavailable");
                Ok(0)
            }
        }
    }

    async fn send_and_confirm(&self, tx: &VersionedTransaction) -> Result<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: Some(CommitmentLevel::Processed),
            max_retries: Some(0),
            ..Default::default()
        };
        let strategy = ExponentialBackoff::from_millis(defaults::TX_RETRY_DELAY_MS)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(defaults::TX_RETRY_COUNT);

        let signature = Retry::spawn(strategy, || async {
            self.rpc
                .send_transaction_with_config(tx, config.clone())
                .await
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "broadcast exhausted retries");
            EngineError::Network(format!("broadcast failed: {e}"))
        })?;

        self.wait_for_confirmation(&signature).await?;
        Ok(signature)
    }

    async fn recent_transactions(&self, address: &Pubkey, limit: usize) -> Result<Vec<ObservedTx>> {
        let config = GetConfirmedSignaturesForAddress2Config {
            limit: Some(limit),
            commitment: Some(CommitmentConfig::confirmed()),
            ..Default::default()
        };
        let entries = self
            .rpc
            .get_signatures_for_address_with_config(address, config)
            .await
            .map_err(|e| EngineError::Network(format!("signature lookup for {address}: {e}")))?;

        let tx_config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };

        let mut observed = Vec::new();
        for entry in entries.into_iter().filter(|e| e.err.is_none()) {
            let signature = match Signature::from_str(&entry.signature) {
                Ok(sig) => sig,
                Err(_) => continue,
            };
            let fetched = match self
                .rpc
                .get_transaction_with_config(&signature, tx_config.clone())
                .await
            {
                Ok(tx) => tx,
                Err(e) => {
                    debug!(signature = %signature, error = %e, "transaction fetch failed, skipping");
                    continue;
                }
            };

            let Some(decoded) = fetched.transaction.transaction.decode() else {
                continue;
            };
            let Some(meta) = fetched.transaction.meta else {
                continue;
            };

            let keys = decoded.message.static_account_keys().to_vec();
            let program_ids = decoded
                .message
                .instructions()
                .iter()
                .filter_map(|ix| keys.get(ix.program_id_index as usize).copied())
                .collect();

            let sol_delta = keys
                .iter()
                .position(|k| k == address)
                .and_then(|i| {
                    let pre = *meta.pre_balances.get(i)?;
                    let post = *meta.post_balances.get(i)?;
                    Some(post as i64 - pre as i64)
                })
                .unwrap_or(0);

            let pre_tokens: Option<Vec<UiTransactionTokenBalance>> =
                meta.pre_token_balances.clone().into();
            let post_tokens: Option<Vec<UiTransactionTokenBalance>> =
                meta.post_token_balances.clone().into();
            let token_deltas = owner_token_deltas(
                pre_tokens.as_deref().unwrap_or(&[]),
                post_tokens.as_deref().unwrap_or(&[]),
                address,
            );

            observed.push(ObservedTx {
                signature,
                program_ids,
                sol_delta,
                token_deltas,
                block_time: fetched.block_time,
            });
        }
        Ok(observed)
    }
}

/// Per-mint base-unit deltas for token accounts owned by `owner`.
fn owner_token_deltas(
    pre: &[UiTransactionTokenBalance],
    post: &[UiTransactionTokenBalance],
    owner: &Pubkey,
) -> Vec<(Pubkey, i128)> {
    let owner_str = owner.to_string();
    let mut deltas: HashMap<Pubkey, i128> = HashMap::new();

    let mut fold = |balances: &[UiTransactionTokenBalance], sign: i128| {
        for balance in balances {
            let owned = Option::<String>::from(balance.owner.clone())
                .is_some_and(|o| o == owner_str);
            if !owned {
                continue;
            }
            let Ok(mint) = Pubkey::from_str(&balance.mint) else {
                continue;
            };
            let Ok(amount) = balance.ui_token_amount.amount.parse::<i128>() else {
                continue;
            };
            *deltas.entry(mint).or_insert(0) += sign * amount;
        }
    };
    fold(pre, -1);
    fold(post, 1);

    deltas.into_iter().filter(|(_, d)| *d != 0).collect()
}
