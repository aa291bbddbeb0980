//! Venue abstraction.
//!
//! Every supported venue implements [`DexAdapter`]: freshly quote, build an
//! unsigned transaction, or run the full quote -> build -> validate -> sign ->
//! broadcast -> confirm pipeline for one wallet. The set of venues is the
//! closed [`DexKind`] enum; call sites resolve adapters through
//! [`adapter_for`], never by string.

pub mod curve;
pub mod jupiter;
pub mod pumpfun;
pub mod raydium;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Keypair, transaction::VersionedTransaction};

use crate::error::{EngineError, Result};
use crate::rpc::ChainClient;
use crate::types::{SwapExecution, SwapParams, SwapQuote};
use crate::wallet::{SecretCipher, SettingsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DexKind {
    Jupiter,
    Raydium,
    PumpFun,
}

impl DexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DexKind::Jupiter => "jupiter",
            DexKind::Raydium => "raydium",
            DexKind::PumpFun => "pumpfun",
        }
    }
}

/// Parsing exists for the external command boundary only.
impl FromStr for DexKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jupiter" => Ok(DexKind::Jupiter),
            "raydium" => Ok(DexKind::Raydium),
            "pumpfun" | "pump.fun" => Ok(DexKind::PumpFun),
            other => Err(EngineError::Config(format!("unknown dex '{other}'"))),
        }
    }
}

#[async_trait]
pub trait DexAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compute a fresh quote. Never cached.
    async fn quote(&self, params: &SwapParams) -> Result<SwapQuote>;

    /// Build the unsigned swap transaction for `params`, starting from a
    /// fresh quote.
    async fn build_swap_transaction(&self, params: &SwapParams) -> Result<VersionedTransaction>;

    /// Full pipeline for one wallet: quote, build, validate, sign,
    /// broadcast with retry, confirm.
    async fn execute_swap(&self, params: &SwapParams, signer: &Keypair) -> Result<SwapExecution>;
}

/// Shared wiring handed to adapter constructors.
#[derive(Clone)]
pub struct AdapterContext {
    pub chain: Arc<dyn ChainClient>,
    pub settings: Arc<dyn SettingsStore>,
    pub cipher: Arc<dyn SecretCipher>,
    pub http: reqwest::Client,
    pub priority_fee_micro_lamports: u64,
    pub compute_unit_limit: u32,
}

pub fn adapter_for(kind: DexKind, ctx: AdapterContext) -> Arc<dyn DexAdapter> {
    match kind {
        DexKind::Jupiter => Arc::new(jupiter::JupiterAdapter::new(ctx)),
        DexKind::Raydium => Arc::new(raydium::RaydiumAdapter::new(ctx)),
        DexKind::PumpFun => Arc::new(pumpfun::PumpFunAdapter::new(ctx)),
    }
}

pub fn is_native_mint(mint: &Pubkey) -> bool {
    *mint == spl_token::native_mint::id()
}

/// Decode a transaction returned by an external routing service.
pub(crate) fn decode_base64_transaction(encoded: &str) -> Result<VersionedTransaction> {
    use base64::Engine as _;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| EngineError::Network(format!("swap transaction is not valid base64: {e}")))?;
    bincode::deserialize(&bytes)
        .map_err(|e| EngineError::Network(format!("swap transaction bytes are malformed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dex_kind_round_trips_through_strings() {
        for kind in [DexKind::Jupiter, DexKind::Raydium, DexKind::PumpFun] {
            assert_eq!(DexKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert_eq!(DexKind::from_str("Pump.Fun").unwrap(), DexKind::PumpFun);
        assert!(DexKind::from_str("uniswap").is_err());
    }
}
