//! AMM venue adapter over the Raydium trade API.
//!
//! Two-step delegation: a compute call resolves the pool route and amounts,
//! then the transaction endpoint assembles the swap against that route. The
//! decoded transaction goes through the safety validator before signing.

use async_trait::async_trait;
use serde_json::{json, Value};
use solana_sdk::{
    signature::Keypair, signer::Signer, transaction::VersionedTransaction,
};
use tracing::info;

use super::jupiter::{json_f64, json_u64};
use super::{decode_base64_transaction, AdapterContext, DexAdapter};
use crate::error::{EngineError, Result};
use crate::types::{SwapExecution, SwapParams, SwapQuote};
use crate::validator::validate_swap_transaction;

pub const RAYDIUM_COMPUTE_URL: &str =
    "https://transaction-v1.raydium.io/compute/swap-base-in";
pub const RAYDIUM_TRANSACTION_URL: &str =
    "https://transaction-v1.raydium.io/transaction/swap-base-in";

pub struct RaydiumAdapter {
    ctx: AdapterContext,
}

impl RaydiumAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    /// Pool lookup + amount computation. The full response is passed back
    /// verbatim to the transaction endpoint.
    async fn fetch_compute(&self, params: &SwapParams) -> Result<Value> {
        let response = self
            .ctx
            .http
            .get(RAYDIUM_COMPUTE_URL)
            .query(&[
                ("inputMint", params.input_mint.to_string()),
                ("outputMint", params.output_mint.to_string()),
                ("amount", params.amount.to_string()),
                ("slippageBps", params.slippage_bps.to_string()),
                ("txVersion", "V0".to_string()),
            ])
            .send()
            .await
            .map_err(|e| EngineError::Network(format!("raydium compute request: {e}")))?;

        if !response.status().is_success() {
            return Err(EngineError::Network(format!(
                "raydium compute returned {}",
                response.status()
            )));
        }
        let payload = response
            .json::<Value>()
            .await
            .map_err(|e| EngineError::Network(format!("raydium compute body: {e}")))?;

        if !payload.get("success").and_then(Value::as_bool).unwrap_or(false) {
            // No route usually means no pool for the pair.
            let msg = payload
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("no route");
            return Err(EngineError::ProtocolState(format!(
                "raydium has no route for {} -> {}: {msg}",
                params.input_mint, params.output_mint
            )));
        }
        Ok(payload)
    }

    fn quote_from_compute(&self, params: &SwapParams, payload: &Value) -> Result<SwapQuote> {
        let data = payload
            .get("data")
            .ok_or_else(|| EngineError::Network("raydium compute response missing data".into()))?;
        Ok(SwapQuote {
            input_mint: params.input_mint,
            output_mint: params.output_mint,
            in_amount: json_u64(data, "inputAmount")?,
            out_amount: json_u64(data, "outputAmount")?,
            price_impact_pct: json_f64(data, "priceImpactPct").unwrap_or(0.0),
            dex: self.name(),
        })
    }

    async fn fetch_swap_transaction(
        &self,
        params: &SwapParams,
        compute: &Value,
    ) -> Result<VersionedTransaction> {
        let body = json!({
            "swapResponse": compute,
            "txVersion": "V0",
            "wallet": params.payer.to_string(),
            "wrapSol": true,
            "unwrapSol": true,
            "computeUnitPriceMicroLamports": self.ctx.priority_fee_micro_lamports.to_string(),
        });

        let response = self
            .ctx
            .http
            .post(RAYDIUM_TRANSACTION_URL)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Network(format!("raydium transaction request: {e}")))?;

        if !response.status().is_success() {
            return Err(EngineError::Network(format!(
                "raydium transaction returned {}",
                response.status()
            )));
        }
        let payload = response
            .json::<Value>()
            .await
            .map_err(|e| EngineError::Network(format!("raydium transaction body: {e}")))?;

        let encoded = payload
            .get("data")
            .and_then(Value::as_array)
            .and_then(|txs| txs.first())
            .and_then(|tx| tx.get("transaction"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::Network("raydium transaction response missing transaction".into())
            })?;

        decode_base64_transaction(encoded)
    }
}

#[async_trait]
impl DexAdapter for RaydiumAdapter {
    fn name(&self) -> &'static str {
        "raydium"
    }

    async fn quote(&self, params: &SwapParams) -> Result<SwapQuote> {
        let compute = self.fetch_compute(params).await?;
        self.quote_from_compute(params, &compute)
    }

    async fn build_swap_transaction(&self, params: &SwapParams) -> Result<VersionedTransaction> {
        let compute = self.fetch_compute(params).await?;
        let tx = self.fetch_swap_transaction(params, &compute).await?;
        validate_swap_transaction(&tx, &params.payer, self.name())?;
        Ok(tx)
    }

    async fn execute_swap(&self, params: &SwapParams, signer: &Keypair) -> Result<SwapExecution> {
        let compute = self.fetch_compute(params).await?;
        let quote = self.quote_from_compute(params, &compute)?;
        let unsigned = self.fetch_swap_transaction(params, &compute).await?;

        validate_swap_transaction(&unsigned, &signer.pubkey(), self.name())?;

        let signed = VersionedTransaction::try_new(unsigned.message, &[signer])
            .map_err(|e| EngineError::Config(format!("signing failed: {e}")))?;
        let signature = self.ctx.chain.send_and_confirm(&signed).await?;
        info!(wallet = %signer.pubkey(), signature = %signature, "amm swap confirmed");

        Ok(SwapExecution {
            signature,
            in_amount: quote.in_amount,
            out_amount: quote.out_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;

    #[test]
    fn compute_payload_maps_to_quote() {
        let adapter = quote_mapper();
        let params = SwapParams {
            input_mint: spl_token::native_mint::id(),
            output_mint: Pubkey::new_unique(),
            amount: 1_000_000,
            slippage_bps: 300,
            payer: Pubkey::new_unique(),
        };
        let payload = json!({
            "success": true,
            "data": {
                "inputAmount": "1000000",
                "outputAmount": "987654",
                "priceImpactPct": 0.12,
            }
        });
        let quote = adapter.quote_from_compute(&params, &payload).unwrap();
        assert_eq!(quote.in_amount, 1_000_000);
        assert_eq!(quote.out_amount, 987_654);
        assert_eq!(quote.dex, "raydium");
    }

    fn quote_mapper() -> RaydiumAdapter {
        use std::sync::Arc;

        use crate::wallet::test_support::{StaticChainClient, TaggedCipher};
        use crate::wallet::MemorySettingsStore;

        RaydiumAdapter::new(AdapterContext {
            chain: Arc::new(StaticChainClient::default()),
            settings: Arc::new(MemorySettingsStore::default()),
            cipher: Arc::new(TaggedCipher),
            http: reqwest::Client::new(),
            priority_fee_micro_lamports: 0,
            compute_unit_limit: 200_000,
        })
    }
}
