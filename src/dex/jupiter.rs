//! Aggregator venue adapter over the Jupiter v6 HTTP API.
//!
//! Quote and transaction construction are delegated to the service; the
//! returned transaction is decoded, put through the safety validator and
//! only then signed locally. The API credential is stored encrypted in
//! settings; records written before encryption existed fall back to
//! plaintext with an audit log line.

use async_trait::async_trait;
use serde_json::{json, Value};
use solana_sdk::{
    signature::Keypair, signer::Signer, transaction::VersionedTransaction,
};
use tracing::{info, warn};

use super::{decode_base64_transaction, AdapterContext, DexAdapter};
use crate::error::{EngineError, Result};
use crate::types::{SwapExecution, SwapParams, SwapQuote};
use crate::validator::validate_swap_transaction;

pub const JUPITER_QUOTE_URL: &str = "https://quote-api.jup.ag/v6/quote";
pub const JUPITER_SWAP_URL: &str = "https://quote-api.jup.ag/v6/swap";

/// Settings key holding the encrypted API credential.
pub const JUPITER_API_KEY_SETTING: &str = "jupiter_api_key";

pub struct JupiterAdapter {
    ctx: AdapterContext,
}

impl JupiterAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    fn resolve_api_key(&self) -> Result<String> {
        let stored = self.ctx.settings.get(JUPITER_API_KEY_SETTING).ok_or_else(|| {
            EngineError::Config(format!("setting '{JUPITER_API_KEY_SETTING}' is not configured"))
        })?;
        match self.ctx.cipher.decrypt(&stored) {
            Ok(key) => Ok(key),
            Err(_) => {
                warn!(setting = JUPITER_API_KEY_SETTING, legacy = true,
                    "credential stored as legacy plaintext, re-save to encrypt");
                Ok(stored)
            }
        }
    }

    async fn fetch_quote_raw(&self, params: &SwapParams) -> Result<Value> {
        let api_key = self.resolve_api_key()?;
        let response = self
            .ctx
            .http
            .get(JUPITER_QUOTE_URL)
            .header("x-api-key", api_key)
            .query(&[
                ("inputMint", params.input_mint.to_string()),
                ("outputMint", params.output_mint.to_string()),
                ("amount", params.amount.to_string()),
                ("slippageBps", params.slippage_bps.to_string()),
            ])
            .send()
            .await
            .map_err(|e| EngineError::Network(format!("jupiter quote request: {e}")))?;

        if !response.status().is_success() {
            return Err(EngineError::Network(format!(
                "jupiter quote returned {}",
                response.status()
            )));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| EngineError::Network(format!("jupiter quote body: {e}")))
    }

    fn quote_from_raw(&self, params: &SwapParams, raw: &Value) -> Result<SwapQuote> {
        Ok(SwapQuote {
            input_mint: params.input_mint,
            output_mint: params.output_mint,
            in_amount: json_u64(raw, "inAmount")?,
            out_amount: json_u64(raw, "outAmount")?,
            price_impact_pct: json_f64(raw, "priceImpactPct").unwrap_or(0.0),
            dex: self.name(),
        })
    }

    async fn fetch_swap_transaction(
        &self,
        params: &SwapParams,
        raw_quote: &Value,
    ) -> Result<VersionedTransaction> {
        let api_key = self.resolve_api_key()?;
        let mut body = json!({
            "quoteResponse": raw_quote,
            "userPublicKey": params.payer.to_string(),
            "wrapAndUnwrapSol": true,
        });
        if self.ctx.priority_fee_micro_lamports > 0 {
            body["computeUnitPriceMicroLamports"] =
                Value::from(self.ctx.priority_fee_micro_lamports);
        }

        let response = self
            .ctx
            .http
            .post(JUPITER_SWAP_URL)
            .header("x-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Network(format!("jupiter swap request: {e}")))?;

        if !response.status().is_success() {
            return Err(EngineError::Network(format!(
                "jupiter swap returned {}",
                response.status()
            )));
        }
        let payload = response
            .json::<Value>()
            .await
            .map_err(|e| EngineError::Network(format!("jupiter swap body: {e}")))?;
        let encoded = payload
            .get("swapTransaction")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Network("jupiter swap response missing transaction".into()))?;

        decode_base64_transaction(encoded)
    }
}

#[async_trait]
impl DexAdapter for JupiterAdapter {
    fn name(&self) -> &'static str {
        "jupiter"
    }

    async fn quote(&self, params: &SwapParams) -> Result<SwapQuote> {
        let raw = self.fetch_quote_raw(params).await?;
        self.quote_from_raw(params, &raw)
    }

    async fn build_swap_transaction(&self, params: &SwapParams) -> Result<VersionedTransaction> {
        let raw = self.fetch_quote_raw(params).await?;
        let tx = self.fetch_swap_transaction(params, &raw).await?;
        validate_swap_transaction(&tx, &params.payer, self.name())?;
        Ok(tx)
    }

    async fn execute_swap(&self, params: &SwapParams, signer: &Keypair) -> Result<SwapExecution> {
        let raw = self.fetch_quote_raw(params).await?;
        let quote = self.quote_from_raw(params, &raw)?;
        let unsigned = self.fetch_swap_transaction(params, &raw).await?;

        validate_swap_transaction(&unsigned, &signer.pubkey(), self.name())?;

        let signed = VersionedTransaction::try_new(unsigned.message, &[signer])
            .map_err(|e| EngineError::Config(format!("signing failed: {e}")))?;
        let signature = self.ctx.chain.send_and_confirm(&signed).await?;
        info!(wallet = %signer.pubkey(), signature = %signature, "aggregator swap confirmed");

        Ok(SwapExecution {
            signature,
            in_amount: quote.in_amount,
            out_amount: quote.out_amount,
        })
    }
}

/// The API serializes amounts as decimal strings; tolerate plain numbers too.
pub(crate) fn json_u64(value: &Value, key: &str) -> Result<u64> {
    let field = value
        .get(key)
        .ok_or_else(|| EngineError::Network(format!("response missing field '{key}'")))?;
    match field {
        Value::String(s) => s
            .parse::<u64>()
            .map_err(|e| EngineError::Network(format!("field '{key}' unparseable: {e}"))),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| EngineError::Network(format!("field '{key}' is not a u64"))),
        _ => Err(EngineError::Network(format!("field '{key}' has wrong type"))),
    }
}

pub(crate) fn json_f64(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_fields_accept_strings_and_numbers() {
        let raw = json!({
            "inAmount": "1000000000",
            "outAmount": 42u64,
            "priceImpactPct": "0.031",
        });
        assert_eq!(json_u64(&raw, "inAmount").unwrap(), 1_000_000_000);
        assert_eq!(json_u64(&raw, "outAmount").unwrap(), 42);
        assert_eq!(json_f64(&raw, "priceImpactPct"), Some(0.031));
        assert!(json_u64(&raw, "missing").is_err());
    }

    #[test]
    fn malformed_base64_transaction_is_a_network_error() {
        let err = decode_base64_transaction("@@@not-base64@@@").unwrap_err();
        assert!(matches!(err, EngineError::Network(_)));
    }
}
