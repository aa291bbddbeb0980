//! Self-contained bonding-curve venue adapter.
//!
//! No external routing service: curve state is read straight from the
//! chain, quotes come from the constant-product math in [`curve`], and the
//! buy/sell instructions are assembled raw with the program's fixed
//! discriminators and order-significant account lists.

use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::{AccountMeta, Instruction},
    message::{v0::Message as MessageV0, VersionedMessage},
    pubkey,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    system_program,
    transaction::VersionedTransaction,
};
use spl_associated_token_account::get_associated_token_address;
use tracing::{debug, info};

use super::{curve::CurveState, is_native_mint, AdapterContext, DexAdapter};
use crate::dex::curve;
use crate::error::{EngineError, Result};
use crate::types::{SwapExecution, SwapParams, SwapQuote};
use crate::validator::validate_swap_transaction;

use async_trait::async_trait;

pub const PUMP_FUN_PROGRAM: Pubkey = pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
pub const PUMP_FUN_GLOBAL: Pubkey = pubkey!("4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf");
pub const PUMP_FUN_FEE_RECIPIENT: Pubkey = pubkey!("62qc2CNXwrYqQScmEdiZFFAnJR262PxWEuNQtxfafNgV");
pub const PUMP_FUN_EVENT_AUTHORITY: Pubkey = pubkey!("Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxXp9F1");
pub const PUMP_FUN_FEE_PROGRAM: Pubkey = pubkey!("pfeeUxB6jkeY1Hxd7CsFCAjcbHA9rWtchMGdZ6VojVZ");

/// Protocol fee in basis points (0.95%).
pub const PUMP_FUN_FEE_BASIS_POINTS: u64 = 95;

/// SHA-256("global:buy")[..8]
pub const BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
/// SHA-256("global:sell")[..8]
pub const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

pub fn bonding_curve_pda(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"bonding-curve", mint.as_ref()], &PUMP_FUN_PROGRAM).0
}

pub fn creator_vault_pda(creator: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"creator-vault", creator.as_ref()], &PUMP_FUN_PROGRAM).0
}

pub fn global_volume_accumulator_pda() -> Pubkey {
    Pubkey::find_program_address(&[b"global_volume_accumulator"], &PUMP_FUN_PROGRAM).0
}

pub fn user_volume_accumulator_pda(user: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"user_volume_accumulator", user.as_ref()], &PUMP_FUN_PROGRAM).0
}

/// Fee config lives under the separate fee program, seeded with the trading
/// program's id.
pub fn fee_config_pda() -> Pubkey {
    Pubkey::find_program_address(
        &[b"fee_config", PUMP_FUN_PROGRAM.as_ref()],
        &PUMP_FUN_FEE_PROGRAM,
    )
    .0
}

/// data: discriminator + token amount out + max SOL cost + track_volume flag.
pub fn buy_instruction(
    user: &Pubkey,
    mint: &Pubkey,
    creator: &Pubkey,
    token_amount_out: u64,
    max_sol_cost: u64,
) -> Instruction {
    let bonding_curve = bonding_curve_pda(mint);

    let mut data = Vec::with_capacity(25);
    data.extend_from_slice(&BUY_DISCRIMINATOR);
    data.extend_from_slice(&token_amount_out.to_le_bytes());
    data.extend_from_slice(&max_sol_cost.to_le_bytes());
    data.push(0); // track_volume

    Instruction {
        program_id: PUMP_FUN_PROGRAM,
        accounts: vec![
            AccountMeta::new_readonly(PUMP_FUN_GLOBAL, false),
            AccountMeta::new(PUMP_FUN_FEE_RECIPIENT, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(bonding_curve, false),
            AccountMeta::new(get_associated_token_address(&bonding_curve, mint), false),
            AccountMeta::new(get_associated_token_address(user, mint), false),
            AccountMeta::new(*user, true),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new(creator_vault_pda(creator), false),
            AccountMeta::new_readonly(PUMP_FUN_EVENT_AUTHORITY, false),
            AccountMeta::new_readonly(PUMP_FUN_PROGRAM, false),
            AccountMeta::new_readonly(global_volume_accumulator_pda(), false),
            AccountMeta::new(user_volume_accumulator_pda(user), false),
            AccountMeta::new_readonly(fee_config_pda(), false),
            AccountMeta::new_readonly(PUMP_FUN_FEE_PROGRAM, false),
        ],
        data,
    }
}

/// data: discriminator + token amount in + min SOL out.
pub fn sell_instruction(
    user: &Pubkey,
    mint: &Pubkey,
    creator: &Pubkey,
    token_amount_in: u64,
    min_sol_out: u64,
) -> Instruction {
    let bonding_curve = bonding_curve_pda(mint);

    let mut data = Vec::with_capacity(24);
    data.extend_from_slice(&SELL_DISCRIMINATOR);
    data.extend_from_slice(&token_amount_in.to_le_bytes());
    data.extend_from_slice(&min_sol_out.to_le_bytes());

    Instruction {
        program_id: PUMP_FUN_PROGRAM,
        accounts: vec![
            AccountMeta::new_readonly(PUMP_FUN_GLOBAL, false),
            AccountMeta::new(PUMP_FUN_FEE_RECIPIENT, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(bonding_curve, false),
            AccountMeta::new(get_associated_token_address(&bonding_curve, mint), false),
            AccountMeta::new(get_associated_token_address(user, mint), false),
            AccountMeta::new(*user, true),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new(creator_vault_pda(creator), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(PUMP_FUN_EVENT_AUTHORITY, false),
            AccountMeta::new_readonly(PUMP_FUN_PROGRAM, false),
            AccountMeta::new_readonly(fee_config_pda(), false),
            AccountMeta::new_readonly(PUMP_FUN_FEE_PROGRAM, false),
        ],
        data,
    }
}

fn apply_slippage_down(amount: u64, slippage_bps: u16) -> u64 {
    (amount as u128 * (10_000 - slippage_bps as u128) / 10_000) as u64
}

pub struct PumpFunAdapter {
    ctx: AdapterContext,
}

impl PumpFunAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    /// Parse fresh curve state. A set completion flag means the token
    /// graduated to an external pool; that is terminal for this venue.
    async fn fetch_curve_state(&self, mint: &Pubkey) -> Result<CurveState> {
        let pda = bonding_curve_pda(mint);
        let data = self.ctx.chain.get_account_data(&pda).await?.ok_or_else(|| {
            EngineError::ProtocolState(format!("no bonding curve account for mint {mint}"))
        })?;
        let state = CurveState::parse(&data)?;
        if state.complete {
            return Err(EngineError::ProtocolState(format!(
                "bonding curve for {mint} is complete; token graduated"
            )));
        }
        Ok(state)
    }

    fn token_mint(params: &SwapParams) -> Result<(Pubkey, bool)> {
        if is_native_mint(&params.input_mint) {
            Ok((params.output_mint, true))
        } else if is_native_mint(&params.output_mint) {
            Ok((params.input_mint, false))
        } else {
            Err(EngineError::Config(
                "bonding curve swaps must have native SOL on one side".into(),
            ))
        }
    }

    fn compute_budget_instructions(&self) -> Vec<Instruction> {
        let mut ixs = vec![ComputeBudgetInstruction::set_compute_unit_limit(
            self.ctx.compute_unit_limit,
        )];
        if self.ctx.priority_fee_micro_lamports > 0 {
            ixs.push(ComputeBudgetInstruction::set_compute_unit_price(
                self.ctx.priority_fee_micro_lamports,
            ));
        }
        ixs
    }

    async fn build_unsigned(
        &self,
        params: &SwapParams,
        quote: &SwapQuote,
        state: &CurveState,
    ) -> Result<VersionedTransaction> {
        let (mint, is_buy) = Self::token_mint(params)?;
        let mut instructions = self.compute_budget_instructions();

        if is_buy {
            let user_ata = get_associated_token_address(&params.payer, &mint);
            if self.ctx.chain.get_account_data(&user_ata).await?.is_none() {
                debug!(mint = %mint, wallet = %params.payer, "prepending ATA create");
                instructions.push(
                    spl_associated_token_account::instruction::create_associated_token_account(
                        &params.payer,
                        &params.payer,
                        &mint,
                        &spl_token::id(),
                    ),
                );
            }
            let min_tokens_out = apply_slippage_down(quote.out_amount, params.slippage_bps);
            instructions.push(buy_instruction(
                &params.payer,
                &mint,
                &state.creator,
                min_tokens_out,
                params.amount,
            ));
        } else {
            let min_sol_out = apply_slippage_down(quote.out_amount, params.slippage_bps);
            instructions.push(sell_instruction(
                &params.payer,
                &mint,
                &state.creator,
                params.amount,
                min_sol_out,
            ));
        }

        let blockhash = self.ctx.chain.latest_blockhash().await?;
        let message = MessageV0::try_compile(&params.payer, &instructions, &[], blockhash)
            .map_err(|e| EngineError::Config(format!("message compile failed: {e}")))?;
        let message = VersionedMessage::V0(message);
        let num_signatures = message.header().num_required_signatures as usize;
        Ok(VersionedTransaction {
            signatures: vec![Signature::default(); num_signatures],
            message,
        })
    }
}

#[async_trait]
impl DexAdapter for PumpFunAdapter {
    fn name(&self) -> &'static str {
        "pumpfun"
    }

    async fn quote(&self, params: &SwapParams) -> Result<SwapQuote> {
        let (mint, is_buy) = Self::token_mint(params)?;
        let state = self.fetch_curve_state(&mint).await?;

        let out_amount = if is_buy {
            let fee = curve::fee_amount(params.amount, PUMP_FUN_FEE_BASIS_POINTS);
            state.buy_quote(params.amount.saturating_sub(fee))
        } else {
            let gross = state.sell_quote(params.amount);
            gross.saturating_sub(curve::fee_amount(gross, PUMP_FUN_FEE_BASIS_POINTS))
        };

        let price_impact_pct = if is_buy {
            state.buy_price_impact_pct(params.amount)
        } else {
            state.buy_price_impact_pct(state.sell_quote(params.amount))
        };

        Ok(SwapQuote {
            input_mint: params.input_mint,
            output_mint: params.output_mint,
            in_amount: params.amount,
            out_amount,
            price_impact_pct,
            dex: self.name(),
        })
    }

    async fn build_swap_transaction(&self, params: &SwapParams) -> Result<VersionedTransaction> {
        let (mint, _) = Self::token_mint(params)?;
        let state = self.fetch_curve_state(&mint).await?;
        let quote = self.quote(params).await?;
        let tx = self.build_unsigned(params, &quote, &state).await?;
        validate_swap_transaction(&tx, &params.payer, self.name())?;
        Ok(tx)
    }

    async fn execute_swap(&self, params: &SwapParams, signer: &Keypair) -> Result<SwapExecution> {
        let (mint, _) = Self::token_mint(params)?;
        let state = self.fetch_curve_state(&mint).await?;
        let quote = self.quote(params).await?;
        let unsigned = self.build_unsigned(params, &quote, &state).await?;

        validate_swap_transaction(&unsigned, &signer.pubkey(), self.name())?;

        let signed = VersionedTransaction::try_new(unsigned.message, &[signer])
            .map_err(|e| EngineError::Config(format!("signing failed: {e}")))?;
        let signature = self.ctx.chain.send_and_confirm(&signed).await?;
        info!(mint = %mint, wallet = %signer.pubkey(), signature = %signature, "curve swap confirmed");

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

    #[test]
    fn pdas_are_deterministic_and_mint_scoped() {
        let mint_a = Pubkey::new_unique();
        let mint_b = Pubkey::new_unique();
        assert_eq!(bonding_curve_pda(&mint_a), bonding_curve_pda(&mint_a));
        assert_ne!(bonding_curve_pda(&mint_a), bonding_curve_pda(&mint_b));
        assert_eq!(global_volume_accumulator_pda(), global_volume_accumulator_pda());
    }

    #[test]
    fn buy_instruction_layout() {
        let user = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let creator = Pubkey::new_unique();
        let ix = buy_instruction(&user, &mint, &creator, 123_456, 789_000);

        assert_eq!(ix.program_id, PUMP_FUN_PROGRAM);
        assert_eq!(ix.accounts.len(), 16);
        assert_eq!(ix.data.len(), 25);
        assert_eq!(&ix.data[0..8], &BUY_DISCRIMINATOR);
        assert_eq!(u64::from_le_bytes(ix.data[8..16].try_into().unwrap()), 123_456);
        assert_eq!(u64::from_le_bytes(ix.data[16..24].try_into().unwrap()), 789_000);
        assert_eq!(ix.data[24], 0);

        // The user is the seventh account and the only signer.
        assert_eq!(ix.accounts[6].pubkey, user);
        assert!(ix.accounts[6].is_signer);
        assert_eq!(ix.accounts.iter().filter(|a| a.is_signer).count(), 1);
        assert_eq!(ix.accounts[15].pubkey, PUMP_FUN_FEE_PROGRAM);

        // Only the user volume accumulator is written; the global one is
        // read-only.
        assert_eq!(ix.accounts[12].pubkey, global_volume_accumulator_pda());
        assert!(!ix.accounts[12].is_writable);
        assert_eq!(ix.accounts[13].pubkey, user_volume_accumulator_pda(&user));
        assert!(ix.accounts[13].is_writable);
    }

    #[test]
    fn sell_instruction_layout() {
        let user = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let creator = Pubkey::new_unique();
        let ix = sell_instruction(&user, &mint, &creator, 555, 111);

        assert_eq!(ix.accounts.len(), 14);
        assert_eq!(ix.data.len(), 24);
        assert_eq!(&ix.data[0..8], &SELL_DISCRIMINATOR);
        assert_eq!(u64::from_le_bytes(ix.data[8..16].try_into().unwrap()), 555);
        assert_eq!(u64::from_le_bytes(ix.data[16..24].try_into().unwrap()), 111);

        // Sell puts the creator vault before the token program.
        assert_eq!(ix.accounts[8].pubkey, creator_vault_pda(&creator));
        assert_eq!(ix.accounts[9].pubkey, spl_token::id());
    }

    #[test]
    fn slippage_floor_never_rounds_up() {
        assert_eq!(apply_slippage_down(10_000, 300), 9_700);
        assert_eq!(apply_slippage_down(3, 300), 2);
        assert_eq!(apply_slippage_down(0, 300), 0);
    }
}
