//! Pre-signing safety checks for swap transactions.
//!
//! Every transaction an adapter produces passes through here before it is
//! signed, including ones fetched from external routing services. The checks
//! are pure: fee payer must be the expected wallet, every instruction must
//! target an allow-listed program, and any native transfer out of the wallet
//! to an unrecognized destination must stay below the materiality threshold.

use solana_sdk::{
    native_token::LAMPORTS_PER_SOL, pubkey, pubkey::Pubkey, system_program,
    transaction::VersionedTransaction,
};
use tracing::warn;

use crate::error::{EngineError, Result};

/// Programs a swap transaction is allowed to invoke.
pub const ALLOWED_PROGRAM_IDS: &[Pubkey] = &[
    // Jupiter v6 / v4
    pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4"),
    pubkey!("JUP4Fb2cqiRUcaTHdrPC8h2gNsA2ETXiPDD33WcGuJB"),
    // Orca Whirlpools
    pubkey!("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc"),
    // Raydium CLMM / AMM v4 / route / stable-swap
    pubkey!("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK"),
    pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8"),
    pubkey!("routeUGWgWzqBWFcrCfv8tritsqukccJPu3q5GPP3xS"),
    pubkey!("5quBtoiQqxF9Jv6KYKctB59NT3gtJD2Y65kdnB1Uev3h"),
    // Serum / OpenBook v2
    pubkey!("srmqPvymJeFKQ4zGQed1GFppgkRHL9kaELCbyksJtPX"),
    pubkey!("opnb2LAfJYbRMAHHvqjCwQxanZn7ReEHp1k81EQMQa8"),
    // Pump.fun
    pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P"),
    // SPL Token / Associated Token / Compute Budget / System
    pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"),
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL"),
    pubkey!("ComputeBudget111111111111111111111111111111"),
    pubkey!("11111111111111111111111111111111"),
];

/// Native transfers above this to an unrecognized destination are fatal.
pub const MAX_UNKNOWN_TRANSFER_LAMPORTS: u64 = LAMPORTS_PER_SOL;

const SYSTEM_TRANSFER_TAG: u32 = 2;

pub fn validate_swap_transaction(
    tx: &VersionedTransaction,
    expected_fee_payer: &Pubkey,
    label: &str,
) -> Result<()> {
    let keys = tx.message.static_account_keys();

    let fee_payer = keys
        .first()
        .ok_or_else(|| EngineError::Validation(format!("{label}: transaction has no accounts")))?;
    if fee_payer != expected_fee_payer {
        warn!(dex = label, fee_payer = %fee_payer, expected = %expected_fee_payer,
            "rejected transaction with foreign fee payer");
        return Err(EngineError::Validation(format!(
            "{label}: fee payer {fee_payer} is not the signing wallet {expected_fee_payer}"
        )));
    }

    for ix in tx.message.instructions() {
        let program_id = keys.get(ix.program_id_index as usize).ok_or_else(|| {
            EngineError::Validation(format!("{label}: instruction program index out of range"))
        })?;
        if !ALLOWED_PROGRAM_IDS.contains(program_id) {
            warn!(dex = label, program = %program_id, "rejected transaction touching unknown program");
            return Err(EngineError::Validation(format!(
                "{label}: program {program_id} is not allow-listed"
            )));
        }

        if *program_id == system_program::id() {
            check_native_transfer(ix.data.as_slice(), &ix.accounts, keys, expected_fee_payer, label)?;
        }
    }

    Ok(())
}

/// System-program transfer out of the signing wallet to a destination we do
/// not recognize: fine below the threshold (tips, wrapping), fatal above it.
fn check_native_transfer(
    data: &[u8],
    account_indexes: &[u8],
    keys: &[Pubkey],
    expected_fee_payer: &Pubkey,
    label: &str,
) -> Result<()> {
    if data.len() < 12 || account_indexes.len() < 2 {
        return Ok(());
    }
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&data[0..4]);
    if u32::from_le_bytes(tag) != SYSTEM_TRANSFER_TAG {
        return Ok(());
    }

    let (from, to) = match (
        keys.get(account_indexes[0] as usize),
        keys.get(account_indexes[1] as usize),
    ) {
        (Some(from), Some(to)) => (from, to),
        _ => return Ok(()),
    };
    if from != expected_fee_payer || ALLOWED_PROGRAM_IDS.contains(to) {
        return Ok(());
    }

    let mut amount = [0u8; 8];
    amount.copy_from_slice(&data[4..12]);
    let lamports = u64::from_le_bytes(amount);
    if lamports > MAX_UNKNOWN_TRANSFER_LAMPORTS {
        warn!(dex = label, destination = %to, lamports, "rejected oversized transfer to unknown destination");
        return Err(EngineError::Validation(format!(
            "{label}: transfer of {lamports} lamports to unrecognized destination {to}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        instruction::{AccountMeta, Instruction},
        message::Message,
        system_instruction,
        transaction::Transaction,
    };

    fn tx_with_instructions(payer: &Pubkey, ixs: &[Instruction]) -> VersionedTransaction {
        let message = Message::new(ixs, Some(payer));
        VersionedTransaction::from(Transaction::new_unsigned(message))
    }

    #[test]
    fn accepts_transfer_from_wallet_below_threshold() {
        let wallet = Pubkey::new_unique();
        let stranger = Pubkey::new_unique();
        let tx = tx_with_instructions(
            &wallet,
            &[system_instruction::transfer(&wallet, &stranger, LAMPORTS_PER_SOL / 2)],
        );
        assert!(validate_swap_transaction(&tx, &wallet, "test").is_ok());
    }

    #[test]
    fn rejects_oversized_transfer_to_unknown_destination() {
        let wallet = Pubkey::new_unique();
        let stranger = Pubkey::new_unique();
        let tx = tx_with_instructions(
            &wallet,
            &[system_instruction::transfer(&wallet, &stranger, 2 * LAMPORTS_PER_SOL)],
        );
        let err = validate_swap_transaction(&tx, &wallet, "test").unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn rejects_foreign_fee_payer() {
        let wallet = Pubkey::new_unique();
        let other = Pubkey::new_unique();
        let tx = tx_with_instructions(
            &other,
            &[system_instruction::transfer(&other, &wallet, 1_000)],
        );
        assert!(validate_swap_transaction(&tx, &wallet, "test").is_err());
    }

    #[test]
    fn rejects_unknown_program() {
        let wallet = Pubkey::new_unique();
        let rogue_program = Pubkey::new_unique();
        let ix = Instruction::new_with_bytes(
            rogue_program,
            &[0u8; 4],
            vec![AccountMeta::new(wallet, true)],
        );
        let tx = tx_with_instructions(&wallet, &[ix]);
        let err = validate_swap_transaction(&tx, &wallet, "test").unwrap_err();
        assert!(err.to_string().contains(&rogue_program.to_string()));
    }

    #[test]
    fn transfer_between_wallet_and_known_program_is_fine() {
        // Wrapping SOL moves lamports to the token program's ATA space via
        // system transfer to an allow-listed account.
        let wallet = Pubkey::new_unique();
        let tx = tx_with_instructions(
            &wallet,
            &[system_instruction::transfer(
                &wallet,
                &spl_token::id(),
                3 * LAMPORTS_PER_SOL,
            )],
        );
        assert!(validate_swap_transaction(&tx, &wallet, "test").is_ok());
    }
}
