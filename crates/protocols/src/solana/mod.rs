//! Solana instruction adapters and shared instruction helpers.

/// Jupiter aggregator.
pub mod jupiter;
/// Meteora DLMM.
pub mod meteora;
/// Raydium CLMM.
pub mod raydium;

use crate::error::AdapterError;
use crate::rpc::RpcProvider;
use borsh::BorshSerialize;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account_interface::{address, instruction as ata_instruction, program};
use std::str::FromStr;

/// Token program ID.
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Token-2022 program ID.
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

/// System program ID.
pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";

/// Memo program ID.
pub const MEMO_PROGRAM_ID: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr";

/// Rent sysvar ID.
pub const RENT_SYSVAR_ID: &str = "SysvarRent111111111111111111111111111111111";

/// Lamports kept on top of a wrapped SOL deposit for rounding in the program.
pub const WSOL_WRAP_BUFFER_LAMPORTS: u64 = 10_000;

/// Parses a base58 address.
pub fn parse_pubkey(s: &str) -> Result<Pubkey, AdapterError> {
    Pubkey::from_str(s)
        .map_err(|e| AdapterError::InvalidInput(format!("invalid address {s}: {e}")))
}

/// Program ids used by every Solana adapter.
#[derive(Debug, Clone, Copy)]
pub struct SystemPrograms {
    /// Token program.
    pub token: Pubkey,
    /// Token-2022 program.
    pub token_2022: Pubkey,
    /// Associated token program.
    pub ata: Pubkey,
    /// System program.
    pub system: Pubkey,
    /// Memo program.
    pub memo: Pubkey,
    /// Rent sysvar.
    pub rent: Pubkey,
}

impl Default for SystemPrograms {
    fn default() -> Self {
        Self {
            token: Pubkey::from_str(TOKEN_PROGRAM_ID).expect("Invalid token program ID"),
            token_2022: Pubkey::from_str(TOKEN_2022_PROGRAM_ID)
                .expect("Invalid token-2022 program ID"),
            ata: program::ID,
            system: Pubkey::from_str(SYSTEM_PROGRAM_ID).expect("Invalid system program ID"),
            memo: Pubkey::from_str(MEMO_PROGRAM_ID).expect("Invalid memo program ID"),
            rent: Pubkey::from_str(RENT_SYSVAR_ID).expect("Invalid rent sysvar ID"),
        }
    }
}

impl SystemPrograms {
    /// Associated token account of `owner` for `mint`.
    #[must_use]
    pub fn derive_ata(&self, owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
        address::get_associated_token_address_with_program_id(owner, mint, token_program)
    }

    /// Creates the associated token account if it does not exist.
    #[must_use]
    pub fn create_ata_idempotent(
        &self,
        payer: &Pubkey,
        owner: &Pubkey,
        mint: &Pubkey,
        token_program: &Pubkey,
    ) -> Instruction {
        ata_instruction::create_associated_token_account_idempotent(
            payer,
            owner,
            mint,
            token_program,
        )
    }

    /// Funds a wrapped SOL account and syncs its token balance.
    pub fn wrap_sol(
        &self,
        owner: &Pubkey,
        wsol_ata: &Pubkey,
        lamports: u64,
    ) -> Result<Vec<Instruction>, AdapterError> {
        let mut transfer_data = Vec::with_capacity(12);
        transfer_data.extend_from_slice(&2u32.to_le_bytes()); // SystemInstruction::Transfer
        transfer_data.extend_from_slice(&lamports.to_le_bytes());
        let transfer = Instruction {
            program_id: self.system,
            accounts: vec![
                AccountMeta::new(*owner, true),
                AccountMeta::new(*wsol_ata, false),
            ],
            data: transfer_data,
        };
        let sync = spl_token::instruction::sync_native(&spl_token::ID, wsol_ata)
            .map_err(|e| AdapterError::InvalidInput(format!("sync_native: {e}")))?;
        Ok(vec![transfer, sync])
    }

    /// Closes a wrapped SOL account back into native SOL.
    pub fn unwrap_sol(
        &self,
        owner: &Pubkey,
        wsol_ata: &Pubkey,
    ) -> Result<Instruction, AdapterError> {
        spl_token::instruction::close_account(&spl_token::ID, wsol_ata, owner, owner, &[])
            .map_err(|e| AdapterError::InvalidInput(format!("close_account: {e}")))
    }

    /// Token program that owns `mint`, defaulting to the classic program.
    pub async fn token_program_for(&self, provider: &RpcProvider, mint: &Pubkey) -> Pubkey {
        match provider.get_account_owner(mint).await {
            Ok(Some(owner)) if owner == self.token_2022 => self.token_2022,
            _ => self.token,
        }
    }
}

/// Anchor instruction: 8-byte discriminator followed by Borsh-encoded args.
pub fn anchor_instruction<A: BorshSerialize>(
    program_id: Pubkey,
    discriminator: [u8; 8],
    args: &A,
    accounts: Vec<AccountMeta>,
) -> Result<Instruction, AdapterError> {
    let mut data = discriminator.to_vec();
    args.serialize(&mut data)
        .map_err(|e| AdapterError::InvalidInput(format!("failed to encode args: {e}")))?;
    Ok(Instruction {
        program_id,
        accounts,
        data,
    })
}
