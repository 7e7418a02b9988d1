use anyhow::{anyhow, Result};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::native_token::{lamports_to_sol, sol_to_lamports};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signer};
use solana_sdk::system_instruction;
use solana_sdk::system_program;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;
use tracing::{info, warn};

use crate::domain::{Pair, WSOL_MINT};
use crate::error::ExecutionError;
use crate::raydium::RaydiumClient;

pub const RAYDIUM_AMM_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const ASSOCIATED_TOKEN_PROGRAM: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

const SWAP_BASE_IN: u8 = 9;
const SYNC_NATIVE: u8 = 17;
const CREATE_IDEMPOTENT: u8 = 1;

/// Lamports kept back for fees and the rent of two token accounts.
const FEE_RESERVE_LAMPORTS: u64 = 10_000_000;

const POOL_ACCOUNT_MIN_LEN: usize = 256;
const BASE_VAULT_OFFSET: usize = 104;
const QUOTE_VAULT_OFFSET: usize = BASE_VAULT_OFFSET + 32;
const FEE_ACCOUNT_OFFSET: usize = QUOTE_VAULT_OFFSET + 96;

/// One buy attempt against a dispatched pair. Never retried by the caller.
#[async_trait]
pub trait BuyExecutor: Send + Sync {
    /// Returns the transaction signature, or `DRY_RUN` when sending is disabled.
    async fn attempt_buy(&self, wallet: &Keypair, pair: &Pair, amount_sol: f64) -> Result<String, ExecutionError>;
}

pub fn ensure_slippage_bounds(slippage_bps: u64, max_slippage_bps: u64) -> Result<()> {
    if slippage_bps == 0 {
        return Err(anyhow!("slippage_bps cannot be 0"));
    }
    if slippage_bps > max_slippage_bps {
        return Err(anyhow!(
            "slippage_bps ({slippage_bps}) exceeds max_slippage_bps ({max_slippage_bps})"
        ));
    }
    Ok(())
}

pub fn load_keypair(path: Option<&str>) -> Result<Keypair> {
    let path = path.ok_or_else(|| anyhow!("SOL_KEYPAIR_PATH is required"))?;
    read_keypair_file(path).map_err(|e| anyhow!("reading keypair {path}: {e}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAccounts {
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub fee_account: Pubkey,
}

fn key_at(data: &[u8], offset: usize) -> Pubkey {
    let mut b = [0u8; 32];
    b.copy_from_slice(&data[offset..offset + 32]);
    Pubkey::new_from_array(b)
}

/// Vaults and fee account from raw AMM account data.
pub fn parse_pool_accounts(data: &[u8]) -> Result<PoolAccounts, ExecutionError> {
    if data.len() < POOL_ACCOUNT_MIN_LEN {
        return Err(ExecutionError::PoolResolution(format!(
            "AMM account data too short: {} bytes",
            data.len()
        )));
    }
    Ok(PoolAccounts {
        base_vault: key_at(data, BASE_VAULT_OFFSET),
        quote_vault: key_at(data, QUOTE_VAULT_OFFSET),
        fee_account: key_at(data, FEE_ACCOUNT_OFFSET),
    })
}

/// Minimum token output for `amount_sol` at the pair's reported price, in
/// the token's base units.
pub fn min_amount_out(pair: &Pair, amount_sol: f64, slippage_bps: u64) -> Result<u64, ExecutionError> {
    let price = match pair.price {
        Some(p) if p > 0.0 && p.is_finite() => p,
        _ => return Err(ExecutionError::NoReferencePrice(pair.address.clone())),
    };
    let tolerance = 1.0 - slippage_bps as f64 / 10_000.0;
    let scale = 10f64.powi(pair.token_decimals() as i32);
    Ok((amount_sol / price * tolerance * scale).round() as u64)
}

pub fn swap_data(amount_in: u64, min_out: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(17);
    data.push(SWAP_BASE_IN);
    data.extend_from_slice(&amount_in.to_le_bytes());
    data.extend_from_slice(&min_out.to_le_bytes());
    data
}

fn pubkey(raw: &str) -> Result<Pubkey, ExecutionError> {
    Pubkey::from_str(raw).map_err(|_| ExecutionError::InvalidAddress(raw.to_string()))
}

fn associated_token_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey, ata_program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[owner.as_ref(), token_program.as_ref(), mint.as_ref()], ata_program).0
}

fn create_ata_idempotent(payer: &Pubkey, ata: &Pubkey, mint: &Pubkey, token_program: &Pubkey, ata_program: &Pubkey) -> Instruction {
    Instruction {
        program_id: *ata_program,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(*ata, false),
            AccountMeta::new_readonly(*payer, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(*token_program, false),
        ],
        data: vec![CREATE_IDEMPOTENT],
    }
}

/// Compute budget, token accounts, SOL wrap, then the swap itself.
pub fn build_swap_instructions(
    owner: &Pubkey,
    pair: &Pair,
    pool: &PoolAccounts,
    amount_in: u64,
    min_out: u64,
    priority_fee: Option<u64>,
) -> Result<Vec<Instruction>, ExecutionError> {
    let token_program = pubkey(TOKEN_PROGRAM)?;
    let ata_program = pubkey(ASSOCIATED_TOKEN_PROGRAM)?;
    let wsol = pubkey(WSOL_MINT)?;
    let mint = pubkey(pair.token_mint())?;
    let amm = pubkey(pair.amm_id())?;
    let lp_mint = pubkey(&pair.pool.lp_mint)?;

    let wsol_ata = associated_token_address(owner, &wsol, &token_program, &ata_program);
    let token_ata = associated_token_address(owner, &mint, &token_program, &ata_program);

    // SOL goes in through the vault that holds WSOL.
    let (pool_source, pool_dest) = if pair.sol_is_base() {
        (pool.base_vault, pool.quote_vault)
    } else if pair.pool.quote_mint == WSOL_MINT {
        (pool.quote_vault, pool.base_vault)
    } else {
        return Err(ExecutionError::NotSolPaired(pair.address.clone()));
    };

    let swap = Instruction {
        program_id: pubkey(RAYDIUM_AMM_V4)?,
        accounts: vec![
            AccountMeta::new(amm, false),
            AccountMeta::new_readonly(*owner, true),
            AccountMeta::new(wsol_ata, false),
            AccountMeta::new(pool_source, false),
            AccountMeta::new(pool_dest, false),
            AccountMeta::new(token_ata, false),
            AccountMeta::new_readonly(lp_mint, false),
            AccountMeta::new(pool.fee_account, false),
        ],
        data: swap_data(amount_in, min_out),
    };

    let mut ixs = Vec::with_capacity(6);
    if let Some(micro) = priority_fee {
        ixs.push(ComputeBudgetInstruction::set_compute_unit_price(micro));
    }
    ixs.push(create_ata_idempotent(owner, &wsol_ata, &wsol, &token_program, &ata_program));
    ixs.push(create_ata_idempotent(owner, &token_ata, &mint, &token_program, &ata_program));
    ixs.push(system_instruction::transfer(owner, &wsol_ata, amount_in));
    ixs.push(Instruction {
        program_id: token_program,
        accounts: vec![AccountMeta::new(wsol_ata, false)],
        data: vec![SYNC_NATIVE],
    });
    ixs.push(swap);
    Ok(ixs)
}

pub struct Engine {
    rpc: RpcClient,
    raydium: RaydiumClient,
    slippage_bps: u64,
    dry_run: bool,
}

impl Engine {
    pub fn new(rpc_url: String, raydium: RaydiumClient, slippage_bps: u64, dry_run: bool) -> Self {
        let rpc = RpcClient::new_with_commitment(rpc_url, CommitmentConfig::confirmed());
        Self {
            rpc,
            raydium,
            slippage_bps,
            dry_run,
        }
    }

    /// Pool API first; on any failure, read the AMM account itself.
    async fn resolve_pool_accounts(&self, amm: &Pubkey) -> Result<PoolAccounts, ExecutionError> {
        match self.raydium.pool_accounts(&amm.to_string()).await {
            Ok(r) => {
                return Ok(PoolAccounts {
                    base_vault: pubkey(&r.base_vault)?,
                    quote_vault: pubkey(&r.quote_vault)?,
                    fee_account: pubkey(&r.fee_account)?,
                })
            }
            Err(e) => warn!(amm = %amm, error = %e, "engine.pool_api_failed"),
        }
        let account = self
            .rpc
            .get_account(amm)
            .await
            .map_err(|e| ExecutionError::PoolResolution(e.to_string()))?;
        parse_pool_accounts(&account.data)
    }

    /// Best-effort dynamic priority fee.
    ///
    /// Returns micro-lamports per CU.
    async fn dynamic_priority_fee_micro_lamports(&self) -> Option<u64> {
        let fees = self.rpc.get_recent_prioritization_fees(&[]).await.ok()?;
        let p = fees.iter().map(|f| f.prioritization_fee).max()?;
        Some(p.clamp(1, 50_000))
    }

    async fn ensure_balance(&self, owner: &Pubkey, amount_in: u64) -> Result<(), ExecutionError> {
        let have = self
            .rpc
            .get_balance(owner)
            .await
            .map_err(|e| ExecutionError::Balance(Box::new(e)))?;
        let need = amount_in.saturating_add(FEE_RESERVE_LAMPORTS);
        if have < need {
            return Err(ExecutionError::InsufficientBalance {
                have_sol: lamports_to_sol(have),
                need_sol: lamports_to_sol(need),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BuyExecutor for Engine {
    /// Resolve pool -> balance check -> build swap -> simulate (mandatory) -> send.
    async fn attempt_buy(&self, wallet: &Keypair, pair: &Pair, amount_sol: f64) -> Result<String, ExecutionError> {
        let owner = wallet.pubkey();
        let amount_in = sol_to_lamports(amount_sol);
        info!(
            address = %pair.address,
            symbol = %pair.label(),
            amount_sol,
            slippage_bps = self.slippage_bps,
            dry_run = self.dry_run,
            "engine.execute_swap"
        );

        let amm = pubkey(pair.amm_id())?;
        let pool = self.resolve_pool_accounts(&amm).await?;
        self.ensure_balance(&owner, amount_in).await?;

        let min_out = min_amount_out(pair, amount_sol, self.slippage_bps)?;
        let priority_fee = self.dynamic_priority_fee_micro_lamports().await;
        let ixs = build_swap_instructions(&owner, pair, &pool, amount_in, min_out, priority_fee)?;

        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| ExecutionError::Blockhash(Box::new(e)))?;
        let tx = Transaction::new_signed_with_payer(&ixs, Some(&owner), &[wallet], blockhash);

        let sim = self
            .rpc
            .simulate_transaction_with_config(
                &tx,
                RpcSimulateTransactionConfig {
                    sig_verify: false,
                    replace_recent_blockhash: true,
                    commitment: Some(CommitmentConfig::processed()),
                    ..RpcSimulateTransactionConfig::default()
                },
            )
            .await
            .map_err(|e| ExecutionError::Simulation(e.to_string()))?;
        if let Some(err) = sim.value.err {
            let logs = sim.value.logs.unwrap_or_default();
            warn!(address = %pair.address, ?err, ?logs, "engine.simulation_failed");
            return Err(ExecutionError::Simulation(format!("{err:?}")));
        }

        if self.dry_run {
            info!(address = %pair.address, min_out, "dry_run: simulation ok, skipping send");
            return Ok("DRY_RUN".into());
        }

        let sig = self
            .rpc
            .send_transaction_with_config(
                &tx,
                RpcSendTransactionConfig {
                    skip_preflight: true, // already simulated
                    preflight_commitment: Some(CommitmentConfig::processed().commitment),
                    ..RpcSendTransactionConfig::default()
                },
            )
            .await
            .map_err(|e| ExecutionError::Submission(Box::new(e)))?;
        Ok(sig.to_string())
    }
}
