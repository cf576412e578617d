//! On-chain merge execution and allowance management (SPEC_FULL.md §4.10).
//!
//! RLP/EIP-155 signing is a direct adaptation of `arbitrage::polygon_tx`; the approval flow is
//! a direct adaptation of `arbitrage::approvals`, both rewired to go through the
//! [`pairmaker_core::traits::ChainClient`] seam instead of a bare `reqwest::Client` so the
//! executor can be tested against a mock chain.

use crate::types::MergeResult;
use chrono::{DateTime, Duration, Utc};
use k256::ecdsa::SigningKey;
use parking_lot::RwLock;
use pairmaker_core::error::ServiceError;
use pairmaker_core::traits::ChainClient;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use sha3::{Digest, Keccak256};
use thiserror::Error;
use uuid::Uuid;

const RECEIPT_TIMEOUT_SECS: u64 = 60;
const GAS_ESTIMATE_FALLBACK: u64 = 200_000;
const GAS_PRICE_BUFFER_NUM: u64 = 110;
const GAS_PRICE_BUFFER_DEN: u64 = 100;
const GAS_ESTIMATE_BUFFER_NUM: u64 = 120;
const GAS_ESTIMATE_BUFFER_DEN: u64 = 100;
const GAS_PRICE_CACHE_TTL: Duration = Duration::seconds(30);
const NATIVE_PRICE_CACHE_TTL: Duration = Duration::minutes(15);
const MAX_ALLOWANCE_THRESHOLD: Decimal = rust_decimal_macros::dec!(1000000000);

const MERGE_POSITIONS_SELECTOR: [u8; 4] = [0x4e, 0x2d, 0x5a, 0x6a]; // mergePositions(address,bytes32,bytes32,uint256[])
const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];
const SET_APPROVAL_FOR_ALL_SELECTOR: [u8; 4] = [0xa2, 0x2c, 0xb4, 0x65];
const MAX_UINT256: [u8; 32] = [0xff; 32];

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("negative-risk markets cannot be merged")]
    NegRisk,

    #[error("chain RPC failure: {0}")]
    Rpc(#[from] ServiceError),

    #[error("invalid private key")]
    InvalidKey,

    #[error("signing failed")]
    Signing,

    #[error("invalid hex address: {0}")]
    InvalidAddress(String),
}

pub struct MergeExecutorConfig {
    pub ctf_contract: String,
    pub collateral_contract: String,
    pub exchange_contracts: Vec<String>,
    pub chain_id: u64,
    pub wallet_address: String,
}

pub struct MergeExecutor<'a> {
    chain: &'a dyn ChainClient,
    private_key: SecretString,
    config: MergeExecutorConfig,
    gas_price_cache: RwLock<Option<(u64, DateTime<Utc>)>>,
    native_price_cache: RwLock<Option<(Decimal, DateTime<Utc>)>>,
    native_price_fallback: Decimal,
}

impl<'a> MergeExecutor<'a> {
    #[must_use]
    pub fn new(
        chain: &'a dyn ChainClient,
        private_key: SecretString,
        config: MergeExecutorConfig,
        native_price_fallback: Decimal,
    ) -> Self {
        Self {
            chain,
            private_key,
            config,
            gas_price_cache: RwLock::new(None),
            native_price_cache: RwLock::new(None),
            native_price_fallback,
        }
    }

    /// `mergePositions(collateral, bytes32(0), condition_id, [1,2], amount*10^6)`.
    pub async fn merge(
        &self,
        condition_id: &str,
        amount_in_collateral: Decimal,
        is_neg_risk: bool,
        pair_id: Uuid,
    ) -> MergeResult {
        let now = Utc::now();
        if is_neg_risk {
            return failed_result(condition_id, pair_id, "negative-risk market", now);
        }

        match self.merge_inner(condition_id, pair_id, amount_in_collateral, now).await {
            Ok(result) => result,
            Err(e) => failed_result(condition_id, pair_id, &e.to_string(), now),
        }
    }

    async fn merge_inner(
        &self,
        condition_id: &str,
        pair_id: Uuid,
        amount_in_collateral: Decimal,
        now: DateTime<Utc>,
    ) -> Result<MergeResult, MergeError> {
        let data = encode_merge_positions(
            &self.config.collateral_contract,
            condition_id,
            amount_in_collateral,
        )?;
        let to = self.config.ctf_contract.clone();

        let nonce = self.chain.get_nonce(&self.config.wallet_address).await?;
        let gas_price = self.gas_price().await?;
        let gas_limit = self.estimate_gas(&to, &data).await;

        let tx = LegacyTx {
            nonce,
            gas_price,
            gas_limit,
            to: parse_address(&to)?,
            value: [0u8; 32],
            data,
        };
        let signed = sign_legacy_tx(&tx, self.config.chain_id, self.private_key.expose_secret())?;
        let tx_hash = self.chain.broadcast_raw_tx(&signed).await?;

        let receipt = wait_for_receipt(self.chain, &tx_hash, RECEIPT_TIMEOUT_SECS).await;
        let native_price = self.native_price().await;

        match receipt {
            Some(true) => {
                let gas_used = gas_limit; // conservative: actual usage not exposed by ChainClient
                let gas_cost = Decimal::from(gas_used) * Decimal::from(gas_price) * native_price
                    / Decimal::from(1_000_000_000_000_000_000u128);
                Ok(MergeResult {
                    condition_id: condition_id.to_string(),
                    pair_id,
                    tx_hash: Some(tx_hash),
                    gas_used: Some(gas_used),
                    gas_cost_in_collateral: gas_cost,
                    collateral_received: amount_in_collateral,
                    spread_profit: Decimal::ZERO,
                    success: true,
                    error_message: None,
                    executed_at: now,
                })
            }
            Some(false) => Ok(MergeResult {
                condition_id: condition_id.to_string(),
                pair_id,
                tx_hash: Some(tx_hash),
                gas_used: None,
                gas_cost_in_collateral: Decimal::ZERO,
                collateral_received: Decimal::ZERO,
                spread_profit: Decimal::ZERO,
                success: false,
                error_message: Some("transaction reverted".to_string()),
                executed_at: now,
            }),
            // Receipt timeout: optimistic per Open Question decision 1 (DESIGN.md) — the
            // reconciler re-verifies the on-chain balance next cycle before re-merging.
            None => Ok(MergeResult {
                condition_id: condition_id.to_string(),
                pair_id,
                tx_hash: Some(tx_hash),
                gas_used: None,
                gas_cost_in_collateral: Decimal::ZERO,
                collateral_received: amount_in_collateral,
                spread_profit: Decimal::ZERO,
                success: true,
                error_message: Some("receipt timeout: optimistic success, pending re-verification".to_string()),
                executed_at: now,
            }),
        }
    }

    #[must_use]
    pub async fn estimate_gas_cost_in_collateral(&self) -> Decimal {
        let gas_price = self.gas_price().await.unwrap_or(30_000_000_000);
        let native_price = self.native_price().await;
        Decimal::from(GAS_ESTIMATE_FALLBACK) * Decimal::from(gas_price) * native_price
            / Decimal::from(1_000_000_000_000_000_000u128)
    }

    async fn gas_price(&self) -> Result<u64, MergeError> {
        let now = Utc::now();
        if let Some((price, at)) = *self.gas_price_cache.read() {
            if now - at < GAS_PRICE_CACHE_TTL {
                return Ok(price * GAS_PRICE_BUFFER_NUM / GAS_PRICE_BUFFER_DEN);
            }
        }
        let price = self.chain.get_gas_price().await?;
        *self.gas_price_cache.write() = Some((price, now));
        Ok(price * GAS_PRICE_BUFFER_NUM / GAS_PRICE_BUFFER_DEN)
    }

    async fn estimate_gas(&self, to: &str, data: &[u8]) -> u64 {
        let base = self
            .chain
            .estimate_gas(to, data)
            .await
            .unwrap_or(GAS_ESTIMATE_FALLBACK);
        base * GAS_ESTIMATE_BUFFER_NUM / GAS_ESTIMATE_BUFFER_DEN
    }

    /// Cached at 15 minutes; falls back to `native_price_fallback` on any cache miss that
    /// can't be refreshed (the oracle call itself lives outside `ChainClient` since it's an
    /// HTTP price feed, not an RPC call — callers refresh the cache externally via
    /// [`MergeExecutor::set_native_price`]).
    async fn native_price(&self) -> Decimal {
        let now = Utc::now();
        if let Some((price, at)) = *self.native_price_cache.read() {
            if now - at < NATIVE_PRICE_CACHE_TTL {
                return price;
            }
        }
        self.native_price_fallback
    }

    pub fn set_native_price(&self, price: Decimal) {
        *self.native_price_cache.write() = Some((price, Utc::now()));
    }

    /// Idempotent startup step: for each exchange contract, ensures ERC-1155
    /// `isApprovedForAll` and (where applicable) ERC-20 `allowance` are set. Returns the list
    /// of tx hashes for any approvals actually submitted — empty if everything was already
    /// approved.
    pub async fn ensure_approvals(&self) -> Result<Vec<String>, MergeError> {
        let mut submitted = Vec::new();
        let mut nonce = self.chain.get_nonce(&self.config.wallet_address).await?;

        for operator in &self.config.exchange_contracts {
            let approved = self
                .chain
                .is_approved_for_all(&self.config.ctf_contract, &self.config.wallet_address, operator)
                .await?;
            if !approved {
                let tx_hash = self.submit_set_approval_for_all(operator, nonce).await?;
                submitted.push(tx_hash);
                nonce += 1;
            }

            let allowance = self
                .chain
                .erc20_allowance(&self.config.collateral_contract, &self.config.wallet_address, operator)
                .await?;
            if allowance < MAX_ALLOWANCE_THRESHOLD {
                let tx_hash = self.submit_erc20_approve(operator, nonce).await?;
                submitted.push(tx_hash);
                nonce += 1;
            }
        }

        Ok(submitted)
    }

    async fn submit_set_approval_for_all(&self, operator: &str, nonce: u64) -> Result<String, MergeError> {
        let mut data = SET_APPROVAL_FOR_ALL_SELECTOR.to_vec();
        data.extend_from_slice(&left_pad_address(operator)?);
        data.extend_from_slice(&left_pad_bool(true));
        self.submit_approval_tx(&self.config.ctf_contract.clone(), data, nonce)
            .await
    }

    async fn submit_erc20_approve(&self, operator: &str, nonce: u64) -> Result<String, MergeError> {
        let mut data = APPROVE_SELECTOR.to_vec();
        data.extend_from_slice(&left_pad_address(operator)?);
        data.extend_from_slice(&MAX_UINT256);
        self.submit_approval_tx(&self.config.collateral_contract.clone(), data, nonce)
            .await
    }

    async fn submit_approval_tx(&self, to: &str, data: Vec<u8>, nonce: u64) -> Result<String, MergeError> {
        let gas_price = self.gas_price().await?;
        let tx = LegacyTx {
            nonce,
            gas_price,
            gas_limit: 100_000,
            to: parse_address(to)?,
            value: [0u8; 32],
            data,
        };
        let signed = sign_legacy_tx(&tx, self.config.chain_id, self.private_key.expose_secret())?;
        Ok(self.chain.broadcast_raw_tx(&signed).await?)
    }
}

fn failed_result(condition_id: &str, pair_id: Uuid, error: &str, now: DateTime<Utc>) -> MergeResult {
    MergeResult {
        condition_id: condition_id.to_string(),
        pair_id,
        tx_hash: None,
        gas_used: None,
        gas_cost_in_collateral: Decimal::ZERO,
        collateral_received: Decimal::ZERO,
        spread_profit: Decimal::ZERO,
        success: false,
        error_message: Some(error.to_string()),
        executed_at: now,
    }
}

async fn wait_for_receipt(chain: &dyn ChainClient, tx_hash: &str, timeout_secs: u64) -> Option<bool> {
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_secs(timeout_secs);
    loop {
        if start.elapsed() > timeout {
            return None;
        }
        match chain.get_receipt_status(tx_hash).await {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(_) => {}
        }
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }
}

fn encode_merge_positions(
    collateral_contract: &str,
    condition_id: &str,
    amount: Decimal,
) -> Result<Vec<u8>, MergeError> {
    let mut data = MERGE_POSITIONS_SELECTOR.to_vec();
    data.extend_from_slice(&left_pad_address(collateral_contract)?);
    data.extend_from_slice(&[0u8; 32]); // parentCollectionId = bytes32(0)
    data.extend_from_slice(&parse_condition_id(condition_id)?);
    // partition: dynamic array offset + length + [1, 2]
    data.extend_from_slice(&u256_from_u64(160));
    data.extend_from_slice(&u256_from_u64(2));
    data.extend_from_slice(&u256_from_u64(1));
    data.extend_from_slice(&u256_from_u64(2));
    let scaled = (amount * Decimal::from(1_000_000)).trunc();
    data.extend_from_slice(&u256_from_decimal(scaled));
    Ok(data)
}

fn u256_from_u64(v: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&v.to_be_bytes());
    out
}

fn u256_from_decimal(v: Decimal) -> [u8; 32] {
    use rust_decimal::prelude::ToPrimitive;
    u256_from_u64(v.to_u64().unwrap_or(0))
}

fn parse_address(addr: &str) -> Result<[u8; 20], MergeError> {
    let stripped = addr.strip_prefix("0x").unwrap_or(addr);
    let bytes = hex::decode(stripped).map_err(|_| MergeError::InvalidAddress(addr.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| MergeError::InvalidAddress(addr.to_string()))
}

fn left_pad_address(addr: &str) -> Result<[u8; 32], MergeError> {
    let raw = parse_address(addr)?;
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(&raw);
    Ok(out)
}

fn left_pad_bool(value: bool) -> [u8; 32] {
    let mut out = [0u8; 32];
    if value {
        out[31] = 1;
    }
    out
}

fn parse_condition_id(condition_id: &str) -> Result<[u8; 32], MergeError> {
    let stripped = condition_id.strip_prefix("0x").unwrap_or(condition_id);
    let bytes = hex::decode(stripped).map_err(|_| MergeError::InvalidAddress(condition_id.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| MergeError::InvalidAddress(condition_id.to_string()))
}

// --- RLP / EIP-155 signing, adapted from arbitrage::polygon_tx ---

pub struct LegacyTx {
    pub nonce: u64,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub to: [u8; 20],
    pub value: [u8; 32],
    pub data: Vec<u8>,
}

fn rlp_encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        vec![data[0]]
    } else if data.len() <= 55 {
        let mut out = Vec::with_capacity(1 + data.len());
        out.push(0x80 + data.len() as u8);
        out.extend_from_slice(data);
        out
    } else {
        let len_bytes = to_minimal_be_bytes_u64(data.len() as u64);
        let mut out = Vec::with_capacity(1 + len_bytes.len() + data.len());
        out.push(0xb7 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
        out.extend_from_slice(data);
        out
    }
}

fn rlp_encode_u64(val: u64) -> Vec<u8> {
    if val == 0 {
        rlp_encode_bytes(&[])
    } else {
        rlp_encode_bytes(&to_minimal_be_bytes_u64(val))
    }
}

fn rlp_encode_uint_bytes(val: &[u8]) -> Vec<u8> {
    let stripped = strip_leading_zeros(val);
    if stripped.is_empty() {
        rlp_encode_bytes(&[])
    } else {
        rlp_encode_bytes(stripped)
    }
}

fn rlp_encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload: Vec<u8> = items.iter().flat_map(|i| i.iter().copied()).collect();
    let payload_len = payload.len();
    if payload_len <= 55 {
        let mut out = Vec::with_capacity(1 + payload_len);
        out.push(0xc0 + payload_len as u8);
        out.extend_from_slice(&payload);
        out
    } else {
        let len_bytes = to_minimal_be_bytes_u64(payload_len as u64);
        let mut out = Vec::with_capacity(1 + len_bytes.len() + payload_len);
        out.push(0xf7 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
        out.extend_from_slice(&payload);
        out
    }
}

fn to_minimal_be_bytes_u64(val: u64) -> Vec<u8> {
    let bytes = val.to_be_bytes();
    let stripped = strip_leading_zeros(&bytes);
    if stripped.is_empty() {
        vec![0]
    } else {
        stripped.to_vec()
    }
}

fn strip_leading_zeros(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|&b| b != 0).unwrap_or(data.len());
    &data[start..]
}

fn sign_legacy_tx(tx: &LegacyTx, chain_id: u64, private_key_hex: &str) -> Result<Vec<u8>, MergeError> {
    let unsigned_rlp = rlp_encode_list(&[
        rlp_encode_u64(tx.nonce),
        rlp_encode_u64(tx.gas_price),
        rlp_encode_u64(tx.gas_limit),
        rlp_encode_bytes(&tx.to),
        rlp_encode_uint_bytes(&tx.value),
        rlp_encode_bytes(&tx.data),
        rlp_encode_u64(chain_id),
        rlp_encode_bytes(&[]),
        rlp_encode_bytes(&[]),
    ]);

    let hash = Keccak256::digest(&unsigned_rlp);
    let key_bytes = hex::decode(private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex))
        .map_err(|_| MergeError::InvalidKey)?;
    let signing_key = SigningKey::from_bytes(key_bytes.as_slice().into()).map_err(|_| MergeError::InvalidKey)?;
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(&hash)
        .map_err(|_| MergeError::Signing)?;

    let v = chain_id * 2 + 35 + u64::from(recovery_id.to_byte());

    Ok(rlp_encode_list(&[
        rlp_encode_u64(tx.nonce),
        rlp_encode_u64(tx.gas_price),
        rlp_encode_u64(tx.gas_limit),
        rlp_encode_bytes(&tx.to),
        rlp_encode_uint_bytes(&tx.value),
        rlp_encode_bytes(&tx.data),
        rlp_encode_u64(v),
        rlp_encode_uint_bytes(signature.r().to_bytes().as_slice()),
        rlp_encode_uint_bytes(signature.s().to_bytes().as_slice()),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_tx_produces_rlp_list() {
        let key = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let tx = LegacyTx {
            nonce: 0,
            gas_price: 30_000_000_000,
            gas_limit: 100_000,
            to: [0u8; 20],
            value: [0u8; 32],
            data: vec![],
        };
        let signed = sign_legacy_tx(&tx, 137, key).unwrap();
        assert!(!signed.is_empty());
        assert!(signed[0] >= 0xc0);
    }

    #[test]
    fn set_approval_for_all_calldata_has_correct_selector() {
        let data = left_pad_bool(true);
        assert_eq!(data[31], 1);
    }

    #[test]
    fn parse_address_rejects_wrong_length() {
        assert!(parse_address("0x1234").is_err());
    }
}
