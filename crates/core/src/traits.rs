use crate::error::ServiceError;
use anyhow::Result;
use async_trait::async_trait;

/// Abstracts the off-chain CLOB / metadata REST surface so the scanner, reconciler, and
/// placement components can be tested against a mock without a live endpoint.
#[async_trait]
pub trait ExchangeRestClient: Send + Sync {
    async fn get_json(&self, path: &str) -> Result<serde_json::Value, ServiceError>;

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError>;
}

/// Abstracts the JSON-RPC surface the merge executor and preflight checks need: nonce, gas
/// price, broadcast, and receipt polling. Grounded in the free functions of
/// `polygon_tx.rs`, lifted behind a trait so they can be swapped for a mock in tests.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_nonce(&self, address: &str) -> Result<u64, ServiceError>;

    async fn get_gas_price(&self) -> Result<u64, ServiceError>;

    async fn broadcast_raw_tx(&self, raw_tx: &[u8]) -> Result<String, ServiceError>;

    /// Returns `Ok(true)` once the receipt lands with `status == 0x1`, `Ok(false)` on revert,
    /// and `Err` only on transport failure (a timeout is the caller's concern, not this trait's).
    async fn get_receipt_status(&self, tx_hash: &str) -> Result<Option<bool>, ServiceError>;

    /// ERC-1155 `balanceOf(account, id)` via `eth_call`, used by the reconciler to verify a
    /// merge actually zeroed out a pair before freeing capital for re-merge.
    async fn erc1155_balance_of(
        &self,
        contract: &str,
        account: &str,
        token_id: &str,
    ) -> Result<rust_decimal::Decimal, ServiceError>;

    /// ERC-1155 `isApprovedForAll(account, operator)`.
    async fn is_approved_for_all(
        &self,
        contract: &str,
        account: &str,
        operator: &str,
    ) -> Result<bool, ServiceError>;

    /// ERC-20 `allowance(owner, spender)`.
    async fn erc20_allowance(
        &self,
        contract: &str,
        owner: &str,
        spender: &str,
    ) -> Result<rust_decimal::Decimal, ServiceError>;

    /// `eth_estimateGas` for a pending call; callers fall back to a conservative constant on
    /// error rather than propagating it.
    async fn estimate_gas(
        &self,
        to: &str,
        data: &[u8],
    ) -> Result<u64, ServiceError>;
}

/// A market-making strategy's single decision point: given a market and its current books,
/// decide whether (and how) to act. Implementations return `Ok(None)` when the market simply
/// doesn't clear the bar — not finding an opportunity is not an error.
pub trait Strategy<Input, Decision>: Send + Sync {
    fn evaluate(&self, input: &Input) -> Option<Decision>;
}
