//! Concrete `ChainClient`/`ExchangeRestClient` implementations over plain JSON-RPC / HTTP
//! JSON, so the CLI binary has something real to wire into [`crate::live_engine::run_cycle`].
//!
//! Grounded in the teacher's `arbitrage::polygon_tx` free functions (nonce/gas price/broadcast/
//! receipt polling over `eth_*` JSON-RPC) and `client.rs`'s governor-rate-limited REST client;
//! both are adapted to return [`ServiceError`] and to implement the `pairmaker_core::traits`
//! seams instead of being called directly.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use pairmaker_core::error::ServiceError;
use pairmaker_core::traits::{ChainClient, ExchangeRestClient};
use rust_decimal::Decimal;
use std::num::NonZeroU32;
use std::sync::Arc;

type Limiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Authenticated REST client for the off-chain CLOB / metadata surface (SPEC_FULL.md §6).
#[derive(Clone)]
pub struct HttpExchangeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: Arc<Limiter>,
}

impl HttpExchangeClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_rate_limit(base_url, api_key, nonzero!(60u32))
    }

    #[must_use]
    pub fn with_rate_limit(
        base_url: impl Into<String>,
        api_key: Option<String>,
        requests_per_minute: NonZeroU32,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(requests_per_minute))),
        }
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("X-API-KEY", key),
            None => builder,
        }
    }

    async fn handle_response(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, ServiceError> {
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ServiceError::RateLimited {
                endpoint: endpoint.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        response.json().await.map_err(ServiceError::Transport)
    }
}

#[async_trait]
impl ExchangeRestClient for HttpExchangeClient {
    async fn get_json(&self, path: &str) -> Result<serde_json::Value, ServiceError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "GET");
        let response = self
            .auth(self.http.get(&url).header("Accept", "application/json"))
            .send()
            .await?;
        Self::handle_response(path, response).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "POST");
        let response = self.auth(self.http.post(&url).json(&body)).send().await?;
        Self::handle_response(path, response).await
    }
}

fn rpc_error(endpoint: &str, e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout {
            endpoint: endpoint.to_string(),
        }
    } else {
        ServiceError::Transport(e)
    }
}

fn parse_hex_u64(endpoint: &str, resp: &serde_json::Value) -> Result<u64, ServiceError> {
    resp.get("result")
        .and_then(|r| r.as_str())
        .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
        .ok_or_else(|| ServiceError::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            detail: resp.to_string(),
        })
}

fn parse_hex_decimal(endpoint: &str, resp: &serde_json::Value) -> Result<Decimal, ServiceError> {
    let raw = resp
        .get("result")
        .and_then(|r| r.as_str())
        .ok_or_else(|| ServiceError::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            detail: resp.to_string(),
        })?;
    let value = u128::from_str_radix(raw.trim_start_matches("0x"), 16).map_err(|_| {
        ServiceError::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            detail: raw.to_string(),
        }
    })?;
    Ok(Decimal::from(value))
}

/// Left-pads a 20-byte address (without `0x`) to a 32-byte ABI word.
fn pad_address(address: &str) -> String {
    format!("{:0>64}", address.trim_start_matches("0x"))
}

/// Polygon (or any EVM) JSON-RPC client implementing the `ChainClient` seam directly over
/// `eth_*` calls, with `eth_call` used for the read-only ERC-1155/ERC-20 view functions.
pub struct HttpChainClient {
    http: reqwest::Client,
    rpc_url: String,
}

impl HttpChainClient {
    #[must_use]
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
        }
    }

    async fn rpc_call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });
        let resp: serde_json::Value = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| rpc_error(method, e))?
            .json()
            .await
            .map_err(|e| rpc_error(method, e))?;
        if let Some(error) = resp.get("error") {
            return Err(ServiceError::UnexpectedResponse {
                endpoint: method.to_string(),
                detail: error.to_string(),
            });
        }
        Ok(resp)
    }

    async fn eth_call(&self, to: &str, data: &str) -> Result<serde_json::Value, ServiceError> {
        self.rpc_call(
            "eth_call",
            serde_json::json!([{"to": to, "data": data}, "latest"]),
        )
        .await
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn get_nonce(&self, address: &str) -> Result<u64, ServiceError> {
        let resp = self
            .rpc_call(
                "eth_getTransactionCount",
                serde_json::json!([address, "latest"]),
            )
            .await?;
        parse_hex_u64("eth_getTransactionCount", &resp)
    }

    async fn get_gas_price(&self) -> Result<u64, ServiceError> {
        let resp = self.rpc_call("eth_gasPrice", serde_json::json!([])).await?;
        parse_hex_u64("eth_gasPrice", &resp)
    }

    async fn broadcast_raw_tx(&self, raw_tx: &[u8]) -> Result<String, ServiceError> {
        let tx_hex = format!("0x{}", hex::encode(raw_tx));
        let resp = self
            .rpc_call("eth_sendRawTransaction", serde_json::json!([tx_hex]))
            .await?;
        resp.get("result")
            .and_then(|r| r.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| ServiceError::UnexpectedResponse {
                endpoint: "eth_sendRawTransaction".to_string(),
                detail: resp.to_string(),
            })
    }

    async fn get_receipt_status(&self, tx_hash: &str) -> Result<Option<bool>, ServiceError> {
        let resp = self
            .rpc_call("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await?;
        let Some(result) = resp.get("result").filter(|r| !r.is_null()) else {
            return Ok(None);
        };
        let status = result.get("status").and_then(|s| s.as_str()).unwrap_or("0x0");
        Ok(Some(status == "0x1"))
    }

    async fn erc1155_balance_of(
        &self,
        contract: &str,
        account: &str,
        token_id: &str,
    ) -> Result<Decimal, ServiceError> {
        // balanceOf(address,uint256) selector 0x00fdd58e
        let id_hex = format!("{:0>64}", token_id.trim_start_matches("0x"));
        let data = format!("0x00fdd58e{}{}", pad_address(account), id_hex);
        let resp = self.eth_call(contract, &data).await?;
        parse_hex_decimal("erc1155_balanceOf", &resp)
    }

    async fn is_approved_for_all(
        &self,
        contract: &str,
        account: &str,
        operator: &str,
    ) -> Result<bool, ServiceError> {
        // isApprovedForAll(address,address) selector 0xe985e9c5
        let data = format!(
            "0xe985e9c5{}{}",
            pad_address(account),
            pad_address(operator)
        );
        let resp = self.eth_call(contract, &data).await?;
        let value = parse_hex_decimal("isApprovedForAll", &resp)?;
        Ok(!value.is_zero())
    }

    async fn erc20_allowance(
        &self,
        contract: &str,
        owner: &str,
        spender: &str,
    ) -> Result<Decimal, ServiceError> {
        // allowance(address,address) selector 0xdd62ed3e
        let data = format!("0xdd62ed3e{}{}", pad_address(owner), pad_address(spender));
        let resp = self.eth_call(contract, &data).await?;
        parse_hex_decimal("allowance", &resp)
    }

    async fn estimate_gas(&self, to: &str, data: &[u8]) -> Result<u64, ServiceError> {
        let data_hex = format!("0x{}", hex::encode(data));
        let resp = self
            .rpc_call(
                "eth_estimateGas",
                serde_json::json!([{"to": to, "data": data_hex}]),
            )
            .await?;
        parse_hex_u64("eth_estimateGas", &resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn pad_address_produces_32_byte_word() {
        let padded = pad_address("0x1234567890123456789012345678901234567890");
        assert_eq!(padded.len(), 64);
        assert!(padded.ends_with("1234567890123456789012345678901234567890"));
    }

    #[tokio::test]
    async fn get_json_returns_parsed_body_on_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&mock_server)
            .await;

        let client = HttpExchangeClient::new(mock_server.uri(), None);
        let body = client.get_json("/markets").await.unwrap();
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn get_json_maps_429_to_rate_limited() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let client = HttpExchangeClient::new(mock_server.uri(), None);
        let err = client.get_json("/markets").await.unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn get_json_maps_non_success_status_to_status_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let client = HttpExchangeClient::new(mock_server.uri(), None);
        let err = client.get_json("/markets").await.unwrap_err();
        match err {
            ServiceError::Status { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn chain_client_parses_hex_nonce() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x2a",
            })))
            .mount(&mock_server)
            .await;

        let client = HttpChainClient::new(mock_server.uri());
        let nonce = client.get_nonce("0x1234567890123456789012345678901234567890").await.unwrap();
        assert_eq!(nonce, 42);
    }

    #[tokio::test]
    async fn chain_client_maps_rpc_error_field_to_unexpected_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32000, "message": "execution reverted"},
            })))
            .mount(&mock_server)
            .await;

        let client = HttpChainClient::new(mock_server.uri());
        let err = client.get_gas_price().await.unwrap_err();
        assert!(matches!(err, ServiceError::UnexpectedResponse { .. }));
    }
}
