//! EVM wallet balance over JSON-RPC `eth_getBalance`

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SourceError, WalletBalanceSource};
use crate::config::EvmSourceConfig;
use crate::models::WalletBalance;

/// Wei per reporting unit (10^18 wei per coin, 10^8 units per coin)
const WEI_PER_UNIT: u128 = 10_000_000_000;

/// Wallet source reading a native EVM balance from a JSON-RPC endpoint
#[derive(Debug, Clone)]
pub struct EvmRpcWallet {
    client: Client,
    rpc_url: String,
    address: String,
    service: String,
}

impl EvmRpcWallet {
    /// Create a source for one configured address
    pub fn new(config: &EvmSourceConfig, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Rpc(e.to_string()))?;

        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            address: config.address.clone(),
            service: config.service.clone(),
        })
    }
}

#[async_trait::async_trait]
impl WalletBalanceSource for EvmRpcWallet {
    fn service_name(&self) -> &str {
        &self.service
    }

    async fn get_balance(&self, symbol: &str) -> Result<WalletBalance, SourceError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "eth_getBalance",
            params: [self.address.as_str(), "latest"],
            id: 1,
        };

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SourceError::Rpc(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SourceError::Rpc(format!(
                "{} returned {}",
                self.rpc_url,
                response.status()
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(SourceError::Rpc(format!("{} ({})", error.message, error.code)));
        }

        let result = body
            .result
            .ok_or_else(|| SourceError::Malformed("missing result".to_string()))?;
        let wei = parse_hex_quantity(&result)?;

        debug!(symbol, address = %self.address, wei = %wei, "Fetched EVM balance");

        Ok(WalletBalance {
            confirmed_balance: wei_to_units(wei),
            unconfirmed_balance: 0,
        })
    }
}

/// Parse a JSON-RPC hex quantity such as `0x1bc16d674ec80000`
fn parse_hex_quantity(value: &str) -> Result<u128, SourceError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| SourceError::Malformed(format!("not a hex quantity: {value}")))?;

    if digits.is_empty() {
        return Ok(0);
    }

    u128::from_str_radix(digits, 16)
        .map_err(|e| SourceError::Malformed(format!("{value}: {e}")))
}

fn wei_to_units(wei: u128) -> u64 {
    u64::try_from(wei / WEI_PER_UNIT).unwrap_or(u64::MAX)
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: [&'a str; 2],
    id: u32,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> EvmRpcWallet {
        let config = EvmSourceConfig {
            symbol: "RBTC".to_string(),
            service: "evm".to_string(),
            rpc_url: server.uri(),
            address: "0xcDc60aD5cEC976c6C04265692d5edAcCc44f95b7".to_string(),
        };
        EvmRpcWallet::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_hex_quantity() {
        assert_eq!(parse_hex_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0x").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0xde0b6b3a7640000").unwrap(), 1_000_000_000_000_000_000);
        assert!(parse_hex_quantity("1234").is_err());
        assert!(parse_hex_quantity("0xzz").is_err());
    }

    #[test]
    fn test_wei_to_units() {
        assert_eq!(wei_to_units(1_000_000_000_000_000_000), 100_000_000);
        assert_eq!(wei_to_units(9_999_999_999), 0);
        assert_eq!(wei_to_units(u128::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_get_balance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_getBalance" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x1bc16d674ec80000"
            })))
            .mount(&server)
            .await;

        let balance = source_for(&server).get_balance("RBTC").await.unwrap();

        assert_eq!(balance.confirmed_balance, 200_000_000);
        assert_eq!(balance.unconfirmed_balance, 0);
    }

    #[tokio::test]
    async fn test_rpc_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "header not found" }
            })))
            .mount(&server)
            .await;

        let err = source_for(&server).get_balance("RBTC").await.unwrap_err();
        assert!(matches!(err, SourceError::Rpc(msg) if msg.contains("header not found")));
    }

    #[tokio::test]
    async fn test_http_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = source_for(&server).get_balance("RBTC").await.unwrap_err();
        assert!(matches!(err, SourceError::Rpc(_)));
    }
}
