//! Ethereum JSON-RPC ledger client.

use crate::ledger::{LedgerClient, LedgerError, LedgerResult};
use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use mev_shield_telemetry::Metrics;
use mev_shield_types::{Block, Transaction};
use reqwest::Client;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct ConnectionState {
    connected: bool,
    status: String,
}

/// JSON-RPC client over HTTP with an optional fallback endpoint.
pub struct RpcClient {
    client: Client,
    rpc_url: String,
    fallback_url: Option<String>,
    metrics: Metrics,
    state: RwLock<ConnectionState>,
}

impl RpcClient {
    /// Create a new RPC client.
    ///
    /// # Arguments
    /// * `rpc_url` - HTTP/HTTPS JSON-RPC endpoint URL
    /// * `fallback_url` - Endpoint tried once when a call to `rpc_url` fails
    /// * `timeout` - Upper bound for each HTTP round trip
    /// * `metrics` - Metrics collector
    pub fn new(
        rpc_url: &str,
        fallback_url: Option<&str>,
        timeout: Duration,
        metrics: Metrics,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        info!("Initialized RPC client for {}", rpc_url);

        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
            fallback_url: fallback_url.map(str::to_string),
            metrics,
            state: RwLock::new(ConnectionState {
                // Optimistic until the first call says otherwise.
                connected: true,
                status: "Not yet contacted".to_string(),
            }),
        })
    }

    async fn call_rpc(&self, operation: &str, method: &str, params: Value) -> LedgerResult<Value> {
        let start = Instant::now();
        let mut result = self.send(&self.rpc_url, method, &params).await;

        if let (Err(e), Some(fallback)) = (&result, &self.fallback_url) {
            warn!("RPC call {} failed on primary endpoint ({}), trying fallback", method, e);
            result = self.send(fallback, method, &params).await;
        }

        self.metrics
            .observe_ledger_latency(operation, start.elapsed().as_secs_f64());

        match &result {
            Ok(_) => self.set_state(true, format!("Connected to {}", self.rpc_url)),
            Err(e) => {
                self.metrics.inc_ledger_errors();
                self.set_state(false, format!("Connection lost: {}", e));
            }
        }
        result
    }

    async fn send(&self, url: &str, method: &str, params: &Value) -> LedgerResult<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(LedgerError::Rpc(format!(
                "request failed with status: {}",
                response.status()
            )));
        }

        let mut body: Value = response.json().await.map_err(map_transport_error)?;

        if let Some(error) = body.get("error") {
            return Err(LedgerError::Rpc(error.to_string()));
        }

        Ok(body
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    fn set_state(&self, connected: bool, status: String) {
        let mut state = match self.state.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.connected = connected;
        state.status = status;
    }
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn get_latest_block_number(&self) -> LedgerResult<u64> {
        let result = self
            .call_rpc("get_block_number", "eth_blockNumber", json!([]))
            .await?;
        let block_num = parse_u64(&result)?;
        debug!("Latest block number: {}", block_num);
        Ok(block_num)
    }

    async fn get_block(&self, number: u64) -> LedgerResult<Option<Block>> {
        let hex_block = format!("0x{:x}", number);
        let result = self
            .call_rpc("get_block", "eth_getBlockByNumber", json!([hex_block, true]))
            .await?;

        if result.is_null() {
            return Ok(None);
        }

        debug!("Fetched block {}", number);
        parse_block(&result).map(Some)
    }

    async fn get_gas_price(&self) -> LedgerResult<u128> {
        let result = self
            .call_rpc("get_gas_price", "eth_gasPrice", json!([]))
            .await?;
        parse_u128(&result)
    }

    async fn get_code(&self, address: Address) -> LedgerResult<Bytes> {
        let result = self
            .call_rpc(
                "get_code",
                "eth_getCode",
                json!([address.to_string(), "latest"]),
            )
            .await?;
        let code = result
            .as_str()
            .ok_or_else(|| LedgerError::InvalidResponse("eth_getCode result".to_string()))?;
        Bytes::from_str(code).map_err(|e| LedgerError::InvalidResponse(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        match self.state.read() {
            Ok(g) => g.connected,
            Err(poisoned) => poisoned.into_inner().connected,
        }
    }

    fn connection_status(&self) -> String {
        match self.state.read() {
            Ok(g) => g.status.clone(),
            Err(poisoned) => poisoned.into_inner().status.clone(),
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> LedgerError {
    if e.is_timeout() {
        LedgerError::Timeout
    } else {
        LedgerError::Unavailable(e.to_string())
    }
}

fn strip_hex(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

fn parse_u64(value: &Value) -> LedgerResult<u64> {
    let hex_str = value
        .as_str()
        .ok_or_else(|| LedgerError::InvalidResponse(format!("expected quantity, got {}", value)))?;
    u64::from_str_radix(strip_hex(hex_str), 16)
        .map_err(|e| LedgerError::InvalidResponse(e.to_string()))
}

fn parse_u128(value: &Value) -> LedgerResult<u128> {
    let hex_str = value
        .as_str()
        .ok_or_else(|| LedgerError::InvalidResponse(format!("expected quantity, got {}", value)))?;
    u128::from_str_radix(strip_hex(hex_str), 16)
        .map_err(|e| LedgerError::InvalidResponse(e.to_string()))
}

/// Parse an `eth_getBlockByNumber` result fetched with full transactions.
fn parse_block(block_json: &Value) -> LedgerResult<Block> {
    let number = parse_u64(&block_json["number"])?;
    let transactions_json = block_json["transactions"]
        .as_array()
        .ok_or_else(|| LedgerError::InvalidResponse("Block missing transactions array".into()))?;

    let transactions = transactions_json
        .iter()
        .map(parse_transaction)
        .collect::<LedgerResult<Vec<_>>>()?;

    Ok(Block::new(number, transactions))
}

fn str_field<'a>(tx_json: &'a Value, name: &str) -> LedgerResult<&'a str> {
    tx_json[name]
        .as_str()
        .ok_or_else(|| LedgerError::InvalidResponse(format!("Transaction missing {}", name)))
}

fn parse_transaction(tx_json: &Value) -> LedgerResult<Transaction> {
    let invalid = LedgerError::InvalidResponse;

    let hash = B256::from_str(str_field(tx_json, "hash")?).map_err(|e| invalid(e.to_string()))?;
    let from = Address::from_str(str_field(tx_json, "from")?).map_err(|e| invalid(e.to_string()))?;
    let to = match tx_json["to"].as_str() {
        Some(to) => Some(Address::from_str(to).map_err(|e| invalid(e.to_string()))?),
        None => None,
    };
    let value = U256::from_str_radix(strip_hex(str_field(tx_json, "value")?), 16)
        .map_err(|e| invalid(e.to_string()))?;
    // Full block bodies carry the effective `gasPrice` for every type; fall
    // back to the fee cap for nodes that omit it.
    let gas_price = if !tx_json["gasPrice"].is_null() {
        parse_u128(&tx_json["gasPrice"])?
    } else if !tx_json["maxFeePerGas"].is_null() {
        parse_u128(&tx_json["maxFeePerGas"])?
    } else {
        0
    };

    Ok(Transaction::new(hash, from, to, value, gas_price))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Value {
        json!({
            "number": "0x1b4",
            "hash": "0x88e96d4537bea4d9c05d12549907b32561d3bf31f45aae734cdc119f13406cb6",
            "transactions": [
                {
                    "hash": "0x0101010101010101010101010101010101010101010101010101010101010101",
                    "from": "0xA0B86991C6218B36C1D19D4A2E9EB0CE3606EB48",
                    "to": "0x7a250d5630b4cf539739df2c5dacb4c659f2488d",
                    "value": "0xde0b6b3a7640000",
                    "gasPrice": "0x6fc23ac00"
                },
                {
                    "hash": "0x0202020202020202020202020202020202020202020202020202020202020202",
                    "from": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
                    "to": null,
                    "value": "0x0",
                    "maxFeePerGas": "0x3b9aca00"
                }
            ]
        })
    }

    #[test]
    fn test_parse_block() {
        let block = parse_block(&sample_block()).unwrap();
        assert_eq!(block.number, 436);
        assert_eq!(block.transactions.len(), 2);

        let first = &block.transactions[0];
        assert_eq!(first.value, U256::from(1_000_000_000_000_000_000u128));
        assert_eq!(first.gas_price, 30_000_000_000);
        assert!(first.to.is_some());

        let second = &block.transactions[1];
        assert!(second.to.is_none());
        assert_eq!(second.gas_price, 1_000_000_000);
        // Mixed-case and lower-case hex decode to the same sender.
        assert_eq!(first.from, second.from);
    }

    #[test]
    fn test_parse_block_rejects_missing_fields() {
        let mut block = sample_block();
        block["transactions"][0]
            .as_object_mut()
            .unwrap()
            .remove("hash");
        assert!(matches!(
            parse_block(&block),
            Err(LedgerError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_quantities() {
        assert_eq!(parse_u64(&json!("0x10")).unwrap(), 16);
        assert_eq!(parse_u128(&json!("ff")).unwrap(), 255);
        assert!(parse_u64(&json!(16)).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_marks_disconnected() {
        let metrics = Metrics::new().unwrap();
        // Port 9 (discard) on localhost: connection refused on test hosts.
        let client = RpcClient::new(
            "http://127.0.0.1:9",
            None,
            Duration::from_millis(500),
            metrics,
        )
        .unwrap();

        assert!(client.is_connected());
        let result = client.get_latest_block_number().await;
        assert!(result.is_err());
        assert!(!client.is_connected());
        assert!(client.connection_status().starts_with("Connection lost"));
    }
}
