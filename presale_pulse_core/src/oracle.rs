// Price oracle adapter: read-only `eth_call` against the sale contract.

use crate::abi;
use crate::error::CoreError;
use async_trait::async_trait;
use log::debug;
use rust_decimal::Decimal;
use serde_json::json;

/// Per-token USD price lookup. Implementations must contain their own
/// failures; an `Err` means the price is unavailable for the current
/// event, never that the service should stop.
#[async_trait(?Send)]
pub trait PriceOracle {
    async fn current_price(&self) -> Result<Decimal, CoreError>;
}

/// Queries the contract's price view function for one whole token over
/// JSON-RPC. Stateless and uncached; every purchase gets a fresh quote.
pub struct EthCallPriceOracle {
    client: reqwest::Client,
    rpc_url: String,
    contract: String,
}

impl EthCallPriceOracle {
    pub fn new(rpc_url: &str, contract: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url: rpc_url.to_string(),
            contract: contract.to_string(),
        }
    }
}

#[async_trait(?Send)]
impl PriceOracle for EthCallPriceOracle {
    async fn current_price(&self) -> Result<Decimal, CoreError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": self.contract, "data": abi::encode_price_call() },
                "latest"
            ]
        });
        let response = self.client.post(&self.rpc_url).json(&body).send().await?;
        let value: serde_json::Value = response.json().await?;

        if let Some(err) = value.get("error") {
            return Err(CoreError::Rpc(format!("eth_call failed: {}", err)));
        }
        let result = value
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| CoreError::Rpc("eth_call response missing result".to_string()))?;

        // The contract returns the price scaled by the token's own decimals.
        let raw = abi::decode_uint256(result)?;
        let price = abi::from_base_units(raw)?;
        debug!("current price per token: {} USD", price);
        Ok(price)
    }
}
