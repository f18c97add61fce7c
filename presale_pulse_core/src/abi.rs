// Minimal ABI plumbing for the sale contract: event topic / selector
// derivation, log decoding and base-unit conversions.

use crate::error::CoreError;
use crate::models::PurchaseEvent;
use chrono::Utc;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde_json::Value;
use sha3::{Digest, Keccak256};

/// Fixed decimal precision of the sale token (and of the price the
/// contract returns).
pub const TOKEN_DECIMALS: u32 = 18;

/// One whole token in base units.
pub const ONE_TOKEN_RAW: u128 = 1_000_000_000_000_000_000;

const PURCHASE_EVENT_SIG: &str = "TokensPurchased(address,uint256)";
// The deployed contract family really does spell it this way.
const PRICE_FUNCTION_SIG: &str = "sellTokenInUDSTPrice(uint256)";

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// topic0 of the purchase event, 0x-prefixed.
pub static PURCHASE_TOPIC: Lazy<String> =
    Lazy::new(|| format!("0x{}", hex::encode(keccak256(PURCHASE_EVENT_SIG.as_bytes()))));

/// 4-byte selector of the price view function.
pub static PRICE_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| {
    let digest = keccak256(PRICE_FUNCTION_SIG.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
});

/// Calldata for querying the USD price of one whole token.
pub fn encode_price_call() -> String {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&*PRICE_SELECTOR);
    // uint256 argument, big-endian, left-padded to 32 bytes
    data.extend_from_slice(&[0u8; 16]);
    data.extend_from_slice(&ONE_TOKEN_RAW.to_be_bytes());
    format!("0x{}", hex::encode(data))
}

/// Parse a hex quantity (`0x`-prefixed or bare) into a u128. Values wider
/// than 128 bits are rejected rather than truncated.
pub fn decode_uint256(quantity: &str) -> Result<u128, CoreError> {
    let h = quantity.trim().trim_start_matches("0x");
    if h.is_empty() {
        return Err(CoreError::ParseError("empty hex quantity".to_string()));
    }
    let padded;
    let h = if h.len() % 2 == 1 {
        padded = format!("0{}", h);
        padded.as_str()
    } else {
        h
    };
    let bytes = hex::decode(h)
        .map_err(|e| CoreError::ParseError(format!("bad hex quantity {}: {}", quantity, e)))?;
    let split = bytes.len().saturating_sub(16);
    let (high, low) = bytes.split_at(split);
    if high.iter().any(|b| *b != 0) {
        return Err(CoreError::Conversion(format!(
            "quantity {} exceeds 128 bits",
            quantity
        )));
    }
    let mut value: u128 = 0;
    for b in low {
        value = (value << 8) | *b as u128;
    }
    Ok(value)
}

/// Convert a base-unit amount to a whole-token `Decimal`, exactly.
pub fn from_base_units(raw: u128) -> Result<Decimal, CoreError> {
    let signed = i128::try_from(raw)
        .map_err(|e| CoreError::Conversion(format!("amount {} too large: {}", raw, e)))?;
    Decimal::try_from_i128_with_scale(signed, TOKEN_DECIMALS)
        .map_err(|e| CoreError::Conversion(format!("amount {} not representable: {}", raw, e)))
}

/// Extract the 20-byte address packed into a 32-byte log topic.
fn topic_to_address(topic: &str) -> Result<String, CoreError> {
    let h = topic.trim_start_matches("0x");
    if h.len() != 64 || !h.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CoreError::ParseError(format!(
            "address topic must be 32 hex-encoded bytes, got {}",
            topic
        )));
    }
    Ok(format!("0x{}", h[24..].to_ascii_lowercase()))
}

/// Decode an `eth_subscribe` log notification into a `PurchaseEvent`.
///
/// The subscription filter already matches on topic0, but payloads with a
/// wrong or missing buyer topic, or a malformed amount word, are rejected
/// here so the caller can drop them with a warning.
pub fn decode_purchase_log(log: &Value) -> Result<PurchaseEvent, CoreError> {
    let topics = log
        .get("topics")
        .and_then(Value::as_array)
        .ok_or_else(|| CoreError::ParseError("log missing topics".to_string()))?;

    if let Some(topic0) = topics.first().and_then(Value::as_str) {
        if !topic0.eq_ignore_ascii_case(&PURCHASE_TOPIC) {
            return Err(CoreError::ParseError(format!(
                "unexpected event topic {}",
                topic0
            )));
        }
    }

    let buyer_topic = topics
        .get(1)
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::ParseError("log missing buyer topic".to_string()))?;
    let buyer = topic_to_address(buyer_topic)?;

    let data = log
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::ParseError("log missing data".to_string()))?;
    let raw_amount = decode_uint256(data)?;

    let tx_hash = log
        .get("transactionHash")
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    Ok(PurchaseEvent {
        buyer,
        raw_amount,
        tx_hash,
        received_at: Utc::now(),
    })
}
