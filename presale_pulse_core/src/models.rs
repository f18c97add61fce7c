use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single on-chain purchase, decoded from a `TokensPurchased` log.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseEvent {
    /// Buyer address, 0x-prefixed and lowercased.
    pub buyer: String,
    /// Amount in the smallest token unit (18 decimals).
    pub raw_amount: u128,
    /// Chain transaction hash; may be absent on some provider payloads.
    pub tx_hash: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Everything a notification channel needs to render a purchase broadcast.
///
/// `price_per_token` and `usd_amount` are `None` when the price lookup
/// failed for this event; channels render that as "unavailable" instead of
/// inventing a number.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    pub token_amount: Decimal,
    pub price_per_token: Option<Decimal>,
    pub usd_amount: Option<Decimal>,
    pub total_raised_usd: Decimal,
    pub total_holders: u64,
    pub explorer_link: String,
}

impl NotificationPayload {
    pub fn usd_display(&self) -> String {
        match self.usd_amount {
            Some(usd) => format!("{:.2}", usd),
            None => "unavailable".to_string(),
        }
    }

    pub fn price_display(&self) -> String {
        match self.price_per_token {
            Some(price) => price.to_string(),
            None => "unavailable".to_string(),
        }
    }

    pub fn total_raised_display(&self) -> String {
        format!("{:.2}", self.total_raised_usd)
    }
}

/// How a purchase counts toward the displayed holder figure.
///
/// `UniqueBuyers` counts each buyer address once; `EveryPurchase` bumps the
/// counter on every buy regardless of who bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HolderPolicy {
    #[default]
    UniqueBuyers,
    EveryPurchase,
}
