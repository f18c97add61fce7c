use crate::error::CoreError;
use crate::models::HolderPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub rpc_http_url: String,
    /// WebSocket endpoint for the event subscription. Derived from
    /// `rpc_http_url` when unset.
    #[serde(default)]
    pub rpc_ws_url: Option<String>,
    pub contract_address: String,
    #[serde(default = "default_baseline_holders")]
    pub baseline_holders: u64,
    #[serde(default = "default_baseline_raised_usd")]
    pub baseline_raised_usd: f64,
    #[serde(default)]
    pub holder_policy: HolderPolicy,
    #[serde(default = "default_explorer_url")]
    pub explorer_url: String,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,
    #[serde(default = "default_channel_timeout_secs")]
    pub channel_timeout_secs: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Strict mode: drop purchases whose transaction hash cannot be
    /// resolved instead of linking to the contract page.
    #[serde(default)]
    pub require_tx_hash: bool,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Bearer token for the social feed channel; the channel is disabled
    /// when unset.
    #[serde(default)]
    pub x_bearer_token: Option<String>,
    /// Optional media attached to the chat broadcast.
    #[serde(default)]
    pub media_url: Option<String>,
    /// Optional "Buy Now" link attached to the chat broadcast.
    #[serde(default)]
    pub action_url: Option<String>,
}

impl Settings {
    /// Load settings from an optional TOML file layered under
    /// `PRESALE_PULSE_*` environment variables. Missing required options
    /// surface here, before any subscription is opened.
    pub fn load(path: &str) -> Result<Self, CoreError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("PRESALE_PULSE"));
        let cfg = builder.build()?;
        let mut settings: Settings = cfg.try_deserialize()?;
        settings.contract_address = settings.contract_address.to_ascii_lowercase();
        Ok(settings)
    }

    /// Effective WebSocket URL for the event subscription.
    pub fn ws_url(&self) -> String {
        match &self.rpc_ws_url {
            Some(url) => url.clone(),
            None => self
                .rpc_http_url
                .replace("https://", "wss://")
                .replace("http://", "ws://"),
        }
    }

    /// Validate settings ranges and constraints
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.telegram_bot_token.trim().is_empty() {
            return Err(CoreError::Validation(
                "telegram_bot_token must not be empty".to_string(),
            ));
        }
        if self.telegram_chat_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "telegram_chat_id must not be empty".to_string(),
            ));
        }
        if self.rpc_http_url.trim().is_empty() {
            return Err(CoreError::Validation(
                "rpc_http_url must not be empty".to_string(),
            ));
        }
        let addr = self.contract_address.trim_start_matches("0x");
        if addr.len() != 40 || !addr.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::Validation(format!(
                "contract_address {} is not a 20-byte hex address",
                self.contract_address
            )));
        }
        if !self.baseline_raised_usd.is_finite() || self.baseline_raised_usd < 0.0 {
            return Err(CoreError::Validation(
                "baseline_raised_usd must be a non-negative number".to_string(),
            ));
        }
        if self.channel_timeout_secs == 0 {
            return Err(CoreError::Validation(
                "channel_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(CoreError::Validation(
                "event_buffer must be > 0".to_string(),
            ));
        }
        if let Some(token) = &self.x_bearer_token {
            if token.trim().is_empty() {
                return Err(CoreError::Validation(
                    "x_bearer_token is set but empty; unset it to disable the channel"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

// Seed values observed on the sale this watcher was first deployed for.
fn default_baseline_holders() -> u64 {
    368
}
fn default_baseline_raised_usd() -> f64 {
    368_995.0
}
fn default_explorer_url() -> String {
    "https://bscscan.com".to_string()
}
fn default_ledger_path() -> String {
    "ledger.json".to_string()
}
fn default_channel_timeout_secs() -> u64 {
    10
}
fn default_event_buffer() -> usize {
    256
}
fn default_reconnect_delay_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Settings {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                telegram_bot_token = "123:abc"
                telegram_chat_id = "-100200300"
                rpc_http_url = "https://bsc.example.org"
                contract_address = "0xAbCdEF0123456789abcdef0123456789ABCDEF01"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let mut s: Settings = cfg.try_deserialize().unwrap();
        s.contract_address = s.contract_address.to_ascii_lowercase();
        s
    }

    #[test]
    fn load_example_config() {
        // Validates that `Settings::load` accepts the shipped example
        // config and that the placeholder values come through.
        let s = Settings::load("../config.example.toml").unwrap();
        assert_eq!(s.baseline_holders, 368);
        assert_eq!(s.holder_policy, HolderPolicy::UniqueBuyers);
        assert_eq!(
            s.contract_address,
            "0x0000000000000000000000000000000000000000"
        );
        assert_eq!(s.channel_timeout_secs, 10);
    }

    #[test]
    fn test_defaults() {
        let s = sample();
        assert_eq!(s.baseline_holders, 368);
        assert_eq!(s.baseline_raised_usd, 368_995.0);
        assert_eq!(s.holder_policy, HolderPolicy::UniqueBuyers);
        assert_eq!(s.explorer_url, "https://bscscan.com");
        assert_eq!(s.ledger_path, "ledger.json");
        assert!(!s.require_tx_hash);
        assert!(s.x_bearer_token.is_none());
        s.validate().unwrap();
    }

    #[test]
    fn test_ws_url_derived_from_http() {
        let s = sample();
        assert_eq!(s.ws_url(), "wss://bsc.example.org");
    }

    #[test]
    fn test_contract_address_lowercased() {
        let s = sample();
        assert_eq!(
            s.contract_address,
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
    }

    #[test]
    fn test_validate_rejects_bad_address() {
        let mut s = sample();
        s.contract_address = "0x1234".to_string();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_token() {
        let mut s = sample();
        s.telegram_bot_token = String::new();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_x_token() {
        let mut s = sample();
        s.x_bearer_token = Some("  ".to_string());
        assert!(s.validate().is_err());
        s.x_bearer_token = Some("AAAA".to_string());
        s.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut s = sample();
        s.channel_timeout_secs = 0;
        assert!(s.validate().is_err());
    }
}
