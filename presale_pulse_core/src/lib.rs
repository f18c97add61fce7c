// Presale Pulse Core Library
// Purchase accounting and notification logic for a token-sale watcher

pub mod abi;
pub mod error;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod oracle;
pub mod processor;
pub mod settings;

// Re-exports
pub use error::CoreError;
pub use ledger::{FileLedgerStore, LedgerState, LedgerStore};
pub use models::*;
pub use notify::{Channel, Dispatcher, TelegramChannel, XChannel};
pub use oracle::{EthCallPriceOracle, PriceOracle};
pub use processor::{ProcessorConfig, PurchaseProcessor};
pub use settings::Settings;
