mod ws;

use log::{error, info, warn};
use presale_pulse_core::{
    abi,
    error::CoreError,
    ledger::{FileLedgerStore, LedgerState, LedgerStore},
    notify::{Channel, Dispatcher, TelegramChannel, XChannel},
    oracle::EthCallPriceOracle,
    processor::{ProcessorConfig, PurchaseProcessor},
    settings::Settings,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    env_logger::init();
    // Print an unconditional startup line so users see the binary started
    // even when RUST_LOG is not set.
    println!(
        "presale_pulse starting (pid {}), RUST_LOG={:?}",
        std::process::id(),
        std::env::var("RUST_LOG").ok()
    );

    let config_path = std::env::var("PRESALE_PULSE_CONFIG_PATH")
        .unwrap_or_else(|_| "config.toml".to_string());
    let settings = Arc::new(Settings::load(&config_path)?);
    settings.validate()?;

    let store = FileLedgerStore::new(&settings.ledger_path, LedgerState::seeded(&settings));
    let mut ledger = store.load().await;
    info!(
        "ledger loaded: {} holders, {} USD raised, {} known buyers",
        ledger.total_holders,
        ledger.total_raised,
        ledger.previous_buyers.len()
    );

    let oracle = EthCallPriceOracle::new(&settings.rpc_http_url, &settings.contract_address);
    let processor = PurchaseProcessor::new(oracle, store, ProcessorConfig::from_settings(&settings));

    // Channel order is deliberate: the chat broadcast goes out before the
    // social post.
    let mut channels: Vec<Box<dyn Channel>> =
        vec![Box::new(TelegramChannel::from_settings(&settings))];
    if let Some(x) = XChannel::from_settings(&settings) {
        channels.push(Box::new(x));
    }
    info!("dispatching to {} notification channel(s)", channels.len());
    let dispatcher = Dispatcher::new(
        channels,
        Duration::from_secs(settings.channel_timeout_secs),
    );

    // Bounded queue between the subscription task and the serial
    // processing loop below.
    let (tx, mut rx) = mpsc::channel::<String>(settings.event_buffer);
    let settings_for_ws = settings.clone();
    let ws_handle = tokio::spawn(async move {
        ws::run_event_source(settings_for_ws, tx).await;
    });

    info!(
        "Listening for presale purchases on {}",
        settings.contract_address
    );

    // One event is handled fully (price query, ledger write, dispatch)
    // before the next is taken off the queue.
    while let Some(raw) = rx.recv().await {
        let log_value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("dropping unreadable notification: {}", e);
                continue;
            }
        };
        let event = match abi::decode_purchase_log(&log_value) {
            Ok(event) => event,
            Err(e) => {
                warn!("dropping malformed purchase log: {}", e);
                continue;
            }
        };
        match processor.process(&event, &mut ledger).await {
            Ok(payload) => dispatcher.dispatch(&payload).await,
            Err(e) => error!(
                "purchase by {} not recorded, skipping notification: {}",
                event.buyer, e
            ),
        }
    }

    // The subscription task never drops its sender, so reaching here means
    // it died.
    warn!("event queue closed, shutting down");
    if let Err(e) = ws_handle.await {
        error!("event source task failed: {:?}", e);
    }
    Ok(())
}
