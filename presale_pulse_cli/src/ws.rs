use futures_util::{stream::StreamExt, SinkExt};
use log::{debug, error, info, warn};
use presale_pulse_core::abi;
use presale_pulse_core::settings::Settings;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Subscribes to the sale contract's purchase logs and forwards each raw
/// log notification into the processing queue. Reconnects forever; the
/// provider dropping the subscription only costs us the reconnect delay.
pub async fn run_event_source(settings: Arc<Settings>, tx: mpsc::Sender<String>) {
    let ws_url = settings.ws_url();
    loop {
        match connect_and_stream(&ws_url, &settings, &tx).await {
            Ok(()) => warn!("event stream ended, reconnecting"),
            Err(e) => error!("event stream failed: {}", e),
        }
        sleep(Duration::from_secs(settings.reconnect_delay_secs)).await;
    }
}

async fn connect_and_stream(
    ws_url: &str,
    settings: &Settings,
    tx: &mpsc::Sender<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (ws_stream, _) = connect_async(ws_url).await?;
    let (mut write, mut read) = ws_stream.split();

    info!(
        "Subscribing to purchase logs of {} via {}",
        settings.contract_address, ws_url
    );
    write
        .send(Message::Text(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_subscribe",
                "params": [
                    "logs",
                    {
                        "address": settings.contract_address,
                        "topics": [ &*abi::PURCHASE_TOPIC ]
                    }
                ]
            })
            .to_string(),
        ))
        .await?;

    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => {
                let value: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("JSON parse error on stream: {}", e);
                        continue;
                    }
                };
                // Only subscription notifications carry params; plain
                // id/result frames are the subscribe confirmation.
                if let Some(log) = value.pointer("/params/result") {
                    if tx.send(log.to_string()).await.is_err() {
                        // processing side is gone, stop streaming
                        return Ok(());
                    }
                } else if let Some(sub_id) = value.get("result") {
                    debug!("subscription established: {}", sub_id);
                }
            }
            Message::Ping(data) => write.send(Message::Pong(data)).await?,
            Message::Close(_) => {
                warn!("server closed the event stream");
                return Ok(());
            }
            _ => {}
        }
    }
    Ok(())
}
