// Purchase event processor: dedup, pricing, aggregation, persistence.

use crate::abi;
use crate::error::CoreError;
use crate::ledger::{LedgerState, LedgerStore};
use crate::models::{HolderPolicy, NotificationPayload, PurchaseEvent};
use crate::oracle::PriceOracle;
use crate::settings::Settings;
use log::{info, warn};
use rust_decimal::RoundingStrategy;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub holder_policy: HolderPolicy,
    pub explorer_url: String,
    pub contract_address: String,
    pub require_tx_hash: bool,
}

impl ProcessorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            holder_policy: settings.holder_policy,
            explorer_url: settings.explorer_url.clone(),
            contract_address: settings.contract_address.clone(),
            require_tx_hash: settings.require_tx_hash,
        }
    }
}

/// Turns one raw purchase into an updated ledger plus a notification
/// payload. The ledger write completes before the payload is handed back,
/// so nothing is ever announced that was not persisted first.
pub struct PurchaseProcessor<O, S> {
    oracle: O,
    store: S,
    config: ProcessorConfig,
}

impl<O: PriceOracle, S: LedgerStore> PurchaseProcessor<O, S> {
    pub fn new(oracle: O, store: S, config: ProcessorConfig) -> Self {
        Self {
            oracle,
            store,
            config,
        }
    }

    pub async fn process(
        &self,
        event: &PurchaseEvent,
        ledger: &mut LedgerState,
    ) -> Result<NotificationPayload, CoreError> {
        if self.config.require_tx_hash && event.tx_hash.is_none() {
            return Err(CoreError::Validation(format!(
                "purchase by {} has no transaction hash and strict linking is enabled",
                event.buyer
            )));
        }

        let token_amount = abi::from_base_units(event.raw_amount)?;

        // One fresh quote per purchase. A failed lookup degrades this
        // event to "unavailable" rather than polluting the totals with a
        // stale or zero price.
        let price_per_token = match self.oracle.current_price().await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("price lookup failed, purchase will be unpriced: {}", e);
                None
            }
        };
        let usd_amount = price_per_token.map(|price| {
            (token_amount * price)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        });

        if let Some(usd) = usd_amount {
            ledger.total_raised += usd;
        }

        let counts_as_new_holder = match self.config.holder_policy {
            HolderPolicy::UniqueBuyers => ledger.previous_buyers.insert(event.buyer.clone()),
            HolderPolicy::EveryPurchase => true,
        };
        if counts_as_new_holder {
            ledger.total_holders += 1;
        }

        // Persist before anything is announced. On failure the caller
        // drops the notification; the in-memory state keeps this event so
        // the next successful save carries it.
        self.store.save(ledger).await?;

        let explorer_link = match &event.tx_hash {
            Some(hash) => format!("{}/tx/{}", self.config.explorer_url, hash),
            None => format!(
                "{}/address/{}",
                self.config.explorer_url, self.config.contract_address
            ),
        };

        info!(
            "purchase by {}: {} tokens, usd={}, total_raised={}, holders={}",
            event.buyer,
            token_amount,
            usd_amount
                .map(|u| u.to_string())
                .unwrap_or_else(|| "unavailable".to_string()),
            ledger.total_raised,
            ledger.total_holders
        );

        Ok(NotificationPayload {
            token_amount,
            price_per_token,
            usd_amount,
            total_raised_usd: ledger.total_raised,
            total_holders: ledger.total_holders,
            explorer_link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::cell::RefCell;
    use std::collections::HashSet;

    struct FixedPrice(Decimal);

    #[async_trait(?Send)]
    impl PriceOracle for FixedPrice {
        async fn current_price(&self) -> Result<Decimal, CoreError> {
            Ok(self.0)
        }
    }

    struct NoPrice;

    #[async_trait(?Send)]
    impl PriceOracle for NoPrice {
        async fn current_price(&self) -> Result<Decimal, CoreError> {
            Err(CoreError::Rpc("price source unreachable".to_string()))
        }
    }

    /// Records every saved state; optionally fails every save.
    struct RecordingStore {
        saves: RefCell<Vec<LedgerState>>,
        fail: bool,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                saves: RefCell::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                saves: RefCell::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait(?Send)]
    impl LedgerStore for RecordingStore {
        async fn load(&self) -> LedgerState {
            baseline()
        }

        async fn save(&self, state: &LedgerState) -> Result<(), CoreError> {
            if self.fail {
                return Err(CoreError::Storage("disk full".to_string()));
            }
            self.saves.borrow_mut().push(state.clone());
            Ok(())
        }
    }

    fn baseline() -> LedgerState {
        LedgerState {
            total_holders: 368,
            total_raised: dec!(368995),
            previous_buyers: HashSet::new(),
        }
    }

    fn config() -> ProcessorConfig {
        ProcessorConfig {
            holder_policy: HolderPolicy::UniqueBuyers,
            explorer_url: "https://bscscan.com".to_string(),
            contract_address: "0x1111111111111111111111111111111111111111".to_string(),
            require_tx_hash: false,
        }
    }

    fn purchase(buyer: &str, raw: u128, tx: Option<&str>) -> PurchaseEvent {
        PurchaseEvent {
            buyer: buyer.to_string(),
            raw_amount: raw,
            tx_hash: tx.map(|s| s.to_string()),
            received_at: Utc::now(),
        }
    }

    const BUYER_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BUYER_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[tokio::test]
    async fn test_new_buyer_at_fixed_price() {
        let store = RecordingStore::new();
        let processor = PurchaseProcessor::new(FixedPrice(dec!(1.05)), store, config());
        let mut ledger = baseline();

        let payload = processor
            .process(
                &purchase(BUYER_A, abi::ONE_TOKEN_RAW, Some("0xfeed")),
                &mut ledger,
            )
            .await
            .unwrap();

        assert_eq!(payload.usd_amount, Some(dec!(1.05)));
        assert_eq!(payload.total_raised_usd, dec!(368996.05));
        assert_eq!(payload.total_holders, 369);
        assert_eq!(payload.explorer_link, "https://bscscan.com/tx/0xfeed");
        assert_eq!(ledger.total_holders, 369);
        assert!(ledger.previous_buyers.contains(BUYER_A));
        assert_eq!(
            processor.store.saves.borrow().as_slice(),
            &[ledger.clone()]
        );
    }

    #[tokio::test]
    async fn test_repeat_buyer_does_not_add_holder() {
        let processor =
            PurchaseProcessor::new(FixedPrice(dec!(2)), RecordingStore::new(), config());
        let mut ledger = baseline();

        processor
            .process(&purchase(BUYER_A, abi::ONE_TOKEN_RAW, None), &mut ledger)
            .await
            .unwrap();
        let payload = processor
            .process(
                &purchase(BUYER_A, 3 * abi::ONE_TOKEN_RAW, None),
                &mut ledger,
            )
            .await
            .unwrap();

        assert_eq!(payload.total_holders, 369);
        assert_eq!(payload.total_raised_usd, dec!(368995) + dec!(2) + dec!(6));
    }

    #[tokio::test]
    async fn test_every_purchase_policy() {
        let mut cfg = config();
        cfg.holder_policy = HolderPolicy::EveryPurchase;
        let processor = PurchaseProcessor::new(FixedPrice(dec!(1)), RecordingStore::new(), cfg);
        let mut ledger = baseline();

        for _ in 0..3 {
            processor
                .process(&purchase(BUYER_A, abi::ONE_TOKEN_RAW, None), &mut ledger)
                .await
                .unwrap();
        }

        assert_eq!(ledger.total_holders, 371);
        assert!(ledger.previous_buyers.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_buyers_each_count() {
        let processor =
            PurchaseProcessor::new(FixedPrice(dec!(1)), RecordingStore::new(), config());
        let mut ledger = baseline();

        processor
            .process(&purchase(BUYER_A, abi::ONE_TOKEN_RAW, None), &mut ledger)
            .await
            .unwrap();
        processor
            .process(&purchase(BUYER_B, abi::ONE_TOKEN_RAW, None), &mut ledger)
            .await
            .unwrap();

        assert_eq!(ledger.total_holders, 370);
    }

    #[tokio::test]
    async fn test_unavailable_price_leaves_totals_untouched() {
        let processor = PurchaseProcessor::new(NoPrice, RecordingStore::new(), config());
        let mut ledger = baseline();

        let payload = processor
            .process(
                &purchase(BUYER_A, abi::ONE_TOKEN_RAW, Some("0xfeed")),
                &mut ledger,
            )
            .await
            .unwrap();

        assert_eq!(payload.price_per_token, None);
        assert_eq!(payload.usd_amount, None);
        assert_eq!(payload.total_raised_usd, dec!(368995));
        // buyer accounting is independent of pricing
        assert_eq!(payload.total_holders, 369);
    }

    #[tokio::test]
    async fn test_save_failure_yields_no_payload() {
        let processor =
            PurchaseProcessor::new(FixedPrice(dec!(1.05)), RecordingStore::failing(), config());
        let mut ledger = baseline();

        let result = processor
            .process(&purchase(BUYER_A, abi::ONE_TOKEN_RAW, None), &mut ledger)
            .await;

        assert!(matches!(result, Err(CoreError::Storage(_))));
        // the event stays in memory so the next successful save carries it
        assert_eq!(ledger.total_raised, dec!(368996.05));
    }

    #[tokio::test]
    async fn test_missing_tx_hash_degrades_link() {
        let processor =
            PurchaseProcessor::new(FixedPrice(dec!(1)), RecordingStore::new(), config());
        let mut ledger = baseline();

        let payload = processor
            .process(&purchase(BUYER_A, abi::ONE_TOKEN_RAW, None), &mut ledger)
            .await
            .unwrap();

        assert_eq!(
            payload.explorer_link,
            "https://bscscan.com/address/0x1111111111111111111111111111111111111111"
        );
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_missing_tx_hash() {
        let mut cfg = config();
        cfg.require_tx_hash = true;
        let processor = PurchaseProcessor::new(FixedPrice(dec!(1)), RecordingStore::new(), cfg);
        let mut ledger = baseline();

        let result = processor
            .process(&purchase(BUYER_A, abi::ONE_TOKEN_RAW, None), &mut ledger)
            .await;

        assert!(matches!(result, Err(CoreError::Validation(_))));
        assert_eq!(ledger, baseline());
    }

    #[tokio::test]
    async fn test_restart_recovers_persisted_totals() {
        use crate::ledger::FileLedgerStore;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let path = path.to_str().unwrap();

        {
            let store = FileLedgerStore::new(path, baseline());
            let processor = PurchaseProcessor::new(FixedPrice(dec!(1.05)), store, config());
            let mut ledger = baseline();
            processor
                .process(&purchase(BUYER_A, abi::ONE_TOKEN_RAW, None), &mut ledger)
                .await
                .unwrap();
        }

        // fresh load after a restart continues from the persisted values
        let store = FileLedgerStore::new(path, baseline());
        let mut ledger = store.load().await;
        assert_eq!(ledger.total_holders, 369);
        assert_eq!(ledger.total_raised, dec!(368996.05));

        let processor = PurchaseProcessor::new(FixedPrice(dec!(1.05)), store, config());
        let payload = processor
            .process(&purchase(BUYER_B, abi::ONE_TOKEN_RAW, None), &mut ledger)
            .await
            .unwrap();
        assert_eq!(payload.total_holders, 370);
        assert_eq!(payload.total_raised_usd, dec!(368997.10));
    }

    #[tokio::test]
    async fn test_usd_rounding_half_away_from_zero() {
        // 0.5 token at 1.05 = 0.525 -> rounds up to 0.53
        let processor =
            PurchaseProcessor::new(FixedPrice(dec!(1.05)), RecordingStore::new(), config());
        let mut ledger = baseline();

        let payload = processor
            .process(
                &purchase(BUYER_A, abi::ONE_TOKEN_RAW / 2, None),
                &mut ledger,
            )
            .await
            .unwrap();

        assert_eq!(payload.usd_amount, Some(dec!(0.53)));
    }
}
