//! Tests for store module

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::IngestorConfig;
    use crate::error::{RelayError, ValidationError};
    use crate::parser::{ParsedAlert, PayloadFormat};
    use crate::types::Action;
    use rust_decimal_macros::dec;

    fn alert(action: Option<Action>, symbol: Option<&str>, timeframe: Option<&str>) -> ParsedAlert {
        let mut parsed = ParsedAlert::empty(PayloadFormat::Structured);
        parsed.action = action;
        parsed.symbol = symbol.map(str::to_string);
        parsed.timeframe = timeframe.map(str::to_string);
        parsed
    }

    fn buy(symbol: &str) -> ParsedAlert {
        alert(Some(Action::Buy), Some(symbol), Some("5m"))
    }

    /// `SignalStore::ingest` with validation failures unwrapped
    fn ingest(
        store: &SignalStore,
        alert: ParsedAlert,
    ) -> std::result::Result<Signal, ValidationError> {
        match store.ingest(alert) {
            Ok(signal) => Ok(signal),
            Err(RelayError::Validation(err)) => Err(err),
            Err(other) => panic!("unexpected store fault: {}", other),
        }
    }

    fn store_with_capacity(capacity: usize) -> SignalStore {
        SignalStore::new(&IngestorConfig {
            history_capacity: capacity,
            ..IngestorConfig::default()
        })
    }

    #[test]
    fn test_ids_strictly_increasing() {
        let store = store_with_capacity(100);
        let ids: Vec<u64> = (0..20)
            .map(|_| ingest(&store, buy("NAS100")).unwrap().id)
            .collect();

        assert_eq!(ids[0], 1);
        assert!(ids.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_first_id_configurable() {
        let store = SignalStore::new(&IngestorConfig {
            first_signal_id: 0,
            ..IngestorConfig::default()
        });
        assert_eq!(ingest(&store, buy("NDX")).unwrap().id, 0);
        assert_eq!(ingest(&store, buy("NDX")).unwrap().id, 1);
    }

    #[test]
    fn test_current_is_latest_accepted() {
        let store = store_with_capacity(10);
        assert!(store.current().is_none());

        ingest(&store, buy("NAS100")).unwrap();
        let second = ingest(&store, alert(Some(Action::Sell), Some("US100"), Some("1h"))).unwrap();

        assert_eq!(store.current(), Some(second));
    }

    #[test]
    fn test_history_bounded_most_recent_first() {
        let store = store_with_capacity(50);
        for _ in 0..75 {
            ingest(&store, buy("NAS100")).unwrap();
        }

        assert_eq!(store.len(), 50);
        let history = store.history(Some(100));
        assert_eq!(history.len(), 50);
        assert_eq!(history.first().unwrap().id, 75);
        assert_eq!(history.last().unwrap().id, 26);
        assert!(history.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[test]
    fn test_history_limit_defaults() {
        let store = store_with_capacity(100);
        for _ in 0..15 {
            ingest(&store, buy("NAS100")).unwrap();
        }

        assert_eq!(store.history(None).len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(store.history(Some(0)).len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(store.history(Some(-3)).len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(store.history(Some(3)).len(), 3);
        assert_eq!(store.history(Some(3))[0].id, 15);
    }

    #[test]
    fn test_defaults_filled() {
        let store = SignalStore::new(&IngestorConfig {
            require_timeframe: false,
            ..IngestorConfig::default()
        });
        let signal = ingest(&store, alert(Some(Action::Buy), Some("nas100"), None))
            .unwrap();

        assert_eq!(signal.symbol, "NAS100");
        assert_eq!(signal.timeframe, "15m");
        assert_eq!(signal.strategy, "default");
        assert_eq!(signal.price, None);
        assert_eq!(signal.source, "tradingview");
        assert_eq!(signal.instrument, "NAS100");
        assert!(signal.source_timestamp.is_none());
        assert_eq!(signal.timestamp, signal.received_at.to_rfc3339());
        assert!(!signal.processed);
    }

    #[test]
    fn test_source_timestamp_kept() {
        let store = store_with_capacity(10);
        let mut parsed = buy("NDX");
        parsed.timestamp = Some("2024-06-15T12:00:00Z".to_string());
        parsed.price = Some(dec!(18000.5));

        let signal = ingest(&store, parsed).unwrap();
        assert_eq!(signal.timestamp, "2024-06-15T12:00:00Z");
        assert_eq!(signal.source_timestamp.as_deref(), Some("2024-06-15T12:00:00Z"));
        assert_eq!(signal.price, Some(dec!(18000.5)));
    }

    #[test]
    fn test_missing_fields_do_not_touch_state() {
        let store = store_with_capacity(10);
        ingest(&store, buy("NAS100")).unwrap();
        let before = store.stats();
        let current = store.current();

        let err = ingest(&store, alert(None, None, Some("5m"))).unwrap_err();
        assert!(err.is_missing("action"));
        assert!(err.is_missing("symbol"));
        assert!(!err.is_missing("timeframe"));

        assert_eq!(store.stats(), before);
        assert_eq!(store.current(), current);
        assert_eq!(ingest(&store, buy("NAS100")).unwrap().id, 2);
    }

    #[test]
    fn test_timeframe_required_by_default() {
        let store = store_with_capacity(10);
        let err = ingest(&store, alert(Some(Action::Buy), Some("NDX"), None))
            .unwrap_err();

        assert_eq!(err.missing, vec!["timeframe".to_string()]);
        assert_eq!(err.required.len(), 3);
    }

    #[test]
    fn test_invalid_required_field_reported_separately() {
        let store = store_with_capacity(10);
        let mut parsed = alert(None, Some("NDX"), Some("5m"));
        parsed.invalid.push("action".to_string());
        parsed.invalid.push("price".to_string());

        let err = ingest(&store, parsed).unwrap_err();
        assert_eq!(err.invalid, vec!["action".to_string()]);
        assert!(err.missing.is_empty());
    }

    #[test]
    fn test_clear_current_keeps_history() {
        let store = store_with_capacity(10);
        ingest(&store, buy("NAS100")).unwrap();

        assert!(store.clear_current().is_some());
        assert!(store.current().is_none());
        assert_eq!(store.len(), 1);

        // idempotent on an empty slot
        assert!(store.clear_current().is_none());
        assert!(store.current().is_none());
    }

    #[test]
    fn test_mark_processed_matching_current() {
        let store = store_with_capacity(10);
        let signal = ingest(&store, buy("NAS100")).unwrap();

        let record = store
            .mark_processed(signal.id, Some(120.0), Some("filled".to_string()))
            .unwrap();
        assert_eq!(record.signal_id, signal.id);

        let current = store.current().unwrap();
        assert!(current.processed);
        assert_eq!(current.processing_time, Some(120.0));
        assert_eq!(current.result.as_deref(), Some("filled"));
        assert!(store.history(None)[0].processed);
    }

    #[test]
    fn test_mark_processed_only_once() {
        let store = store_with_capacity(10);
        let signal = ingest(&store, buy("NAS100")).unwrap();

        assert!(store.mark_processed(signal.id, Some(1.0), None).is_some());
        assert!(store.mark_processed(signal.id, Some(2.0), None).is_none());
        assert_eq!(store.current().unwrap().processing_time, Some(1.0));
    }

    #[test]
    fn test_mark_processed_non_matching_is_noop() {
        let store = store_with_capacity(10);
        let first = ingest(&store, buy("NAS100")).unwrap();
        ingest(&store, buy("NAS100")).unwrap();
        let current = store.current();
        let history = store.history(None);

        assert!(store.mark_processed(first.id, Some(5.0), None).is_none());
        assert!(store.mark_processed(999, None, None).is_none());
        assert_eq!(store.current(), current);
        assert_eq!(store.history(None), history);
    }

    #[test]
    fn test_mark_processed_after_clear_is_noop() {
        let store = store_with_capacity(10);
        let signal = ingest(&store, buy("NAS100")).unwrap();
        store.clear_current();

        assert!(store.mark_processed(signal.id, None, None).is_none());
        assert!(!store.history(None)[0].processed);
    }

    #[test]
    fn test_concurrent_ingest_unique_ids() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let store = Arc::new(store_with_capacity(1000));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| ingest(&store, buy("NDX")).unwrap().id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: HashSet<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(ids.len(), 400);
        assert_eq!(store.len(), 400);
    }

    #[test]
    fn test_exhausted_id_space_is_a_fault() {
        let store = SignalStore::new(&IngestorConfig {
            first_signal_id: u64::MAX,
            ..IngestorConfig::default()
        });
        let err = store.ingest(buy("NAS100")).unwrap_err();
        assert!(matches!(err, RelayError::Internal(_)));
        assert!(store.current().is_none());
        assert!(store.is_empty());
        assert_eq!(store.stats().accepted, 0);
        assert_eq!(store.stats().next_id, u64::MAX);
    }
}
