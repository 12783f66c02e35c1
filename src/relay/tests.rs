//! Tests for relay module

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::{RealtimeDbConfig, RemoteSinkConfig};
    use crate::types::{Action, CompletionRecord, Signal};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn signal(id: u64) -> Signal {
        let now = Utc::now();
        Signal {
            id,
            action: Action::Buy,
            symbol: "NAS100".to_string(),
            timeframe: "5m".to_string(),
            price: Some(dec!(18000.5)),
            strategy: "default".to_string(),
            source_timestamp: None,
            timestamp: now.to_rfc3339(),
            received_at: now,
            processed: false,
            processing_time: None,
            result: None,
            completed_at: None,
            source: "tradingview".to_string(),
            instrument: "NAS100".to_string(),
        }
    }

    /// Accept one connection, capture the request, answer with `status`
    async fn one_shot_server(status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/signal", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                status
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf).to_string()
        });

        (url, handle)
    }

    fn remote_config(url: &str) -> RemoteSinkConfig {
        RemoteSinkConfig {
            url: url.to_string(),
            auth_token: Some("vm-secret".to_string()),
            source: "tradingview".to_string(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_all_delivered() {
        let db = MockSink::new("db");
        let vm = MockSink::new("vm").with_kind(SinkKind::Remote);
        let db_state = db.state();
        let vm_state = vm.state();

        let dispatcher = RelayDispatcher::new(Duration::from_secs(1))
            .with_sink(Arc::new(db))
            .with_sink(Arc::new(vm));

        let report = dispatcher.dispatch(&signal(1)).await;

        assert!(!report.is_degraded());
        assert_eq!(report.delivered_count(), 2);
        assert_eq!(db_state.lock().delivered.len(), 1);
        assert_eq!(vm_state.lock().delivered[0].id, 1);
    }

    #[tokio::test]
    async fn test_failure_isolated_per_sink() {
        let broken = MockSink::new("broken").with_failures();
        let healthy = MockSink::new("healthy");
        let healthy_state = healthy.state();

        let dispatcher = RelayDispatcher::new(Duration::from_secs(1))
            .with_sink(Arc::new(broken))
            .with_sink(Arc::new(healthy));

        let report = dispatcher.dispatch(&signal(7)).await;

        assert!(report.is_degraded());
        assert_eq!(report.delivered_count(), 1);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].sink, "broken");
        assert!(matches!(failures[0].status, SinkStatus::Failed { .. }));
        assert_eq!(healthy_state.lock().delivered.len(), 1);
    }

    #[tokio::test]
    async fn test_slow_sink_times_out_within_bound() {
        let slow = MockSink::new("slow").with_latency(2_000);
        let fast = MockSink::new("fast");
        let slow_state = slow.state();

        let dispatcher = RelayDispatcher::new(Duration::from_millis(100))
            .with_sink(Arc::new(slow))
            .with_sink(Arc::new(fast));

        let started = Instant::now();
        let report = dispatcher.dispatch(&signal(3)).await;

        assert!(started.elapsed() < Duration::from_millis(1_500));
        assert!(report.is_degraded());
        assert_eq!(report.sinks[0].status, SinkStatus::TimedOut { after_ms: 100 });
        assert!(report.sinks[1].is_delivered());
        assert_eq!(slow_state.lock().attempts, 1);
        assert!(slow_state.lock().delivered.is_empty());
    }

    #[tokio::test]
    async fn test_no_sinks_is_not_degraded() {
        let dispatcher = RelayDispatcher::disabled();
        let report = dispatcher.dispatch(&signal(1)).await;

        assert!(report.is_empty());
        assert!(!report.is_degraded());
        assert_eq!(dispatcher.timeout(), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_completion_only_to_tracking_sinks() {
        let db = MockSink::new("db");
        let db_state = db.state();
        let (url, _server) = one_shot_server("200 OK").await;
        let remote = RemoteSink::new(&remote_config(&url), Duration::from_secs(1)).unwrap();

        let dispatcher = RelayDispatcher::new(Duration::from_secs(1))
            .with_sink(Arc::new(remote))
            .with_sink(Arc::new(db));

        let record = CompletionRecord::new(4, Some(85.0), Some("ok".to_string()));
        let report = dispatcher.notify_completion(&record).await;

        assert_eq!(report.sinks.len(), 1);
        assert_eq!(report.sinks[0].sink, "db");
        assert_eq!(db_state.lock().completions, vec![record]);
    }

    #[test]
    fn test_report_serialization() {
        let report = DispatchReport {
            sinks: vec![
                SinkOutcome {
                    sink: "remote".to_string(),
                    kind: SinkKind::Remote,
                    status: SinkStatus::TimedOut { after_ms: 5000 },
                    elapsed_ms: 5001,
                },
                SinkOutcome {
                    sink: "sqlite".to_string(),
                    kind: SinkKind::Database,
                    status: SinkStatus::Delivered,
                    elapsed_ms: 3,
                },
            ],
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["sinks"][0]["status"], "timed_out");
        assert_eq!(json["sinks"][0]["afterMs"], serde_json::Value::Null);
        assert_eq!(json["sinks"][0]["after_ms"], 5000);
        assert_eq!(json["sinks"][0]["kind"], "remote");
        assert_eq!(json["sinks"][1]["status"], "delivered");
        assert_eq!(json["sinks"][1]["elapsedMs"], 3);
    }

    #[tokio::test]
    async fn test_remote_sink_posts_signal_with_auth() {
        let (url, server) = one_shot_server("200 OK").await;
        let sink = RemoteSink::new(&remote_config(&url), Duration::from_secs(2)).unwrap();

        sink.deliver(&signal(11)).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /signal"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer vm-secret"));
        assert!(request.contains("\"source\":\"tradingview\""));
        assert!(request.contains("\"id\":11"));
        assert!(request.contains("\"action\":\"BUY\""));
    }

    #[tokio::test]
    async fn test_remote_sink_non_success_status_fails() {
        let (url, _server) = one_shot_server("503 Service Unavailable").await;
        let sink = RemoteSink::new(&remote_config(&url), Duration::from_secs(2)).unwrap();

        let err = sink.deliver(&signal(1)).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_remote_sink_unreachable_reported_not_panicking() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/signal", listener.local_addr().unwrap());
        drop(listener);

        let sink = RemoteSink::new(&remote_config(&url), Duration::from_secs(1)).unwrap();
        let dispatcher = RelayDispatcher::new(Duration::from_secs(1)).with_sink(Arc::new(sink));

        let report = dispatcher.dispatch(&signal(2)).await;
        assert!(report.is_degraded());
        assert_eq!(report.sinks[0].kind, SinkKind::Remote);
    }

    #[tokio::test]
    async fn test_remote_sink_hanging_host_bounded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/signal", listener.local_addr().unwrap());
        let _hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let timeout = Duration::from_millis(200);
        let sink = RemoteSink::new(&remote_config(&url), timeout).unwrap();
        let dispatcher = RelayDispatcher::new(timeout).with_sink(Arc::new(sink));

        let started = Instant::now();
        let report = dispatcher.dispatch(&signal(5)).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(report.is_degraded());
    }

    #[test]
    fn test_remote_body_overrides_source_tag() {
        let mut config = remote_config("http://localhost/signal");
        config.source = "tv-nas100".to_string();
        let sink = RemoteSink::new(&config, Duration::from_secs(1)).unwrap();

        let body = sink.body(&signal(9)).unwrap();
        assert_eq!(body["source"], "tv-nas100");
        assert_eq!(body["symbol"], "NAS100");
        assert_eq!(body["price"], 18000.5);
        assert_eq!(sink.url(), "http://localhost/signal");
    }

    #[test]
    fn test_realtime_db_node_urls() {
        let sink = RealtimeDbSink::new(
            &RealtimeDbConfig {
                database_url: "https://demo-default-rtdb.firebaseio.com/".to_string(),
                auth: None,
                root: "/nas100_signals/".to_string(),
            },
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(
            sink.node_url("latest"),
            "https://demo-default-rtdb.firebaseio.com/nas100_signals/latest.json"
        );
        assert_eq!(
            sink.node_url("completions/3"),
            "https://demo-default-rtdb.firebaseio.com/nas100_signals/completions/3.json"
        );
        assert!(sink.tracks_completion());
        assert_eq!(sink.kind(), SinkKind::Database);
    }

    #[tokio::test]
    async fn test_realtime_db_error_status_fails() {
        let (url, server) = one_shot_server("401 Unauthorized").await;
        let base = url.trim_end_matches("/signal").to_string();
        let sink = RealtimeDbSink::new(
            &RealtimeDbConfig {
                database_url: base,
                auth: Some("db-secret".to_string()),
                root: "nas100_signals".to_string(),
            },
            Duration::from_secs(2),
        )
        .unwrap();

        let err = sink.deliver(&signal(1)).await.unwrap_err();
        assert!(err.to_string().contains("set latest"));
        assert!(err.to_string().contains("HTTP 401"));

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /nas100_signals/latest.json?auth=db-secret"));
    }

    #[tokio::test]
    async fn test_sqlite_sink_latest_and_history() {
        let sink = SqliteSink::in_memory().await.unwrap();

        for id in 1..=3 {
            tokio_test::assert_ok!(sink.deliver(&signal(id)).await);
        }

        let latest = sink.latest().await.unwrap().unwrap();
        assert_eq!(latest.id, 3);
        assert_eq!(latest.price, Some(dec!(18000.5)));

        assert_eq!(sink.history_count().await.unwrap(), 3);
        let history = sink.history(10).await.unwrap();
        let ids: Vec<u64> = history.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_sqlite_sink_records_completion() {
        let sink = SqliteSink::in_memory().await.unwrap();
        sink.deliver(&signal(1)).await.unwrap();
        sink.deliver(&signal(2)).await.unwrap();

        let record = CompletionRecord::new(2, Some(140.0), Some("filled".to_string()));
        sink.record_completion(&record).await.unwrap();

        let latest = sink.latest().await.unwrap().unwrap();
        assert!(latest.processed);
        assert_eq!(latest.processing_time, Some(140.0));
        assert_eq!(latest.result.as_deref(), Some("filled"));

        let history = sink.history(10).await.unwrap();
        assert!(history[0].processed);
        assert!(!history[1].processed);
    }

    #[tokio::test]
    async fn test_sqlite_sink_empty() {
        let sink = SqliteSink::in_memory().await.unwrap();
        assert!(sink.latest().await.unwrap().is_none());
        assert_eq!(sink.history_count().await.unwrap(), 0);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("가나다", 4), "가...");
    }
}
