//! API routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, AppState};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Live balances
        .route("/api/v1/balances", get(handlers::get_balances))
        // Snapshots
        .route("/api/v1/snapshots", get(handlers::list_snapshots))
        .route("/api/v1/snapshots/latest", get(handlers::get_latest_snapshot))
        .route("/api/v1/snapshots/range", get(handlers::get_snapshot_range))
        .route("/api/v1/snapshots/swap/:swap_id", get(handlers::get_swap_snapshot))
        // Swap intake
        .route("/api/v1/swaps", post(handlers::report_swap))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use crate::alerting::ThresholdEvaluator;
    use crate::balance::BalanceAggregator;
    use crate::config::MonitorConfig;
    use crate::db::{MemorySnapshotStore, SnapshotStore};
    use crate::error::{Error, Result};
    use crate::models::{
        BalanceData, BalanceSnapshot, NewSnapshot, SnapshotKind, SnapshotPage, WalletBalance,
    };
    use crate::monitor::BalanceMonitor;
    use crate::sources::{SourceError, SourceRegistry, WalletBalanceSource};

    struct StaticWallet;

    #[async_trait::async_trait]
    impl WalletBalanceSource for StaticWallet {
        fn service_name(&self) -> &str {
            "LND"
        }

        async fn get_balance(&self, _symbol: &str) -> std::result::Result<WalletBalance, SourceError> {
            Ok(WalletBalance {
                confirmed_balance: 1_000,
                unconfirmed_balance: 0,
            })
        }
    }

    struct UnreachableStore;

    #[async_trait::async_trait]
    impl SnapshotStore for UnreachableStore {
        async fn add_snapshot(&self, _snapshot: NewSnapshot) -> Result<BalanceSnapshot> {
            Err(Error::internal("connection refused"))
        }

        async fn get_by_swap_id(&self, _swap_id: &str) -> Result<Option<BalanceSnapshot>> {
            Err(Error::internal("connection refused"))
        }

        async fn get_by_time_range(
            &self,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
            _kind: Option<SnapshotKind>,
        ) -> Result<Vec<BalanceSnapshot>> {
            Err(Error::internal("connection refused"))
        }

        async fn get_latest(&self, _kind: Option<SnapshotKind>) -> Result<Option<BalanceSnapshot>> {
            Err(Error::internal("connection refused"))
        }

        async fn get_snapshots(
            &self,
            _limit: u32,
            _offset: u64,
            _kind: Option<SnapshotKind>,
        ) -> Result<SnapshotPage> {
            Err(Error::internal("connection refused"))
        }

        async fn health_check(&self) -> Result<()> {
            Err(Error::internal("connection refused"))
        }
    }

    fn aggregator() -> BalanceAggregator {
        let mut registry = SourceRegistry::new();
        registry.add_wallet("BTC", Arc::new(StaticWallet));
        BalanceAggregator::new(registry, Duration::from_secs(1))
    }

    fn swap_app(
        store: Arc<MemorySnapshotStore>,
        swap_queue_size: usize,
    ) -> (Router, Arc<BalanceMonitor>) {
        let config = MonitorConfig {
            snapshot_interval: Duration::from_secs(3600),
            swap_queue_size,
            ..MonitorConfig::default()
        };
        let monitor = Arc::new(BalanceMonitor::new(
            aggregator(),
            Arc::new(ThresholdEvaluator::new(vec![], None)),
            store.clone(),
            &config,
        ));

        let app = create_router(AppState {
            store,
            aggregator: aggregator(),
            monitor: Some(monitor.clone()),
        });
        (app, monitor)
    }

    async fn post(app: Router, uri: &str, body: &Value) -> StatusCode {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    async fn app() -> Router {
        let store = Arc::new(MemorySnapshotStore::new());
        let at = |minute| Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap();

        store
            .add_snapshot(NewSnapshot::periodic(at(0), BalanceData::default()))
            .await
            .unwrap();
        store
            .add_snapshot(NewSnapshot::swap("S1", "Submarine", at(1), BalanceData::default()))
            .await
            .unwrap();
        store
            .add_snapshot(NewSnapshot::periodic(at(2), BalanceData::default()))
            .await
            .unwrap();

        create_router(AppState {
            store,
            aggregator: BalanceAggregator::new(SourceRegistry::new(), Duration::from_secs(1)),
            monitor: None,
        })
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get(app().await, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_health_reports_unreachable_store() {
        let app = create_router(AppState {
            store: Arc::new(UnreachableStore),
            aggregator: aggregator(),
            monitor: None,
        });

        let (status, body) = get(app, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unavailable");
    }

    #[tokio::test]
    async fn test_reported_swap_is_captured() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (app, monitor) = swap_app(store, 16);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move { monitor.run(shutdown_rx).await });

        let event = json!({ "swap_id": "S9", "swap_type": "chain", "pair": "BTC/BTC" });
        assert_eq!(post(app.clone(), "/api/v1/swaps", &event).await, StatusCode::ACCEPTED);

        let mut found = (StatusCode::NOT_FOUND, Value::Null);
        for _ in 0..100 {
            found = get(app.clone(), "/api/v1/snapshots/swap/S9").await;
            if found.0 == StatusCode::OK {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap();

        let (status, body) = found;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["snapshot_type"], "swap");
        assert_eq!(body["swap_type"], "Chain");
        assert_eq!(body["balances"]["wallets"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_swap_report_is_refused_when_queue_is_full() {
        let (app, _monitor) = swap_app(Arc::new(MemorySnapshotStore::new()), 1);

        let first = json!({ "swap_id": "S1", "swap_type": "submarine", "pair": "BTC/BTC" });
        let second = json!({ "swap_id": "S2", "swap_type": "submarine", "pair": "BTC/BTC" });
        assert_eq!(post(app.clone(), "/api/v1/swaps", &first).await, StatusCode::ACCEPTED);
        assert_eq!(
            post(app, "/api/v1/swaps", &second).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_swap_report_validation() {
        let (swaps, _monitor) = swap_app(Arc::new(MemorySnapshotStore::new()), 16);
        let bad_pair = json!({ "swap_id": "S1", "swap_type": "chain", "pair": "BTC" });
        assert_eq!(post(swaps, "/api/v1/swaps", &bad_pair).await, StatusCode::BAD_REQUEST);

        // no monitor in this process

        let event = json!({ "swap_id": "S1", "swap_type": "chain", "pair": "BTC/BTC" });
        assert_eq!(
            post(app().await, "/api/v1/swaps", &event).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_list_snapshots_with_kind() {
        let (status, body) = get(app().await, "/api/v1/snapshots?kind=periodic&limit=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["snapshots"].as_array().unwrap().len(), 1);
        assert_eq!(body["snapshots"][0]["timestamp"], "2024-06-01T12:02:00Z");
    }

    #[tokio::test]
    async fn test_unknown_kind_is_rejected() {
        let (status, _) = get(app().await, "/api/v1/snapshots?kind=hourly").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_swap_snapshot_lookup() {
        let (status, body) = get(app().await, "/api/v1/snapshots/swap/S1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["snapshot_type"], "swap");
        assert_eq!(body["swap_type"], "Submarine");

        let (status, _) = get(app().await, "/api/v1/snapshots/swap/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_latest_and_range() {
        let (_, latest) = get(app().await, "/api/v1/snapshots/latest?kind=swap").await;
        assert_eq!(latest["swap_id"], "S1");

        let (status, range) = get(
            app().await,
            "/api/v1/snapshots/range?from=2024-06-01T12:00:00Z&to=2024-06-01T12:01:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(range.as_array().unwrap().len(), 2);

        let (status, _) = get(
            app().await,
            "/api/v1/snapshots/range?from=2024-06-01T13:00:00Z&to=2024-06-01T12:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_live_balances_without_sources() {
        let (status, body) = get(app().await, "/api/v1/balances").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["wallets"].as_array().unwrap().len(), 0);
    }
}
