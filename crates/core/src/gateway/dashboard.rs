//! Dashboard aggregates.

use serde::de::DeserializeOwned;

use crate::{config::ApiPaths, error::ApiResult};

use super::client::{ApiClient, RequestOptions};

/// Read-only aggregate fetchers backing the dashboard screen.
#[derive(Clone)]
pub struct DashboardApi {
    client: ApiClient,
    stats_path: String,
    recent_activity_path: String,
    low_stock_path: String,
}

impl DashboardApi {
    pub(crate) fn new(client: ApiClient, paths: &ApiPaths) -> Self {
        Self {
            client,
            stats_path: paths.dashboard_stats.clone(),
            recent_activity_path: paths.dashboard_recent_activity.clone(),
            low_stock_path: paths.dashboard_low_stock.clone(),
        }
    }

    /// Aggregate counters (materials, employees, monthly movements, ...).
    pub async fn get_stats<T: DeserializeOwned>(&self) -> ApiResult<T> {
        self.client
            .request(&self.stats_path, RequestOptions::get())
            .await
    }

    /// Latest stock movements, newest first as the backend orders them.
    pub async fn get_recent_activity<T: DeserializeOwned>(&self) -> ApiResult<Vec<T>> {
        self.client
            .request(&self.recent_activity_path, RequestOptions::get())
            .await
    }

    /// Materials at or below their minimum stock.
    pub async fn get_low_stock<T: DeserializeOwned>(&self) -> ApiResult<Vec<T>> {
        self.client
            .request(&self.low_stock_path, RequestOptions::get())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockTransport;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn each_aggregate_has_its_own_path() {
        let mock = MockTransport::new();
        mock.push_json(200, json!({"materials": 1234}));
        mock.push_json(200, json!([{"action": "Entrada registrada"}]));
        mock.push_json(200, json!([{"name": "Parafuso M10", "qty": 5, "min": 20}]));

        let client = ApiClient::new("http://localhost:8080", mock.clone());
        let dashboard = DashboardApi::new(client, &ApiPaths::default());

        let stats: Value = dashboard.get_stats().await.expect("stats");
        let recent: Vec<Value> = dashboard.get_recent_activity().await.expect("recent");
        let low: Vec<Value> = dashboard.get_low_stock().await.expect("low stock");
        assert_eq!(stats["materials"], json!(1234));
        assert_eq!(recent.len(), 1);
        assert_eq!(low[0]["qty"], json!(5));

        let urls: Vec<String> = mock.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost:8080/Dashboard/stats",
                "http://localhost:8080/Dashboard/recent-activity",
                "http://localhost:8080/Dashboard/low-stock",
            ]
        );
    }
}
