//! # Dashboard State
//!
//! Two independent live totals over the whole catalog.
//!
//! ```text
//!   get_total_count() ──► RetainedValue<i64>  (default 0)
//!   get_total_value() ──► RetainedValue<f64>  (default 0.0)
//! ```
//!
//! Each total keeps collecting for a grace period after its last
//! subscriber leaves, so a quick re-subscribe (e.g. a redraw) neither
//! restarts the upstream nor shows the default again.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use smartshop_sync::{ProductRepository, ViewSettings};

use crate::retained::RetainedValue;

/// Dashboard view state.
pub struct DashboardState {
    total_count: RetainedValue<i64>,
    total_value: RetainedValue<f64>,
}

impl DashboardState {
    /// Creates the dashboard using the configured grace period.
    pub fn new(repository: Arc<dyn ProductRepository>, settings: &ViewSettings) -> Self {
        Self::with_grace_period(repository, settings.grace_period())
    }

    /// Creates the dashboard with an explicit grace period.
    pub fn with_grace_period(repository: Arc<dyn ProductRepository>, grace: Duration) -> Self {
        let count_source = repository.clone();
        let total_count = RetainedValue::new("total_count", 0, grace, move || {
            count_source.get_total_count()
        });

        let value_source = repository;
        let total_value = RetainedValue::new("total_value", 0.0, grace, move || {
            value_source.get_total_value()
        });

        DashboardState {
            total_count,
            total_value,
        }
    }

    /// Subscribes to the product count.
    pub fn subscribe_total_count(&self) -> watch::Receiver<i64> {
        self.total_count.subscribe()
    }

    /// Subscribes to the summed stock value.
    pub fn subscribe_total_value(&self) -> watch::Receiver<f64> {
        self.total_value.subscribe()
    }

    /// Last delivered product count.
    pub fn total_count(&self) -> i64 {
        self.total_count.get()
    }

    /// Last delivered stock value.
    pub fn total_value(&self) -> f64 {
        self.total_value.get()
    }

    /// Whether either total is currently collecting from the repository.
    pub fn is_live(&self) -> bool {
        self.total_count.is_collecting() || self.total_value.is_collecting()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{in_memory_repository, FailingRepository};
    use futures_util::StreamExt;
    use smartshop_core::{total_stock_value, Product};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(3);
    const GRACE: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn test_defaults_before_subscribe() {
        let (repo, _remote) = in_memory_repository().await;
        let dashboard = DashboardState::with_grace_period(repo, GRACE);

        assert_eq!(dashboard.total_count(), 0);
        assert_eq!(dashboard.total_value(), 0.0);
        assert!(!dashboard.is_live());
    }

    #[tokio::test]
    async fn test_totals_match_catalog() {
        let (repo, _remote) = in_memory_repository().await;
        repo.save(&Product::new("a", "Apple", 2.5, 4)).await.unwrap();
        repo.save(&Product::new("b", "Bread", 3.0, 2)).await.unwrap();

        let dashboard = DashboardState::with_grace_period(repo.clone(), GRACE);
        let mut count = dashboard.subscribe_total_count();
        let mut value = dashboard.subscribe_total_value();

        timeout(WAIT, count.wait_for(|c| *c == 2)).await.unwrap().unwrap();
        timeout(WAIT, value.wait_for(|v| (*v - 16.0).abs() < 1e-9))
            .await
            .unwrap()
            .unwrap();

        let all = repo.get_all().next().await.unwrap().unwrap();
        assert_eq!(dashboard.total_count(), all.len() as i64);
        assert!((dashboard.total_value() - total_stock_value(&all)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_totals_follow_writes() {
        let (repo, _remote) = in_memory_repository().await;
        let dashboard = DashboardState::with_grace_period(repo.clone(), GRACE);
        let mut count = dashboard.subscribe_total_count();

        let widget = Product::new("w", "Widget", 9.99, 3);
        repo.save(&widget).await.unwrap();
        timeout(WAIT, count.wait_for(|c| *c == 1)).await.unwrap().unwrap();

        repo.delete(&widget).await.unwrap();
        timeout(WAIT, count.wait_for(|c| *c == 0)).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_last_value_survives_grace_period() {
        let (repo, _remote) = in_memory_repository().await;
        repo.save(&Product::new("a", "Apple", 2.5, 4)).await.unwrap();

        let dashboard = DashboardState::with_grace_period(repo, GRACE);
        {
            let mut count = dashboard.subscribe_total_count();
            timeout(WAIT, count.wait_for(|c| *c == 1)).await.unwrap().unwrap();
        }

        tokio::time::sleep(GRACE * 5).await;

        // Upstream may be idle now, the value is not reset
        let count = dashboard.subscribe_total_count();
        assert_eq!(*count.borrow(), 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_keeps_default() {
        let dashboard = DashboardState::with_grace_period(Arc::new(FailingRepository), GRACE);
        let _count = dashboard.subscribe_total_count();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dashboard.total_count(), 0);
    }
}
