//! Read-only audit queries over the decision log.

use placement_core::{
    AllocationDecision, AuditConfig, DecisionAggregates, DecisionFilter, DecisionLog,
    DecisionPage, PageRequest, StoreError,
};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AuditService {
    log: Arc<dyn DecisionLog>,
    config: AuditConfig,
}

impl AuditService {
    #[must_use]
    pub fn new(log: Arc<dyn DecisionLog>, config: AuditConfig) -> Self {
        Self { log, config }
    }

    /// Lists decisions newest first. Out-of-range paging is clamped.
    ///
    /// # Errors
    /// Returns the store error if the log cannot be read.
    pub async fn list(
        &self,
        filter: &DecisionFilter,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<DecisionPage, StoreError> {
        let page = PageRequest::clamped(
            page,
            page_size,
            self.config.default_page_size,
            self.config.max_page_size,
        );
        self.log.list(filter, page).await
    }

    /// Totals over the same filter as [`AuditService::list`].
    ///
    /// # Errors
    /// Returns the store error if the log cannot be read.
    pub async fn aggregates(&self, filter: &DecisionFilter) -> Result<DecisionAggregates, StoreError> {
        self.log.aggregates(filter).await
    }

    /// # Errors
    /// Returns the store error if the log cannot be read.
    pub async fn get(&self, decision_id: Uuid) -> Result<Option<AllocationDecision>, StoreError> {
        self.log.get(decision_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{decision, MemoryLog};

    #[tokio::test]
    async fn test_page_size_is_clamped() {
        let log = Arc::new(MemoryLog::default());
        for _ in 0..5 {
            log.append(&decision("home")).await.unwrap();
        }
        let audit = AuditService::new(
            log,
            AuditConfig {
                default_page_size: 2,
                max_page_size: 3,
            },
        );

        let page = audit.list(&DecisionFilter::default(), None, None).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.decisions.len(), 2);
        assert_eq!(page.total_count, 5);

        let page = audit
            .list(&DecisionFilter::default(), Some(0), Some(100))
            .await
            .unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 3);
        assert_eq!(page.decisions.len(), 3);
    }

    #[tokio::test]
    async fn test_get_unknown_decision_is_none() {
        let audit = AuditService::new(Arc::new(MemoryLog::default()), AuditConfig::default());
        assert!(audit.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
