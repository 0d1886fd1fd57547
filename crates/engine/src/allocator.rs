//! Allocate: the synchronous, page-render path.
//!
//! One call reads the catalog, filters, ranks, falls back when nothing wins,
//! and hands the decision to the recorder. The whole call, fallback read and
//! winner stamping included, runs against one deadline and never returns an
//! error; any failure degrades to the fallback.

use crate::eligibility;
use crate::fallback::FallbackSelector;
use crate::frequency::FrequencyFilter;
use crate::ranker::{self, Ranking};
use crate::recorder::DecisionRecorder;
use chrono::{DateTime, Utc};
use placement_core::{
    AllocationConfig, AllocationDecision, AllocationRequest, AllocationResponse, AppConfig,
    CampaignCatalog, CampaignSnapshot, CandidateRecord, FallbackResult, RankingPolicy, Rejection,
    RejectionReason, ResolvedPlacement, Winner, DECISION_SCHEMA_VERSION,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// What the auction produced before fallback.
#[derive(Default)]
struct AuctionOutcome {
    candidates: Vec<CandidateRecord>,
    rejection_log: Vec<Rejection>,
    ranking: Ranking,
}

#[derive(Clone)]
pub struct Allocator {
    catalog: Arc<dyn CampaignCatalog>,
    frequency: FrequencyFilter,
    fallback: FallbackSelector,
    recorder: DecisionRecorder,
    config: watch::Receiver<AppConfig>,
    /// Last good catalog read per placement, served when a read fails.
    last_snapshots: Arc<RwLock<HashMap<String, Arc<Vec<CampaignSnapshot>>>>>,
}

impl Allocator {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CampaignCatalog>,
        frequency: FrequencyFilter,
        fallback: FallbackSelector,
        recorder: DecisionRecorder,
        config: watch::Receiver<AppConfig>,
    ) -> Self {
        Self {
            catalog,
            frequency,
            fallback,
            recorder,
            config,
            last_snapshots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn allocate(&self, request: &AllocationRequest) -> AllocationResponse {
        self.allocate_at(request, Utc::now()).await
    }

    /// Runs one auction as of `now`.
    pub async fn allocate_at(&self, request: &AllocationRequest, now: DateTime<Utc>) -> AllocationResponse {
        let started = Instant::now();
        let (allocation, policy) = {
            let config = self.config.borrow();
            (config.allocation.clone(), config.ranking)
        };
        let deadline = started + allocation.timeout();
        let placement = allocation.placement(&request.placement_slug);

        let outcome = match tokio::time::timeout_at(
            deadline,
            self.run_auction(request, &placement, &allocation, &policy, now),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    placement = %placement.slug,
                    timeout_ms = allocation.timeout_ms,
                    "allocation timed out, using fallback"
                );
                AuctionOutcome::default()
            }
        };

        let winners: Vec<Winner> = outcome
            .ranking
            .winners
            .iter()
            .map(|r| Winner::from(&r.snapshot.campaign))
            .collect();
        let winner_ids: Vec<String> = winners.iter().map(|w| w.campaign_id.clone()).collect();

        let fallback = if winners.is_empty() {
            let budget = step_budget(deadline, &allocation);
            Some(self.select_fallback(&placement, &policy, budget).await)
        } else {
            self.mark_won(&winner_ids, step_budget(deadline, &allocation), now).await;
            None
        };
        let fallback_used = fallback.is_some();

        let decision = AllocationDecision {
            decision_id: Uuid::new_v4(),
            schema_version: DECISION_SCHEMA_VERSION,
            placement_slug: placement.slug.clone(),
            visitor_key: request.visitor_key.clone(),
            page_path: request.page_path.clone(),
            created_at: now,
            candidates: outcome.candidates,
            winners: winner_ids,
            rejection_log: outcome.rejection_log,
            fallback_used,
            fallback: fallback.clone(),
            duration_ms: started.elapsed().as_secs_f64() * 1_000.0,
        };
        let decision_id = decision.decision_id;
        debug!(
            decision_id = %decision_id,
            placement = %placement.slug,
            winners = decision.winners.len(),
            fallback_used,
            duration_ms = decision.duration_ms,
            "allocation decided"
        );
        // Failures are counted and logged by the recorder.
        let _ = self.recorder.record(decision);

        AllocationResponse {
            decision_id,
            winners,
            fallback_used,
            fallback,
        }
    }

    async fn run_auction(
        &self,
        request: &AllocationRequest,
        placement: &ResolvedPlacement,
        allocation: &AllocationConfig,
        policy: &RankingPolicy,
        now: DateTime<Utc>,
    ) -> AuctionOutcome {
        let Some(snapshots) = self.load_snapshots(&placement.slug, allocation).await else {
            return AuctionOutcome::default();
        };

        let eligibility = eligibility::filter(&snapshots, &placement.slug, now);
        let (filtered, capped) = self
            .frequency
            .filter(
                eligibility.eligible,
                &request.visitor_key,
                &placement.slug,
                placement.frequency_cap,
                placement.frequency_window,
                now,
            )
            .await;
        let ranking = ranker::rank(filtered, placement.slots, policy);

        let mut rejection_log = eligibility.rejected;
        rejection_log.extend(capped);
        rejection_log.extend(
            ranking
                .outranked
                .iter()
                .map(|r| Rejection::new(&r.snapshot.campaign.campaign_id, RejectionReason::Outranked)),
        );

        let candidates = {
            let scores: HashMap<&str, i64> = ranking
                .winners
                .iter()
                .chain(&ranking.outranked)
                .map(|r| (r.snapshot.campaign.campaign_id.as_str(), r.rank_score))
                .collect();
            let filtered_out: HashSet<&str> = rejection_log
                .iter()
                .filter(|r| r.reason != RejectionReason::Outranked)
                .map(|r| r.campaign_id.as_str())
                .collect();
            snapshots
                .iter()
                .map(|s| {
                    let id = s.campaign.campaign_id.as_str();
                    CandidateRecord {
                        campaign_id: id.to_string(),
                        eligible: !filtered_out.contains(id),
                        rank_score: scores.get(id).copied(),
                    }
                })
                .collect()
        };

        AuctionOutcome {
            candidates,
            rejection_log,
            ranking,
        }
    }

    /// Reads the catalog under its own timeout. On failure serves the last
    /// good read for the placement, or nothing.
    async fn load_snapshots(&self, slug: &str, allocation: &AllocationConfig) -> Option<Arc<Vec<CampaignSnapshot>>> {
        let read = tokio::time::timeout(
            allocation.catalog_timeout(),
            self.catalog.snapshots_for_placement(slug),
        )
        .await;

        let error = match read {
            Ok(Ok(snapshots)) => {
                let snapshots = Arc::new(snapshots);
                self.last_snapshots
                    .write()
                    .await
                    .insert(slug.to_string(), Arc::clone(&snapshots));
                return Some(snapshots);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "catalog read timed out".to_string(),
        };

        let stale = self.last_snapshots.read().await.get(slug).cloned();
        warn!(
            placement = %slug,
            error = %error,
            stale = stale.is_some(),
            "catalog read failed"
        );
        stale
    }

    async fn select_fallback(
        &self,
        placement: &ResolvedPlacement,
        policy: &RankingPolicy,
        budget: Duration,
    ) -> FallbackResult {
        tokio::time::timeout(budget, self.fallback.select(placement, &policy.tier_weights))
        .await
        .unwrap_or_else(|_| {
            warn!(placement = %placement.slug, "fallback read timed out");
            FallbackResult::default()
        })
    }

    async fn mark_won(&self, winner_ids: &[String], budget: Duration, now: DateTime<Utc>) {
        match tokio::time::timeout(budget, self.catalog.mark_won(winner_ids, now)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to stamp winners"),
            Err(_) => warn!("stamping winners timed out"),
        }
    }
}

/// Time left before `deadline`, capped at one catalog read.
fn step_budget(deadline: Instant, allocation: &AllocationConfig) -> Duration {
    deadline
        .saturating_duration_since(Instant::now())
        .min(allocation.catalog_timeout())
}
