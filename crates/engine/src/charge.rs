//! Charge processor.
//!
//! Wraps the ledger's atomic charge with input validation, retry on
//! transient store errors, the reconciliation queue for charges that still
//! fail, and force-pausing on integrity violations. Business rejections come
//! back as `ChargeOutcome` values; only infrastructure and integrity faults
//! are `ChargeError`s.

use crate::retry::{retry_transient, Backoff};
use chrono::{DateTime, Utc};
use placement_core::{
    featured_fee_key, BillingModel, CampaignCatalog, ChargeConfig, ChargeEvent, ChargeKind,
    ChargeOutcome, ChargeRejection, StoreError, WalletCredit, WalletLedger,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ChargeError {
    /// The event can never be applied as given.
    #[error("invalid charge event: {0}")]
    InvalidEvent(String),

    /// The store kept failing. `queued` says whether the event was parked
    /// for replay.
    #[error("charge store failure (queued for replay: {queued}): {source}")]
    Store {
        #[source]
        source: StoreError,
        queued: bool,
    },

    /// Spend state broke an invariant; the campaign has been force-paused.
    #[error("integrity violation on campaign {campaign_id}: {detail}")]
    Integrity { campaign_id: String, detail: String },
}

impl ChargeError {
    /// Returns true if the caller may retry with the same idempotency key.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}

/// Counts from one replay pass over the pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: u64,
    pub rejected: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct ChargeProcessor {
    ledger: Arc<dyn WalletLedger>,
    catalog: Arc<dyn CampaignCatalog>,
    backoff: Backoff,
}

impl ChargeProcessor {
    #[must_use]
    pub fn new(ledger: Arc<dyn WalletLedger>, catalog: Arc<dyn CampaignCatalog>, config: &ChargeConfig) -> Self {
        Self {
            ledger,
            catalog,
            backoff: Backoff::new(config.max_attempts, config.base_backoff_ms, config.max_backoff_ms),
        }
    }

    /// Charges `event` now.
    ///
    /// # Errors
    /// See [`ChargeProcessor::charge_at`].
    pub async fn charge(&self, event: &ChargeEvent) -> Result<ChargeOutcome, ChargeError> {
        self.charge_at(event, Utc::now()).await
    }

    /// Charges `event` as of `now`. Runs to a definite outcome once started.
    ///
    /// # Errors
    /// - `InvalidEvent` for a malformed event
    /// - `Store` after retries are exhausted; the event is queued for replay
    /// - `Integrity` if the ledger detected an invariant break
    pub async fn charge_at(&self, event: &ChargeEvent, now: DateTime<Utc>) -> Result<ChargeOutcome, ChargeError> {
        validate(event)?;
        let result = self.execute(event, now).await;
        if let Err(ChargeError::Store { source, .. }) = result {
            let queued = self.enqueue(event, &source, now).await;
            return Err(ChargeError::Store { source, queued });
        }
        result
    }

    /// Charges a click at the campaign's current bid.
    ///
    /// The campaign lookup is retried like the charge. If it keeps failing and
    /// the reporter sent `served_bid_cents`, the click is queued at that price
    /// for replay. Unknown and featured campaigns are rejected, not billed.
    ///
    /// # Errors
    /// As [`ChargeProcessor::charge_at`]. A lookup failure is `Store`, with
    /// `queued` telling whether the click was parked.
    pub async fn charge_click(
        &self,
        campaign_id: &str,
        broker_id: &str,
        idempotency_key: &str,
        served_bid_cents: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ChargeOutcome, ChargeError> {
        let click = |amount_cents| ChargeEvent {
            campaign_id: campaign_id.to_string(),
            broker_id: broker_id.to_string(),
            amount_cents,
            idempotency_key: idempotency_key.to_string(),
            kind: ChargeKind::CpcClick,
        };

        let catalog = &self.catalog;
        let campaign = match retry_transient(self.backoff, "campaign lookup", || catalog.campaign(campaign_id)).await {
            Ok(campaign) => campaign,
            Err(source) => {
                let queued = match served_bid_cents.filter(|bid| *bid > 0) {
                    Some(bid) => self.enqueue(&click(bid), &source, now).await,
                    None => {
                        warn!(
                            campaign_id = %campaign_id,
                            key = %idempotency_key,
                            error = %source,
                            "campaign lookup failed and the click carried no bid to queue"
                        );
                        false
                    }
                };
                return Err(ChargeError::Store { source, queued });
            }
        };

        let Some(campaign) = campaign else {
            debug!(campaign_id = %campaign_id, "click for unknown campaign");
            return Ok(ChargeOutcome::rejected(ChargeRejection::UnknownCampaign, false));
        };
        if campaign.billing_model != BillingModel::Cpc {
            debug!(campaign_id = %campaign_id, "click on featured campaign, not billed");
            return Ok(ChargeOutcome::rejected(ChargeRejection::BillingMismatch, false));
        }
        self.charge_at(&click(campaign.bid_rate_cents.unwrap_or(0)), now).await
    }

    /// Charges a featured campaign's fee for the calendar month containing `now`.
    ///
    /// The idempotency key is `featured:{campaign_id}:{YYYY-MM}`, so a period
    /// is billed at most once however often this runs.
    ///
    /// # Errors
    /// As [`ChargeProcessor::charge_at`], plus `InvalidEvent` if the campaign
    /// has no monthly fee.
    pub async fn bill_featured_period(&self, campaign_id: &str, now: DateTime<Utc>) -> Result<ChargeOutcome, ChargeError> {
        let catalog = &self.catalog;
        let campaign = retry_transient(self.backoff, "campaign lookup", || catalog.campaign(campaign_id))
            .await
            .map_err(|source| ChargeError::Store {
                source,
                queued: false,
            })?;

        let Some(campaign) = campaign else {
            return Ok(ChargeOutcome::rejected(ChargeRejection::UnknownCampaign, false));
        };
        if campaign.billing_model != BillingModel::FeaturedMonthly {
            return Ok(ChargeOutcome::rejected(ChargeRejection::BillingMismatch, false));
        }
        let fee = campaign.monthly_fee_cents.unwrap_or(0);
        if fee <= 0 {
            return Err(ChargeError::InvalidEvent(format!(
                "campaign {campaign_id} has no monthly fee"
            )));
        }

        let event = ChargeEvent {
            campaign_id: campaign.campaign_id.clone(),
            broker_id: campaign.broker_id.clone(),
            amount_cents: fee,
            idempotency_key: featured_fee_key(&campaign.campaign_id, now),
            kind: ChargeKind::FeaturedFee,
        };
        self.charge_at(&event, now).await
    }

    /// Credits a wallet (top-up, refund, or admin adjustment).
    ///
    /// # Errors
    /// `InvalidEvent` if the credit breaks a balance rule, `Store` if the
    /// store kept failing. Credits are not queued.
    pub async fn credit(&self, credit: &WalletCredit, now: DateTime<Utc>) -> Result<bool, ChargeError> {
        if credit.idempotency_key.trim().is_empty() {
            return Err(ChargeError::InvalidEvent("missing idempotency key".to_string()));
        }
        let ledger = &self.ledger;
        match retry_transient(self.backoff, "wallet credit", || ledger.credit(credit, now)).await {
            Ok(applied) => {
                info!(
                    broker_id = %credit.broker_id,
                    amount_cents = credit.amount_cents,
                    applied,
                    "wallet credit"
                );
                Ok(applied)
            }
            Err(StoreError::InvalidInput(detail)) => Err(ChargeError::InvalidEvent(detail)),
            Err(source) => Err(ChargeError::Store {
                source,
                queued: false,
            }),
        }
    }

    /// Re-drives up to `limit` queued charges. Idempotency keys make replays
    /// of charges that did land harmless.
    ///
    /// # Errors
    /// Returns an error only if the queue itself cannot be read.
    pub async fn replay_pending(&self, limit: i64, now: DateTime<Utc>) -> Result<ReplaySummary, StoreError> {
        let pending = self.ledger.pending_charges(limit).await?;
        let mut summary = ReplaySummary::default();

        for charge in pending {
            let resolved = match self.execute(&charge.event, now).await {
                Ok(outcome) => {
                    if outcome.applied {
                        summary.applied += 1;
                    } else {
                        summary.rejected += 1;
                    }
                    true
                }
                // Paused for review or malformed; replaying again cannot help.
                Err(ChargeError::Integrity { .. } | ChargeError::InvalidEvent(_)) => {
                    summary.rejected += 1;
                    true
                }
                Err(ChargeError::Store { source, .. }) => {
                    summary.failed += 1;
                    if let Err(e) = self.ledger.bump_pending(charge.id, &source.to_string()).await {
                        warn!(pending_id = charge.id, error = %e, "failed to record replay attempt");
                    }
                    false
                }
            };

            if resolved {
                if let Err(e) = self.ledger.resolve_pending(charge.id, now).await {
                    warn!(pending_id = charge.id, error = %e, "failed to resolve pending charge");
                }
            }
        }

        if summary != ReplaySummary::default() {
            info!(
                applied = summary.applied,
                rejected = summary.rejected,
                failed = summary.failed,
                "pending charges replayed"
            );
        }
        Ok(summary)
    }

    async fn execute(&self, event: &ChargeEvent, now: DateTime<Utc>) -> Result<ChargeOutcome, ChargeError> {
        let ledger = &self.ledger;
        match retry_transient(self.backoff, "charge", || ledger.apply_charge(event, now)).await {
            Ok(outcome) => {
                log_outcome(event, &outcome);
                Ok(outcome)
            }
            Err(StoreError::IntegrityViolation {
                campaign_id,
                detail,
            }) => {
                error!(
                    campaign_id = %campaign_id,
                    key = %event.idempotency_key,
                    detail = %detail,
                    "ledger integrity violation, force-pausing campaign"
                );
                self.force_pause(&campaign_id, now).await;
                Err(ChargeError::Integrity {
                    campaign_id,
                    detail,
                })
            }
            Err(StoreError::InvalidInput(detail)) => Err(ChargeError::InvalidEvent(detail)),
            Err(source) => Err(ChargeError::Store {
                source,
                queued: false,
            }),
        }
    }

    async fn force_pause(&self, campaign_id: &str, now: DateTime<Utc>) {
        let ledger = &self.ledger;
        if let Err(e) = retry_transient(self.backoff, "force pause", || ledger.force_pause(campaign_id, now)).await {
            error!(campaign_id = %campaign_id, error = %e, "force pause failed");
        }
    }

    async fn enqueue(&self, event: &ChargeEvent, source: &StoreError, now: DateTime<Utc>) -> bool {
        let ledger = &self.ledger;
        let reason = source.to_string();
        match retry_transient(self.backoff, "pending enqueue", || ledger.enqueue_pending(event, &reason, now)).await {
            Ok(()) => {
                error!(
                    campaign_id = %event.campaign_id,
                    key = %event.idempotency_key,
                    error = %source,
                    "charge failed after retries, queued for reconciliation"
                );
                true
            }
            Err(e) => {
                error!(
                    campaign_id = %event.campaign_id,
                    key = %event.idempotency_key,
                    error = %source,
                    queue_error = %e,
                    "charge failed and could not be queued"
                );
                false
            }
        }
    }
}

fn validate(event: &ChargeEvent) -> Result<(), ChargeError> {
    if event.amount_cents <= 0 {
        return Err(ChargeError::InvalidEvent(format!(
            "amount must be positive, got {}",
            event.amount_cents
        )));
    }
    if event.idempotency_key.trim().is_empty() {
        return Err(ChargeError::InvalidEvent("missing idempotency key".to_string()));
    }
    if event.campaign_id.is_empty() || event.broker_id.is_empty() {
        return Err(ChargeError::InvalidEvent("missing campaign or broker id".to_string()));
    }
    Ok(())
}

fn log_outcome(event: &ChargeEvent, outcome: &ChargeOutcome) {
    match outcome.rejection {
        None => debug!(
            campaign_id = %event.campaign_id,
            amount_cents = event.amount_cents,
            "charge applied"
        ),
        Some(ChargeRejection::AlreadyProcessed) => debug!(
            key = %event.idempotency_key,
            "duplicate charge ignored"
        ),
        Some(reason) => info!(
            campaign_id = %event.campaign_id,
            reason = %reason,
            flagged = reason.needs_review(),
            "charge not applied"
        ),
    }
    if outcome.exhausted {
        info!(campaign_id = %event.campaign_id, "campaign budget exhausted");
    }
}
