//! Impression and click reporting.
//!
//! Impressions only advance the visitor's frequency counter. Clicks also
//! advance it and then charge the campaign's bid through the charge
//! processor. Both are keyed by the event's idempotency key, so a redelivered
//! event neither counts nor charges twice.

use crate::charge::{ChargeError, ChargeProcessor};
use crate::frequency::FrequencyFilter;
use chrono::{DateTime, Utc};
use placement_core::{AppConfig, EventKind, TrackingEvent, TrackingResponse};
use tokio::sync::watch;

#[derive(Clone)]
pub struct EventTracker {
    frequency: FrequencyFilter,
    charges: ChargeProcessor,
    config: watch::Receiver<AppConfig>,
}

impl EventTracker {
    #[must_use]
    pub fn new(
        frequency: FrequencyFilter,
        charges: ChargeProcessor,
        config: watch::Receiver<AppConfig>,
    ) -> Self {
        Self {
            frequency,
            charges,
            config,
        }
    }

    /// Records an impression. `applied` is false if the key was already
    /// counted or the counter could not be written.
    ///
    /// # Errors
    /// Returns `InvalidEvent` if the event is not an impression.
    pub async fn report_impression(&self, event: &TrackingEvent, now: DateTime<Utc>) -> Result<TrackingResponse, ChargeError> {
        if event.event_kind != EventKind::Impression {
            return Err(ChargeError::InvalidEvent("expected an impression".to_string()));
        }
        validate(event)?;
        let applied = self.touch(event, now).await;
        Ok(TrackingResponse { applied })
    }

    /// Records a click and charges the campaign's current bid.
    ///
    /// `applied` reports whether money moved. Duplicate keys, budget caps, and
    /// featured campaigns all answer `applied: false`.
    ///
    /// # Errors
    /// Propagates `ChargeError`; `Store` errors are safe to retry with the same key.
    pub async fn report_click(&self, event: &TrackingEvent, now: DateTime<Utc>) -> Result<TrackingResponse, ChargeError> {
        if event.event_kind != EventKind::Click {
            return Err(ChargeError::InvalidEvent("expected a click".to_string()));
        }
        validate(event)?;
        self.touch(event, now).await;

        let outcome = self
            .charges
            .charge_click(
                &event.campaign_id,
                &event.broker_id,
                &event.idempotency_key,
                event.bid_rate_cents,
                now,
            )
            .await?;
        Ok(TrackingResponse {
            applied: outcome.applied,
        })
    }

    async fn touch(&self, event: &TrackingEvent, now: DateTime<Utc>) -> bool {
        let window = self
            .config
            .borrow()
            .allocation
            .placement(&event.placement_slug)
            .frequency_window;
        let event_key = format!("{}:{}", event.event_kind.as_str(), event.idempotency_key);
        self.frequency
            .touch(
                &event_key,
                &event.visitor_key,
                &event.placement_slug,
                &event.campaign_id,
                now,
                window,
            )
            .await
    }
}

fn validate(event: &TrackingEvent) -> Result<(), ChargeError> {
    if event.campaign_id.is_empty() || event.placement_slug.is_empty() || event.visitor_key.is_empty() {
        return Err(ChargeError::InvalidEvent(
            "campaign, placement, and visitor are required".to_string(),
        ));
    }
    if event.idempotency_key.trim().is_empty() {
        return Err(ChargeError::InvalidEvent("missing idempotency key".to_string()));
    }
    Ok(())
}
