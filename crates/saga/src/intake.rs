//! Webhook intake: records the raw event and enqueues saga work.
//!
//! The intake path does the minimum synchronous work. It persists the raw
//! delivery for audit, filters events the saga can never process, and hands
//! everything else to the queue. Every outcome is a success from the
//! delivering platform's point of view.

use common::RecordId;
use domain::{OrderEvent, RawEvent};
use queue::JobQueue;
use serde::{Deserialize, Serialize};
use store::{Inserted, PipelineStore};

use crate::error::Result;

/// Job name for order-processing saga runs.
pub const PROCESS_ORDER_JOB: &str = "process-order";

/// Idempotency key collapsing re-deliveries of the same order.
pub fn order_job_key(shop: &str, external_order_id: i64) -> String {
    format!("order:{shop}:{external_order_id}")
}

/// Payload of a saga job. Carries only the raw event reference; the worker
/// re-reads authoritative state from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaJobPayload {
    pub raw_event_id: RecordId,
}

/// How one inbound delivery was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeResult {
    /// A saga job was enqueued (or collapsed into one already in flight).
    Enqueued { raw_event_id: RecordId },
    /// A delivery with the same dedup key was already recorded.
    Duplicate,
    /// The payload could not be parsed; recorded and closed out.
    Malformed,
    /// No contact phone anywhere in the payload; recorded and closed out.
    NoPhone,
}

/// Accepts inbound webhook deliveries.
pub struct EventIntake<S, Q>
where
    S: PipelineStore,
    Q: JobQueue,
{
    store: S,
    queue: Q,
}

impl<S, Q> EventIntake<S, Q>
where
    S: PipelineStore,
    Q: JobQueue,
{
    pub fn new(store: S, queue: Q) -> Self {
        Self { store, queue }
    }

    /// Ingests one delivery.
    ///
    /// The raw event is always written first so even rejected payloads
    /// leave an audit trail. Deliveries the saga can never act on are
    /// marked processed immediately with an explanatory note instead of
    /// entering the queue.
    #[tracing::instrument(skip(self, payload), fields(%shop, %topic, %dedup_key))]
    pub async fn ingest(
        &self,
        payload: serde_json::Value,
        dedup_key: &str,
        shop: &str,
        topic: &str,
    ) -> Result<IntakeResult> {
        let raw = RawEvent::new(dedup_key, shop, topic, payload.clone());
        let raw = match self.store.insert_raw_event(raw).await? {
            Inserted::Created(raw) => raw,
            Inserted::Existing(_) => {
                metrics::counter!("intake_duplicates_total").increment(1);
                tracing::info!("duplicate delivery ignored");
                return Ok(IntakeResult::Duplicate);
            }
        };

        let resolved = match OrderEvent::from_value(&payload).and_then(OrderEvent::resolve) {
            Ok(resolved) => resolved,
            Err(e) => {
                metrics::counter!("intake_rejected_total", "reason" => "malformed").increment(1);
                tracing::warn!(error = %e, "rejecting malformed delivery");
                self.store
                    .mark_raw_event_processed(raw.id, Some(&format!("malformed: {e}")))
                    .await?;
                return Ok(IntakeResult::Malformed);
            }
        };

        if resolved.event.contact_phone().is_none() {
            metrics::counter!("intake_rejected_total", "reason" => "no_phone").increment(1);
            tracing::info!(
                order = %resolved.order_label(),
                "no contact phone in delivery, nothing to process"
            );
            self.store
                .mark_raw_event_processed(raw.id, Some("no contact phone"))
                .await?;
            return Ok(IntakeResult::NoPhone);
        }

        let job_payload = serde_json::to_value(SagaJobPayload {
            raw_event_id: raw.id,
        })
        .map_err(store::StoreError::Serialization)?;
        let outcome = self
            .queue
            .enqueue(
                PROCESS_ORDER_JOB,
                job_payload,
                &order_job_key(shop, resolved.external_order_id),
            )
            .await?;

        // A collapsed delivery's job already carries an earlier raw event
        // id, so the worker will never stamp this row; close it out here.
        if !outcome.was_created() {
            self.store
                .mark_raw_event_processed(raw.id, Some("collapsed into pending order job"))
                .await?;
        }

        metrics::counter!("intake_enqueued_total").increment(1);
        tracing::info!(
            order = %resolved.order_label(),
            new_job = outcome.was_created(),
            "delivery accepted"
        );
        Ok(IntakeResult::Enqueued {
            raw_event_id: raw.id,
        })
    }
}
