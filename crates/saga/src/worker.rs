//! Worker pool: leases saga jobs and drives them through the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use queue::{JobQueue, NackOutcome};
use store::PipelineStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::intake::SagaJobPayload;
use crate::orchestrator::SagaOrchestrator;
use crate::services::minting::MintingService;
use crate::services::notification::NotificationService;
use crate::services::wallet::WalletService;

const IDLE_POLL: Duration = Duration::from_millis(250);

/// A running pool of saga workers.
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `concurrency` workers sharing one queue and orchestrator.
    pub fn spawn<S, Q, N, W, M>(
        store: S,
        queue: Q,
        orchestrator: Arc<SagaOrchestrator<S, N, W, M>>,
        concurrency: usize,
    ) -> Self
    where
        S: PipelineStore + Clone + Send + Sync + 'static,
        Q: JobQueue + Clone + Send + Sync + 'static,
        N: NotificationService + 'static,
        W: WalletService + 'static,
        M: MintingService + 'static,
    {
        let (shutdown, _) = watch::channel(false);
        let handles = (0..concurrency.max(1))
            .map(|worker_id| {
                let store = store.clone();
                let queue = queue.clone();
                let orchestrator = Arc::clone(&orchestrator);
                let mut shutdown_rx = shutdown.subscribe();
                tokio::spawn(async move {
                    tracing::debug!(worker_id, "saga worker started");
                    loop {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        match Self::tick(&store, &queue, &orchestrator).await {
                            Ok(true) => continue,
                            Ok(false) => {
                                // Queue drained; wait for work or shutdown.
                                tokio::select! {
                                    _ = tokio::time::sleep(IDLE_POLL) => {}
                                    _ = shutdown_rx.changed() => {}
                                }
                            }
                            Err(e) => {
                                tracing::error!(worker_id, error = %e, "worker tick failed");
                                tokio::time::sleep(IDLE_POLL).await;
                            }
                        }
                    }
                    tracing::debug!(worker_id, "saga worker stopped");
                })
            })
            .collect();
        Self { shutdown, handles }
    }

    /// Leases and processes at most one job. Returns whether a job was seen.
    async fn tick<S, Q, N, W, M>(
        store: &S,
        queue: &Q,
        orchestrator: &SagaOrchestrator<S, N, W, M>,
    ) -> crate::error::Result<bool>
    where
        S: PipelineStore + Clone,
        Q: JobQueue,
        N: NotificationService,
        W: WalletService,
        M: MintingService,
    {
        let Some(job) = queue.lease().await? else {
            return Ok(false);
        };

        match orchestrator.process(&job).await {
            Ok(()) => {
                queue.ack(job.id).await?;
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, attempt = job.attempts, error = %e, fatal = e.is_fatal(), "saga job failed");
                let outcome = queue.nack(job.id, &e.to_string()).await?;
                if outcome == NackOutcome::DeadLettered {
                    metrics::counter!("pipeline_jobs_dead_lettered_total").increment(1);
                    // Surface the exhaustion on the audit row when the
                    // payload still points at one.
                    if let Ok(payload) = serde_json::from_value::<SagaJobPayload>(job.payload.clone())
                        && let Err(record_err) = store
                            .record_raw_event_error(payload.raw_event_id, &e.to_string())
                            .await
                    {
                        tracing::error!(job_id = %job.id, error = %record_err, "failed to record dead-letter on audit row");
                    }
                }
            }
        }
        Ok(true)
    }

    /// Signals shutdown and waits for every worker to finish its current job.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{EventIntake, PROCESS_ORDER_JOB};
    use crate::issuer::IdentityIssuer;
    use crate::minting::{MintingConfig, MintingCoordinator};
    use crate::services::minting::InMemoryMintingService;
    use crate::services::notification::InMemoryNotificationService;
    use crate::services::wallet::InMemoryWalletService;
    use common::RecordId;
    use domain::ProductVariant;
    use queue::{InMemoryJobQueue, QueueConfig};
    use serde_json::json;
    use store::InMemoryStore;

    const SHOP: &str = "shop.example.com";

    fn orchestrator(
        store: &InMemoryStore,
    ) -> Arc<
        SagaOrchestrator<
            InMemoryStore,
            InMemoryNotificationService,
            InMemoryWalletService,
            InMemoryMintingService,
        >,
    > {
        let coordinator = MintingCoordinator::new(
            store.clone(),
            InMemoryMintingService::new(),
            MintingConfig {
                metadata_base_url: "https://assets.example.com".into(),
                fallback_contract_address: None,
            },
        );
        let issuer = IdentityIssuer::new(store.clone(), coordinator);
        Arc::new(SagaOrchestrator::new(
            store.clone(),
            InMemoryNotificationService::new(),
            InMemoryWalletService::new(),
            issuer,
        ))
    }

    fn order_payload() -> serde_json::Value {
        json!({
            "id": 1001,
            "name": "#1001",
            "customer": { "id": 77, "phone": "+15550001111" },
            "line_items": [ { "id": 456789, "quantity": 1, "variant_id": 900 } ]
        })
    }

    async fn wait_for<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_pool_processes_enqueued_job_to_completion() {
        let store = InMemoryStore::new();
        let queue = InMemoryJobQueue::default();
        store
            .upsert_variant(ProductVariant {
                id: RecordId::new(),
                shop: SHOP.into(),
                external_id: 900,
                sku: None,
                title: "Sneaker".into(),
                brand_id: Some(RecordId::new()),
                contract_address: Some("0xabc".into()),
            })
            .await
            .unwrap();

        let intake = EventIntake::new(store.clone(), queue.clone());
        intake
            .ingest(order_payload(), "wh-1", SHOP, "orders/paid")
            .await
            .unwrap();

        let pool = WorkerPool::spawn(store.clone(), queue.clone(), orchestrator(&store), 2);
        wait_for(|| {
            let store = store.clone();
            async move { store.identity_count().await == 1 }
        })
        .await;
        pool.shutdown().await;

        let events = store.raw_events().await;
        assert!(events[0].processed);
    }

    #[tokio::test]
    async fn test_exhausted_job_is_dead_lettered_onto_audit_row() {
        let store = InMemoryStore::new();
        let queue = InMemoryJobQueue::new(QueueConfig {
            max_attempts: 2,
            stall_timeout: Duration::from_secs(60),
        });

        // A payload pointing at a missing raw event fails every attempt.
        let missing = RecordId::new();
        let raw = store
            .insert_raw_event(domain::RawEvent::new("wh-1", SHOP, "orders/paid", json!({})))
            .await
            .unwrap()
            .into_inner();
        let payload = serde_json::to_value(SagaJobPayload {
            raw_event_id: missing,
        })
        .unwrap();
        queue
            .enqueue(PROCESS_ORDER_JOB, payload, "order:shop:1")
            .await
            .unwrap();

        let pool = WorkerPool::spawn(store.clone(), queue.clone(), orchestrator(&store), 1);
        // The dead-letter error lands on the missing id, not the audit row
        // we created, so just wait for the queue to drain.
        wait_for(|| {
            let queue = queue.clone();
            async move { queue.dead_letters().len() == 1 }
        })
        .await;
        pool.shutdown().await;

        let untouched = store.get_raw_event(raw.id).await.unwrap().unwrap();
        assert_eq!(untouched.error_count, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_workers_quickly() {
        let store = InMemoryStore::new();
        let queue = InMemoryJobQueue::default();
        let pool = WorkerPool::spawn(store.clone(), queue, orchestrator(&store), 4);

        tokio::time::timeout(Duration::from_secs(2), pool.shutdown())
            .await
            .expect("shutdown should not hang");
    }

    #[tokio::test]
    async fn test_failed_job_records_error_on_audit_row_when_dead_lettered() {
        let store = InMemoryStore::new();
        let queue = InMemoryJobQueue::new(QueueConfig {
            max_attempts: 1,
            stall_timeout: Duration::from_secs(60),
        });

        // A raw event whose payload has no order id fails resolution.
        let raw = store
            .insert_raw_event(domain::RawEvent::new(
                "wh-1",
                SHOP,
                "orders/paid",
                json!({ "name": "#1" }),
            ))
            .await
            .unwrap()
            .into_inner();
        let payload = serde_json::to_value(SagaJobPayload { raw_event_id: raw.id }).unwrap();
        queue
            .enqueue(PROCESS_ORDER_JOB, payload, "order:shop:1")
            .await
            .unwrap();

        let pool = WorkerPool::spawn(store.clone(), queue.clone(), orchestrator(&store), 1);
        wait_for(|| {
            let store = store.clone();
            let id = raw.id;
            async move {
                store
                    .get_raw_event(id)
                    .await
                    .unwrap()
                    .is_some_and(|e| e.error_count > 0)
            }
        })
        .await;
        pool.shutdown().await;

        let stored = store.get_raw_event(raw.id).await.unwrap().unwrap();
        assert_eq!(stored.error_count, 1);
        assert!(stored.last_error.is_some());
    }
}
