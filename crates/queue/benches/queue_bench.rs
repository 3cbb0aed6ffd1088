use criterion::{Criterion, criterion_group, criterion_main};
use queue::{InMemoryJobQueue, JobQueue, QueueConfig};
use serde_json::json;

fn bench_enqueue_lease_ack(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("queue/enqueue_lease_ack", |b| {
        let queue = InMemoryJobQueue::new(QueueConfig::default());
        let mut n: u64 = 0;
        b.iter(|| {
            rt.block_on(async {
                n += 1;
                let key = format!("order:bench:{n}");
                queue
                    .enqueue("process-order", json!({"raw_event_id": n}), &key)
                    .await
                    .unwrap();
                let job = queue.lease().await.unwrap().unwrap();
                queue.ack(job.id).await.unwrap();
            });
        });
    });
}

fn bench_duplicate_enqueue(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let queue = InMemoryJobQueue::new(QueueConfig::default());
    rt.block_on(async {
        queue
            .enqueue("process-order", json!({"raw_event_id": 1}), "order:bench:dup")
            .await
            .unwrap();
    });

    c.bench_function("queue/duplicate_enqueue", |b| {
        b.iter(|| {
            rt.block_on(async {
                queue
                    .enqueue("process-order", json!({"raw_event_id": 1}), "order:bench:dup")
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_enqueue_lease_ack, bench_duplicate_enqueue);
criterion_main!(benches);
