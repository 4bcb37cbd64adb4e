mod common;

use common::{Behavior, MockBackend, UnreachableCache, memory_cache, worker, worker_with};
use impact_accelerator::cache::{CacheSettings, SharedCache};
use impact_accelerator::upstream::{UpstreamClient, UpstreamSettings};
use impact_accelerator::worker::MAX_BATCH_ITEMS;
use impact_accelerator::{AnalysisError, Priority, ProductSignature, Provenance};
use std::sync::Arc;
use std::time::Duration;

fn cola() -> ProductSignature {
    ProductSignature::new("Cola", "Beverages")
}

fn assert_valid(result: &impact_accelerator::AnalysisResult) {
    assert!(result.sustainability_score <= 100);
    assert!(result.carbon_footprint.total >= 0.0);
    assert!(result.water_usage.total >= 0.0);
    let carbon = &result.carbon_footprint;
    assert!((carbon.breakdown.sum() - carbon.total).abs() <= carbon.total * 0.02 + 0.001);
}

#[tokio::test]
async fn concurrent_duplicates_share_one_upstream_call() {
    let backend = MockBackend::with_delay(Behavior::Succeed, Duration::from_millis(50));
    let worker = worker(backend.clone());

    let same_product = ProductSignature::new("  COLA ", "beverages");
    let cola_product = cola();
    let (first, second) = tokio::join!(
        worker.submit(&cola_product, Priority::Normal),
        worker.submit(&same_product, Priority::Normal)
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(backend.calls(), 1);
    assert_eq!(first.result, second.result);
    assert_eq!(first.result.provenance, Provenance::Upstream);

    let third = worker.submit(&cola(), Priority::High).await.unwrap();
    assert!(third.cached);
    assert_eq!(third.result, first.result);
    assert_eq!(backend.calls(), 1);
    assert_eq!(worker.pending_keys(), 0);
}

#[tokio::test]
async fn cache_is_shared_between_workers() {
    let cache = memory_cache();
    let backend = MockBackend::new(Behavior::Succeed);
    let a = worker_with(cache.clone(), backend.clone(), Duration::from_secs(5));
    let b = worker_with(cache, backend.clone(), Duration::from_secs(5));

    assert!(!a.submit(&cola(), Priority::Normal).await.unwrap().cached);
    let from_b = b.submit(&cola(), Priority::Normal).await.unwrap();
    assert!(from_b.cached);
    assert_eq!(from_b.result.worker.as_deref(), Some("w0.0"));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn upstream_error_resolves_with_fallback() {
    let backend = MockBackend::new(Behavior::Fail(503));
    let worker = worker(backend.clone());

    let first = worker.submit(&cola(), Priority::Normal).await.unwrap();
    assert_eq!(first.result.provenance, Provenance::Fallback);
    assert_valid(&first.result);

    // fallbacks are never cached, so the upstream is tried again
    let second = worker.submit(&cola(), Priority::Normal).await.unwrap();
    assert!(!second.cached);
    assert_eq!(backend.calls(), 2);
    assert_eq!(worker.stats().fallbacks, 2);
}

#[tokio::test]
async fn upstream_timeout_resolves_with_fallback() {
    let backend = MockBackend::new(Behavior::Hang);
    let worker = worker_with(memory_cache(), backend, Duration::from_millis(50));

    let result = worker.submit(&cola(), Priority::Normal).await.unwrap().result;
    assert_eq!(result.provenance, Provenance::Fallback);
    assert_valid(&result);
}

#[tokio::test]
async fn unreachable_cache_still_resolves() {
    let cache = SharedCache::new(
        Arc::new(UnreachableCache),
        CacheSettings {
            op_timeout: Duration::from_millis(100),
            ..CacheSettings::default()
        },
    );
    let backend = MockBackend::new(Behavior::Succeed);
    let worker = worker_with(cache, backend.clone(), Duration::from_secs(5));

    let first = worker.submit(&cola(), Priority::Normal).await.unwrap();
    assert_eq!(first.result.provenance, Provenance::Upstream);
    assert!(!first.cached);
    assert_valid(&first.result);

    let second = worker.submit(&cola(), Priority::Normal).await.unwrap();
    assert!(!second.cached);
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn cola_with_unreachable_upstream() {
    // grab a free port and release it so nothing is listening there
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let client = UpstreamClient::new(UpstreamSettings {
        url: format!("http://127.0.0.1:{port}/api/generate"),
        ..UpstreamSettings::default()
    })
    .unwrap();
    let worker = worker_with(memory_cache(), Arc::new(client), Duration::from_secs(2));

    let result = worker.submit(&cola(), Priority::Normal).await.unwrap().result;
    assert_eq!(result.provenance, Provenance::Fallback);
    assert!((0.1..=0.5).contains(&result.carbon_footprint.per_unit));
    assert!((0.3..=3.0).contains(&result.environmental_equivalents.water_in_gallons));
}

#[tokio::test]
async fn oversized_batch_rejected_before_queueing() {
    let backend = MockBackend::new(Behavior::Succeed);
    let worker = worker(backend.clone());
    let products: Vec<ProductSignature> = (0..12)
        .map(|i| ProductSignature::new(&format!("item {i}"), "Snacks"))
        .collect();

    let err = worker.submit_batch(products).await.unwrap_err();
    assert_eq!(
        err,
        AnalysisError::TooManyItems {
            count: 12,
            limit: MAX_BATCH_ITEMS
        }
    );
    assert_eq!(backend.calls(), 0);
    assert_eq!(worker.queue_len(), 0);
    assert_eq!(worker.stats().requests, 0);
}

#[tokio::test]
async fn batch_reports_partial_failure_in_place() {
    let backend = MockBackend::new(Behavior::Succeed);
    let worker = worker(backend.clone());
    let products = vec![
        cola(),
        ProductSignature::default().with_brand("NoName"),
        ProductSignature::new("Oat Milk", "Dairy Alternatives"),
    ];

    let outcomes = worker.submit_batch(products).await.unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].outcome.is_ok());
    assert!(matches!(
        outcomes[1].outcome,
        Err(AnalysisError::InvalidRequest(_))
    ));
    assert_eq!(outcomes[1].product.brand, "NoName");
    assert!(outcomes[2].outcome.is_ok());
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn request_without_name_or_category_is_invalid() {
    let backend = MockBackend::new(Behavior::Succeed);
    let worker = worker(backend.clone());
    let blank = ProductSignature::new("   ", "").with_ingredients(&["sugar"]);

    let err = worker.submit(&blank, Priority::High).await.unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidRequest(_)));
    assert_eq!(backend.calls(), 0);
    assert_eq!(worker.queue_len(), 0);
}

#[tokio::test]
async fn deep_submission_never_exceeds_five_in_flight() {
    use async_trait::async_trait;
    use impact_accelerator::error::UpstreamError;
    use impact_accelerator::upstream::{InferenceBackend, RawResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Gauge {
        now: AtomicUsize,
        peak: AtomicUsize,
        total: AtomicUsize,
    }

    #[async_trait]
    impl InferenceBackend for Gauge {
        async fn invoke(&self, _p: &str, _t: Duration) -> Result<RawResponse, UpstreamError> {
            let now = self.now.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.total.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.now.fetch_sub(1, Ordering::SeqCst);
            Ok(RawResponse {
                model: None,
                text: common::REPORT.to_string(),
            })
        }
    }

    let gauge = Arc::new(Gauge::default());
    let worker = worker(gauge.clone());
    let products: Vec<ProductSignature> = (0..23)
        .map(|i| ProductSignature::new(&format!("product {i}"), "Household"))
        .collect();
    let results =
        futures_util::future::join_all(products.iter().map(|p| worker.submit(p, Priority::Normal)))
            .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(gauge.total.load(Ordering::SeqCst), 23);
    assert!(gauge.peak.load(Ordering::SeqCst) <= 5);
    assert_eq!(worker.stats().dispatch_cycles, 5);
}
