//! End-to-end pipeline tests over mocked dependencies.
//!
//! Style: MOCK the boundaries, run the FUNCTION under test, assert the
//! OUTPUT. No network, no API keys.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use trustlens_common::{
    Config, DateRange, HealthCategory, ResearchError, ResearchRequest, ResearchStage,
    VerificationOptions,
};

use crate::aggregator::TIMEOUT_SCORE;
use crate::cache::MemoryCache;
use crate::discovery::DiscoveryStage;
use crate::service::{InfluencerLookup, ResearchService};
use crate::testing::{
    candidate_claim, content_item, test_config, wait_for_terminal, FailingCache, MockExtractor,
    MockGateway, MockVerifier, ResearchErrorKind, VerifyBehavior,
};

fn build_service(
    config: Config,
    gateway: MockGateway,
    extractor: MockExtractor,
    verifier: MockVerifier,
) -> (ResearchService, Arc<MockGateway>, Arc<MockExtractor>, Arc<MockVerifier>) {
    let gateway = Arc::new(gateway);
    let extractor = Arc::new(extractor);
    let verifier = Arc::new(verifier);
    let service = ResearchService::with_deps(
        config,
        Arc::new(MemoryCache::new()),
        gateway.clone(),
        extractor.clone(),
        verifier.clone(),
    );
    (service, gateway, extractor, verifier)
}

#[tokio::test]
async fn completes_pipeline_with_full_progress_log() {
    // MOCK: two content items, default extraction, every claim verified.
    let gateway = MockGateway::new().on_subject(
        "Dr. Example",
        vec![
            content_item("creatine improves recovery", 10),
            content_item("magnesium fixes sleep", 20),
        ],
    );
    let (service, ..) = build_service(test_config(), gateway, MockExtractor::new(), MockVerifier::new());

    // FUNCTION
    let request = ResearchRequest::builder().influencer_name("Dr. Example").build();
    let outcome = service.submit_research(request).await.unwrap();
    assert!(outcome.created);
    let status = wait_for_terminal(&service, &outcome.subject_key).await;

    // OUTPUT: terminal complete, stages in order, one history point today.
    assert_eq!(status.stage, ResearchStage::Complete);
    let stages: Vec<ResearchStage> = status.progress.iter().map(|p| p.stage).collect();
    assert_eq!(
        stages,
        vec![
            ResearchStage::Queued,
            ResearchStage::GatheringContent,
            ResearchStage::ExtractingClaims,
            ResearchStage::VerifyingClaims,
            ResearchStage::Aggregating,
            ResearchStage::Complete,
        ]
    );
    for pair in status.progress.windows(2) {
        assert!(pair[0].at <= pair[1].at, "progress timestamps must not regress");
        assert!(
            pair[0].stage.position() < pair[1].stage.position(),
            "stages must advance strictly forward"
        );
    }

    let snapshot = status.result.expect("completed job must carry a snapshot");
    assert_eq!(snapshot.id, "dr.-example");
    assert_eq!(snapshot.claims.len(), 2);
    assert!((0.0..=100.0).contains(&snapshot.current_trust_score));
    assert!((snapshot.current_trust_score - 80.0).abs() < 1e-6);
    assert_eq!(snapshot.trust_score_history.len(), 1);
    assert_eq!(snapshot.trust_score_history[0].date, Utc::now().date_naive());
    assert!(!snapshot.from_cache);
}

#[tokio::test]
async fn resubmission_attaches_to_inflight_job() {
    // MOCK: verification hangs so the job stays in flight.
    let gateway = MockGateway::new()
        .on_subject("Dr. Example", vec![content_item("claim one", 5)]);
    let extractor = MockExtractor::new().on_subject("Dr. Example", vec![candidate_claim("slow")]);
    let verifier = MockVerifier::new().on_claim("slow", VerifyBehavior::Hang);
    let mut config = test_config();
    config.stage_retries = 1;
    let (service, gateway, ..) = build_service(config, gateway, extractor, verifier);

    // FUNCTION: submit the same request twice while the first runs.
    let first = service
        .submit_research(ResearchRequest::builder().influencer_name("Dr. Example").build())
        .await
        .unwrap();
    let second = service
        .submit_research(ResearchRequest::builder().influencer_name("Dr. Example").build())
        .await
        .unwrap();

    // OUTPUT: one job, one pipeline, one upstream fetch.
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.job_id, second.job_id);
    assert_eq!(first.subject_key, second.subject_key);

    let status = wait_for_terminal(&service, &first.subject_key).await;
    assert_eq!(status.stage, ResearchStage::Complete);
    assert_eq!(gateway.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cached_snapshot_short_circuits_second_run() {
    let gateway = MockGateway::new()
        .on_subject("Dr. Example", vec![content_item("claim one", 5)]);
    let (service, gateway, ..) =
        build_service(test_config(), gateway, MockExtractor::new(), MockVerifier::new());

    let request = || ResearchRequest::builder().influencer_name("Dr. Example").build();
    let first = service.submit_research(request()).await.unwrap();
    let first_status = wait_for_terminal(&service, &first.subject_key).await;
    let original = first_status.result.unwrap();
    let fetches_after_first = gateway.fetch_calls.load(std::sync::atomic::Ordering::SeqCst);

    // FUNCTION: identical resubmission after completion.
    let second = service.submit_research(request()).await.unwrap();

    // OUTPUT: served from cache, no new pipeline, no upstream calls,
    // snapshot identical apart from the cache flag.
    assert!(!second.created);
    let second_status = wait_for_terminal(&service, &second.subject_key).await;
    let mut cached = second_status.result.unwrap();
    assert!(cached.from_cache);
    cached.from_cache = original.from_cache;
    assert_eq!(
        serde_json::to_value(&cached).unwrap(),
        serde_json::to_value(&original).unwrap()
    );
    assert_eq!(
        gateway.fetch_calls.load(std::sync::atomic::Ordering::SeqCst),
        fetches_after_first
    );
}

#[tokio::test]
async fn hung_claim_is_isolated_as_questionable() {
    // MOCK: ten claims, one of which never returns.
    let claims: Vec<_> = (0..10)
        .map(|i| candidate_claim(&format!("claim {i}")))
        .collect();
    let gateway = MockGateway::new()
        .on_subject("Dr. Example", vec![content_item("post", 1)]);
    let extractor = MockExtractor::new().on_subject("Dr. Example", claims);
    let verifier = MockVerifier::new().on_claim("claim 4", VerifyBehavior::Hang);
    let mut config = test_config();
    config.stage_retries = 1;
    let (service, ..) = build_service(config, gateway, extractor, verifier);

    let outcome = service
        .submit_research(ResearchRequest::builder().influencer_name("Dr. Example").build())
        .await
        .unwrap();
    let status = wait_for_terminal(&service, &outcome.subject_key).await;

    // OUTPUT: batch completes, input order is preserved, the hung claim
    // is questionable with no citations and the timeout score.
    assert_eq!(status.stage, ResearchStage::Complete);
    let snapshot = status.result.unwrap();
    assert_eq!(snapshot.claims.len(), 10);
    for (i, claim) in snapshot.claims.iter().enumerate() {
        assert_eq!(claim.text, format!("claim {i}"));
    }
    let hung = &snapshot.claims[4];
    assert_eq!(hung.status, trustlens_common::ClaimStatus::Questionable);
    assert!(hung.citations.is_empty());
    assert!((hung.trust_score - TIMEOUT_SCORE).abs() < 1e-6);
}

#[tokio::test]
async fn transient_outage_is_retried_to_success() {
    // MOCK: first two content fetches fail, the third succeeds.
    let gateway = MockGateway::new()
        .on_subject("Flaky Subject", vec![content_item("claim", 3)])
        .transient_failures("Flaky Subject", 2);
    let (service, gateway, ..) =
        build_service(test_config(), gateway, MockExtractor::new(), MockVerifier::new());

    let outcome = service
        .submit_research(ResearchRequest::builder().influencer_name("Flaky Subject").build())
        .await
        .unwrap();
    let status = wait_for_terminal(&service, &outcome.subject_key).await;

    assert_eq!(status.stage, ResearchStage::Complete);
    assert_eq!(gateway.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_retries_fail_the_job_with_detail() {
    let gateway =
        MockGateway::new().fail_subject("Gone Subject", ResearchErrorKind::UpstreamUnavailable);
    let (service, gateway, ..) =
        build_service(test_config(), gateway, MockExtractor::new(), MockVerifier::new());

    let outcome = service
        .submit_research(ResearchRequest::builder().influencer_name("Gone Subject").build())
        .await
        .unwrap();
    let status = wait_for_terminal(&service, &outcome.subject_key).await;

    // OUTPUT: failed after the full retry budget, progress retained.
    assert_eq!(status.stage, ResearchStage::Failed);
    assert!(status.result.is_none());
    let detail = status.error_detail.expect("failed job must explain itself");
    assert!(detail.contains("Upstream unavailable"));
    assert_eq!(gateway.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    assert!(status
        .progress
        .iter()
        .any(|p| p.stage == ResearchStage::GatheringContent));
}

#[tokio::test]
async fn no_content_fails_without_retry() {
    // MOCK: gateway knows nothing about the subject.
    let (service, gateway, ..) = build_service(
        test_config(),
        MockGateway::new(),
        MockExtractor::new(),
        MockVerifier::new(),
    );

    let outcome = service
        .submit_research(ResearchRequest::builder().influencer_name("Unknown Person").build())
        .await
        .unwrap();
    let status = wait_for_terminal(&service, &outcome.subject_key).await;

    assert_eq!(status.stage, ResearchStage::Failed);
    assert!(status.error_detail.unwrap().contains("No content found"));
    // No-content is not transient, so exactly one fetch.
    assert_eq!(gateway.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn extraction_failure_is_retried_once() {
    let gateway = MockGateway::new()
        .on_subject("Dr. Example", vec![content_item("claim", 3)]);
    let extractor = MockExtractor::new().fail_times(1);
    let (service, _, extractor, _) =
        build_service(test_config(), gateway, extractor, MockVerifier::new());

    let outcome = service
        .submit_research(ResearchRequest::builder().influencer_name("Dr. Example").build())
        .await
        .unwrap();
    let status = wait_for_terminal(&service, &outcome.subject_key).await;

    assert_eq!(status.stage, ResearchStage::Complete);
    assert_eq!(extractor.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalid_date_range_is_rejected_at_submit() {
    let (service, gateway, ..) = build_service(
        test_config(),
        MockGateway::new(),
        MockExtractor::new(),
        MockVerifier::new(),
    );

    let now = Utc::now();
    let request = ResearchRequest::builder()
        .influencer_name("Dr. Example")
        .date_range(Some(DateRange {
            start: now,
            end: now - ChronoDuration::days(30),
        }))
        .build();

    let err = service.submit_research(request).await.unwrap_err();
    assert!(matches!(err, ResearchError::InvalidDateRange(_)));
    // Rejected before any job or upstream call exists.
    assert_eq!(gateway.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn flaky_verification_recovers_per_claim() {
    let gateway = MockGateway::new()
        .on_subject("Dr. Example", vec![content_item("post", 1)]);
    let extractor = MockExtractor::new().on_subject("Dr. Example", vec![candidate_claim("flaky")]);
    let verifier =
        MockVerifier::new().on_claim("flaky", VerifyBehavior::FlakyThenVerified(2, 70.0));
    let (service, ..) = build_service(test_config(), gateway, extractor, verifier);

    let outcome = service
        .submit_research(ResearchRequest::builder().influencer_name("Dr. Example").build())
        .await
        .unwrap();
    let status = wait_for_terminal(&service, &outcome.subject_key).await;

    assert_eq!(status.stage, ResearchStage::Complete);
    let snapshot = status.result.unwrap();
    assert_eq!(snapshot.claims[0].status, trustlens_common::ClaimStatus::Verified);
    assert!((snapshot.claims[0].trust_score - 70.0).abs() < 1e-6);
}

#[tokio::test]
async fn abort_fails_job_and_skips_cache() {
    // MOCK: a hanging verification keeps the job alive long enough to abort.
    let gateway = MockGateway::new()
        .on_subject("Dr. Example", vec![content_item("post", 1)]);
    let extractor = MockExtractor::new().on_subject("Dr. Example", vec![candidate_claim("slow")]);
    let verifier = MockVerifier::new().on_claim("slow", VerifyBehavior::Hang);
    let (service, ..) = build_service(test_config(), gateway, extractor, verifier);

    let outcome = service
        .submit_research(ResearchRequest::builder().influencer_name("Dr. Example").build())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // FUNCTION
    assert!(service.abort_research(&outcome.subject_key).await);

    // OUTPUT: terminal failure, no snapshot, nothing cached.
    let status = wait_for_terminal(&service, &outcome.subject_key).await;
    assert_eq!(status.stage, ResearchStage::Failed);
    assert!(status.result.is_none());
    assert_eq!(
        status.error_detail.as_deref(),
        Some("Aborted by operator request")
    );
    // Aborting twice is a no-op.
    assert!(!service.abort_research(&outcome.subject_key).await);

    // A fresh submission starts a new pipeline rather than hitting cache.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let again = service
        .submit_research(ResearchRequest::builder().influencer_name("Dr. Example").build())
        .await
        .unwrap();
    assert!(again.created);
    assert_ne!(again.job_id, outcome.job_id);
}

#[tokio::test]
async fn influencer_lookup_starts_research_then_serves_cache() {
    let gateway = MockGateway::new()
        .on_subject("Dr. Example", vec![content_item("post", 1)]);
    let (service, ..) =
        build_service(test_config(), gateway, MockExtractor::new(), MockVerifier::new());

    // FUNCTION: cold lookup kicks off research.
    let first = service.get_influencer("Dr. Example").await.unwrap();
    let key = trustlens_common::subject_key(
        "Dr. Example",
        None,
        &VerificationOptions::default(),
    );
    if let InfluencerLookup::InProgress(status) = &first {
        assert_eq!(status.subject_key, key);
    }
    wait_for_terminal(&service, &key).await;

    // OUTPUT: warm lookup is served from cache.
    match service.get_influencer("Dr. Example").await.unwrap() {
        InfluencerLookup::Snapshot(snapshot) => assert!(snapshot.from_cache),
        InfluencerLookup::InProgress(_) => panic!("expected a cached snapshot"),
    }
}

#[tokio::test]
async fn cache_outage_degrades_to_live_research() {
    // MOCK: every cache operation fails.
    let gateway = Arc::new(
        MockGateway::new().on_subject("Dr. Example", vec![content_item("post", 1)]),
    );
    let service = ResearchService::with_deps(
        test_config(),
        Arc::new(FailingCache),
        gateway.clone(),
        Arc::new(MockExtractor::new()),
        Arc::new(MockVerifier::new()),
    );

    // FUNCTION: submit through the broken cache.
    let request = || ResearchRequest::builder().influencer_name("Dr. Example").build();
    let first = service.submit_research(request()).await.unwrap();
    let status = wait_for_terminal(&service, &first.subject_key).await;

    // OUTPUT: the pipeline still completes with a full snapshot.
    assert_eq!(status.stage, ResearchStage::Complete);
    let snapshot = status.result.expect("completed job must carry a snapshot");
    assert!(!snapshot.from_cache);

    // Nothing was cached, so a later identical request (after the
    // registry entry is terminal) runs a fresh pipeline.
    let second = service.submit_research(request()).await.unwrap();
    assert!(second.created);
    wait_for_terminal(&service, &second.subject_key).await;
    assert_eq!(gateway.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn discovery_reports_partial_results_before_completion() {
    // MOCK: one candidate finishes in milliseconds, the other hangs in
    // verification until its per-claim timeout fires.
    let gateway = MockGateway::new()
        .on_candidates(HealthCategory::Nutrition, vec!["Fast", "Slow"])
        .on_subject("Fast", vec![content_item("fast post", 2)])
        .on_subject("Slow", vec![content_item("slow post", 2)]);
    let extractor = MockExtractor::new()
        .on_subject("Fast", vec![candidate_claim("fast claim")])
        .on_subject("Slow", vec![candidate_claim("slow claim")]);
    let verifier = MockVerifier::new().on_claim("slow claim", VerifyBehavior::Hang);
    let mut config = test_config();
    config.claim_timeout_secs = 5;
    config.stage_retries = 1;
    let (service, ..) = build_service(config, gateway, extractor, verifier);

    // FUNCTION
    let id = service
        .submit_discovery(
            vec![HealthCategory::Nutrition],
            10,
            VerificationOptions::default(),
        )
        .await;

    // A status read mid-batch already carries the fast result.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(4);
    let mid = loop {
        let job = service.discovery_status(id).await.expect("batch must exist");
        if !job.results.is_empty() {
            break job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "no partial result surfaced before the slow candidate finished"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(mid.stage, DiscoveryStage::Researching);
    assert_eq!(mid.results.len(), 1);
    assert_eq!(mid.results[0].name, "Fast");

    // OUTPUT: the batch still completes with both candidates.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let job = loop {
        let job = service.discovery_status(id).await.expect("batch must exist");
        if job.stage == DiscoveryStage::Complete {
            break job;
        }
        assert!(tokio::time::Instant::now() < deadline, "discovery did not finish");
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    assert_eq!(job.results.len(), 2);
    assert_eq!(job.excluded, 0);
}

#[tokio::test]
async fn discovery_excludes_failed_candidates_and_sorts_results() {
    // MOCK: two categories with an overlapping candidate; "Eve" has no
    // content so her research fails.
    let gateway = MockGateway::new()
        .on_candidates(HealthCategory::Nutrition, vec!["Alice", "Bob"])
        .on_candidates(HealthCategory::Fitness, vec!["bob", "Carol", "Eve"])
        .on_subject("Alice", vec![content_item("alice post", 2)])
        .on_subject("Bob", vec![content_item("bob post", 2)])
        .on_subject("Carol", vec![content_item("carol post", 2)]);
    let extractor = MockExtractor::new()
        .on_subject("Alice", vec![candidate_claim("alice claim")])
        .on_subject("Bob", vec![candidate_claim("bob claim")])
        .on_subject("Carol", vec![candidate_claim("carol claim")]);
    let verifier = MockVerifier::new()
        .on_claim("alice claim", VerifyBehavior::Verified(60.0))
        .on_claim("bob claim", VerifyBehavior::Verified(90.0))
        .on_claim("carol claim", VerifyBehavior::Verified(75.0));
    let (service, ..) = build_service(test_config(), gateway, extractor, verifier);

    // FUNCTION
    let id = service
        .submit_discovery(
            vec![HealthCategory::Nutrition, HealthCategory::Fitness],
            10,
            VerificationOptions::default(),
        )
        .await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let job = loop {
        let job = service.discovery_status(id).await.expect("batch must exist");
        if job.stage == DiscoveryStage::Complete {
            break job;
        }
        assert!(tokio::time::Instant::now() < deadline, "discovery did not finish");
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    // OUTPUT: duplicate dropped, failure excluded, results sorted by
    // trust score descending.
    assert_eq!(job.candidates.len(), 4);
    assert_eq!(job.excluded, 1);
    let names: Vec<&str> = job.results.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Bob", "Carol", "Alice"]);
}
