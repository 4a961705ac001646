//! Multi-pass retry behavior and the on-disk failure lists it leaves behind
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{Datelike, Utc};

use profile_census_lib::crawling::{
    AgeBucket, BucketSet, EngineSettings, FetchEngine, FetchError, FilterCriteria, ResponseFilter, RetryOrchestrator,
    RetryPolicy,
};
use profile_census_lib::domain::{AgeRange, IdSource, UserId};
use profile_census_lib::infrastructure::{AppConfig, LineSink, StatusLog, read_failure_list};
use profile_census_lib::test_utils::{MemoryWriter, StubProfileApi, response_body, user_json};

fn adult(id: UserId) -> serde_json::Value {
    let bdate = format!("1.1.{}", Utc::now().year() - 33);
    user_json(id, Some(2), Some(Utc::now().timestamp()), Some(&bdate))
}

fn orchestrator(api: Arc<StubProfileApi>, dir: &Path, retries: u32, adults: &MemoryWriter) -> RetryOrchestrator {
    let buckets = BucketSet::new(
        vec![AgeBucket::new(
            "adults",
            AgeRange::new(18, 60),
            Arc::new(LineSink::from_writer("adults", adults.clone())),
        )],
        None,
    );
    let engine = FetchEngine::new(
        api,
        ResponseFilter::new(FilterCriteria {
            target_city_id: 2,
            region_city_min: 100,
            region_city_max: 199,
            inactivity_days: 30,
        }),
        Arc::new(buckets),
        Arc::new(StatusLog::from_writer(MemoryWriter::default())),
        EngineSettings {
            concurrency: 3,
            max_batch_key_len: 6,
        },
    );
    RetryOrchestrator::new(
        engine,
        RetryPolicy {
            failure_dir: dir.to_path_buf(),
            failure_file_prefix: "failed".into(),
            max_retry_attempts: retries,
        },
    )
}

#[tokio::test]
async fn flaky_batches_succeed_on_the_second_pass() {
    // Batches holding a multiple of 3 fail the first time any of them is seen
    let seen = Mutex::new(HashSet::new());
    let api = Arc::new(StubProfileApi::new(move |ids| {
        let mut seen = seen.lock().unwrap();
        let fresh_multiple = ids.iter().any(|id| id % 3 == 0 && !seen.contains(id));
        seen.extend(ids.iter().copied());
        if fresh_multiple {
            Err(FetchError::Transport("timed out".into()))
        } else {
            Ok(response_body(&ids.iter().map(|&id| adult(id)).collect::<Vec<_>>()))
        }
    }));
    let dir = tempfile::tempdir().unwrap();
    let adults = MemoryWriter::default();

    let summary = orchestrator(api, dir.path(), 3, &adults)
        .run(IdSource::range(1, 30))
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.passes.len(), 2);
    let first = &summary.passes[0];
    assert_eq!(first.processed(), 30);
    assert!(first.failed > 0);

    // Pass 2 replays exactly what pass 1 wrote, in file order
    let failed_1 = read_failure_list(&dir.path().join("failed_1.txt")).unwrap();
    assert_eq!(failed_1.len() as u64, first.failed);
    assert_eq!(summary.passes[1].total, failed_1.len());
    assert!(read_failure_list(&dir.path().join("failed_2.txt")).unwrap().is_empty());
    assert!(!dir.path().join("failed_3.txt").exists());

    let mut written: Vec<UserId> = adults
        .contents()
        .lines()
        .map(|line| line.split(';').next().unwrap().parse().unwrap())
        .collect();
    written.sort_unstable();
    assert_eq!(written, (1..=30).collect::<Vec<_>>());
}

#[tokio::test]
async fn panicking_batches_are_retried_like_any_failure() {
    let seen = Mutex::new(HashSet::new());
    let api = Arc::new(StubProfileApi::new(move |ids| {
        let first_sighting = seen.lock().unwrap().insert(ids[0]);
        if first_sighting && ids.contains(&4) {
            panic!("filter overflow");
        }
        Ok(response_body(&ids.iter().map(|&id| adult(id)).collect::<Vec<_>>()))
    }));
    let dir = tempfile::tempdir().unwrap();
    let adults = MemoryWriter::default();

    let summary = orchestrator(api, dir.path(), 3, &adults)
        .run(IdSource::range(1, 10))
        .await
        .unwrap();

    assert_eq!(summary.passes.len(), 2);
    assert_eq!(summary.passes[0].processed(), 10);
    assert!(summary.passes[0].failed > 0);
    assert_eq!(summary.unaccounted(), 0);
    assert!(summary.is_complete());
    assert_eq!(adults.contents().lines().count(), 10);
}

#[tokio::test]
async fn exhausted_retries_leave_the_last_failure_list() {
    let api = Arc::new(StubProfileApi::new(|_| Err(FetchError::HttpStatus {
        status: 503,
        url: "http://api".into(),
    })));
    let dir = tempfile::tempdir().unwrap();
    let adults = MemoryWriter::default();

    let summary = orchestrator(Arc::clone(&api), dir.path(), 2, &adults)
        .run(IdSource::range(1, 10))
        .await
        .unwrap();

    assert_eq!(summary.passes.len(), 3);
    assert!(!summary.is_complete());
    assert_eq!(summary.outstanding_failures, 10);
    assert_eq!(summary.final_failure_file(), Some(dir.path().join("failed_3.txt").as_path()));
    for pass in 1..=3 {
        let ids = read_failure_list(&dir.path().join(format!("failed_{pass}.txt"))).unwrap();
        assert_eq!(ids.len(), 10, "pass {pass}");
    }
    assert!(adults.contents().is_empty());
}

#[test]
fn zero_retry_budget_runs_a_single_pass() {
    let api = Arc::new(StubProfileApi::new(|_| Err(FetchError::Transport("down".into()))));
    let dir = tempfile::tempdir().unwrap();
    let adults = MemoryWriter::default();

    let summary = tokio_test::block_on(orchestrator(api, dir.path(), 0, &adults).run(IdSource::range(1, 5))).unwrap();

    assert_eq!(summary.passes.len(), 1);
    assert_eq!(summary.outstanding_failures, 5);
    assert!(!dir.path().join("failed_2.txt").exists());
}

#[tokio::test]
async fn full_run_writes_csv_outputs_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.output.directory = dir.path().to_path_buf();
    config.crawl.max_user_id = 12;
    config.crawl.concurrency = 2;
    config.crawl.max_batch_key_len = 9;

    let api = Arc::new(StubProfileApi::new(|ids| {
        Ok(response_body(&ids.iter().map(|&id| adult(id)).collect::<Vec<_>>()))
    }));
    let summary = profile_census_lib::run_census(&config, api).await.unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.records_written(), 12);
    let adults = std::fs::read_to_string(dir.path().join("adults.csv")).unwrap();
    assert_eq!(adults.lines().next(), Some(profile_census_lib::domain::CSV_HEADER));
    assert_eq!(adults.lines().count(), 13);
    let children = std::fs::read_to_string(dir.path().join("children.csv")).unwrap();
    assert_eq!(children.lines().count(), 1);
    let combined = std::fs::read_to_string(dir.path().join("all.csv")).unwrap();
    assert_eq!(combined.lines().count(), 13);
    assert!(std::fs::read_to_string(dir.path().join("failed_1.txt")).unwrap().is_empty());
    assert!(std::fs::read_to_string(dir.path().join("status.log")).unwrap().contains("Pass 1 finished"));
}
