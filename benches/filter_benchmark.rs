//! Throughput of the CPU-bound parts of a pass: batching, decoding and
//! filtering, plus a whole pass against an instant in-memory API

use std::sync::Arc;

use chrono::{Datelike, Duration, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use profile_census_lib::crawling::{
    AgeBucket, Batcher, BucketSet, EngineSettings, FetchEngine, FilterCriteria, ResponseFilter, decode_response,
};
use profile_census_lib::domain::{AgeRange, IdSource};
use profile_census_lib::infrastructure::{FailureSink, LineSink, StatusLog};
use profile_census_lib::test_utils::{StubProfileApi, response_body, user_json};

fn criteria() -> FilterCriteria {
    FilterCriteria {
        target_city_id: 2,
        region_city_min: 100,
        region_city_max: 199,
        inactivity_days: 30,
    }
}

fn sample_body(size: u64) -> String {
    let now = Utc::now();
    let users: Vec<_> = (1..=size)
        .map(|id| {
            let city = [2, 150, 999][(id % 3) as usize];
            let seen = (now - Duration::days((id % 60) as i64)).timestamp();
            let bdate = format!("{}.{}.{}", id % 28 + 1, id % 12 + 1, now.year() - (id % 70) as i32);
            user_json(id, Some(city), Some(seen), Some(&bdate))
        })
        .collect();
    response_body(&users)
}

fn batching(c: &mut Criterion) {
    let mut group = c.benchmark_group("batcher");
    for max_key_len in [64, 1024, 4000] {
        group.bench_with_input(BenchmarkId::from_parameter(max_key_len), &max_key_len, |b, &len| {
            let batcher = Batcher::new(len);
            b.iter(|| {
                let mut source = IdSource::range(1_000_000, 1_100_000);
                let mut batches = 0;
                while let Some(batch) = batcher.take_batch(&mut source) {
                    batches += black_box(batch).len();
                }
                batches
            });
        });
    }
    group.finish();
}

fn filtering(c: &mut Criterion) {
    let body = sample_body(1000);
    let filter = ResponseFilter::new(criteria());
    let ranges = [AgeRange::new(7, 17), AgeRange::new(18, 60)];

    c.bench_function("decode_1000", |b| b.iter(|| decode_response(black_box(&body))));

    let entries = decode_response(&body).unwrap();
    c.bench_function("filter_1000", |b| {
        b.iter(|| filter.apply(black_box(&entries), &ranges, Utc::now()))
    });
}

fn whole_pass(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let api = Arc::new(StubProfileApi::new(|ids| {
        let now = Utc::now().timestamp();
        Ok(response_body(
            &ids.iter().map(|&id| user_json(id, Some(2), Some(now), Some("1.1.1990"))).collect::<Vec<_>>(),
        ))
    }));
    let buckets = Arc::new(BucketSet::new(
        vec![AgeBucket::new(
            "adults",
            AgeRange::new(18, 60),
            Arc::new(LineSink::from_writer("adults", std::io::sink())),
        )],
        None,
    ));
    let engine = FetchEngine::new(
        api,
        ResponseFilter::new(criteria()),
        buckets,
        Arc::new(StatusLog::from_writer(std::io::sink())),
        EngineSettings {
            concurrency: 16,
            max_batch_key_len: 1000,
        },
    );

    c.bench_function("pass_10000_ids", |b| {
        b.to_async(&runtime).iter(|| async {
            let failures = Arc::new(FailureSink::from_writer("failures", std::io::sink()));
            engine.run_pass(1, IdSource::range(1, 10_000), failures).await
        });
    });
}

criterion_group!(benches, batching, filtering, whole_pass);
criterion_main!(benches);
