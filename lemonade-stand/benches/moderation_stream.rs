// Copyright 2026 The Lemonade Stand Project
// SPDX-License-Identifier: Apache-2.0

//! Moderation stream throughput benchmarks.
//!
//! Measures:
//! - Detection-event parsing and blocking evaluation
//! - Full processing of a streamed completion with pacing disabled
//! - Prometheus exposition rendering
//!
//! Run: cargo bench --bench moderation_stream

use std::sync::Arc;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use futures_util::stream::{self, StreamExt};

use lemonade_stand::event::{DetectionEvent, Direction};
use lemonade_stand::metrics::MetricsAggregator;
use lemonade_stand::stream::{
    BlockingPolicy, ModerationProcessor, Pacing, StreamUpdate, WarningGatedPolicy,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const CLEAN_EVENT: &str = r#"{"choices":[{"index":0,"delta":{"content":"Fresh lemonade is made from lemons, water and sugar."}}],"detections":{"output":[{"start":0,"end":5,"text":"Fresh","results":[{"detector_id":"hap","score":0.02},{"detector_id":"language_detection","score":0.01}]}]}}"#;

const BLOCKED_EVENT: &str = r#"{"warnings":[{"type":"UNSUITABLE_INPUT","message":"Unsuitable input detected."}],"detections":{"input":[{"start":0,"end":6,"text":"apples","results":[{"detector_id":"regex_competitor","score":1.0}]}]},"choices":[]}"#;

/// SSE body with `events` clean events, split into `chunk` sized pieces.
fn sse_chunks(events: usize, chunk: usize) -> Vec<Bytes> {
    let mut body = String::new();
    for _ in 0..events {
        body.push_str("data: ");
        body.push_str(CLEAN_EVENT);
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body.as_bytes()
        .chunks(chunk)
        .map(Bytes::copy_from_slice)
        .collect()
}

fn processor() -> ModerationProcessor {
    ModerationProcessor::new(
        Arc::new(WarningGatedPolicy::default()),
        Arc::new(MetricsAggregator::new()),
        Pacing::none(),
    )
}

// ---------------------------------------------------------------------------
// Event parsing and policy
// ---------------------------------------------------------------------------

fn bench_event_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_evaluation");
    let policy = WarningGatedPolicy::default();

    group.bench_function("parse_clean", |b| {
        b.iter(|| DetectionEvent::parse(black_box(CLEAN_EVENT)))
    });

    group.bench_function("parse_and_evaluate_blocked", |b| {
        b.iter(|| {
            let event = DetectionEvent::parse(black_box(BLOCKED_EVENT)).ok()?;
            Some(policy.evaluate(&event))
        })
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Full stream processing
// ---------------------------------------------------------------------------

fn bench_process_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_stream");

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let processor = processor();

    for events in [10usize, 100, 500] {
        let chunks = sse_chunks(events, 64);
        group.bench_with_input(BenchmarkId::new("events", events), &chunks, |b, chunks| {
            b.iter(|| {
                rt.block_on(async {
                    let input = stream::iter(chunks.clone().into_iter().map(Ok));
                    let updates: Vec<StreamUpdate> = processor.process(input).collect().await;
                    black_box(updates.len())
                })
            });
        });
    }

    // A block on the first event stops the read immediately.
    let mut blocked = format!("data: {BLOCKED_EVENT}\n\n");
    for _ in 0..500 {
        blocked.push_str("data: ");
        blocked.push_str(CLEAN_EVENT);
        blocked.push_str("\n\n");
    }
    let blocked = Bytes::from(blocked);
    group.bench_function("blocked_first_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let input = stream::iter([Ok(blocked.clone())]);
                let updates: Vec<StreamUpdate> = processor.process(input).collect().await;
                black_box(updates.len())
            })
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Metrics exposition
// ---------------------------------------------------------------------------

fn bench_metrics_render(c: &mut Criterion) {
    let metrics = MetricsAggregator::new();
    let event = DetectionEvent::parse(CLEAN_EVENT).unwrap();
    for _ in 0..1000 {
        metrics.record_request();
        for direction in Direction::ALL {
            for group in event.detections.for_direction(direction) {
                metrics.record_detections(&group.results, direction);
            }
        }
    }

    c.bench_function("metrics_render", |b| b.iter(|| black_box(metrics.render())));
}

criterion_group!(
    benches,
    bench_event_evaluation,
    bench_process_stream,
    bench_metrics_render
);
criterion_main!(benches);
