// Copyright 2026 The Lemonade Stand Project
// SPDX-License-Identifier: Apache-2.0

// Detection metrics
//
// Process-wide request and detection counters behind a single mutex.
// The lock covers counter updates and snapshot copies only; rendering
// happens on the copied snapshot.

use std::fmt::Write as _;
use std::sync::{Mutex, PoisonError};

use crate::event::{DetectionResult, DetectorId, Direction};

const DETECTORS: usize = DetectorId::ALL.len();
const DIRECTIONS: usize = Direction::ALL.len();

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    detections: [[u64; DIRECTIONS]; DETECTORS],
}

impl MetricsSnapshot {
    pub fn detections(&self, detector: DetectorId, direction: Direction) -> u64 {
        self.detections[detector.index()][direction.index()]
    }

    /// Sum over both directions for one detector.
    pub fn detector_total(&self, detector: DetectorId) -> u64 {
        self.detections[detector.index()].iter().sum()
    }

    /// Sum over all known detectors for one direction.
    pub fn direction_total(&self, direction: Direction) -> u64 {
        self.detections
            .iter()
            .map(|per_direction| per_direction[direction.index()])
            .sum()
    }

    /// Render the snapshot in Prometheus text exposition format.
    ///
    /// Every detector/direction combination is emitted, including zeros.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(2048);

        write_metric_header(
            &mut out,
            "guardrail_requests_total",
            "Total number of requests processed",
        );
        let _ = writeln!(out, "guardrail_requests_total {}", self.total_requests);

        out.push('\n');
        write_metric_header(
            &mut out,
            "guardrail_detections_total",
            "Total number of guardrail detections",
        );
        for detector in DetectorId::ALL {
            for direction in Direction::ALL {
                let _ = writeln!(
                    out,
                    "guardrail_detections_total{{detector=\"{detector}\",direction=\"{direction}\"}} {}",
                    self.detections(detector, direction)
                );
            }
        }

        out.push('\n');
        write_metric_header(
            &mut out,
            "guardrail_detections_by_detector",
            "Guardrail detections grouped by detector",
        );
        for detector in DetectorId::ALL {
            let _ = writeln!(
                out,
                "guardrail_detections_by_detector{{detector=\"{detector}\"}} {}",
                self.detector_total(detector)
            );
        }

        out.push('\n');
        write_metric_header(
            &mut out,
            "guardrail_detections_by_direction",
            "Guardrail detections grouped by direction",
        );
        for direction in Direction::ALL {
            let _ = writeln!(
                out,
                "guardrail_detections_by_direction{{direction=\"{direction}\"}} {}",
                self.direction_total(direction)
            );
        }

        out
    }
}

fn write_metric_header(out: &mut String, name: &str, help: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} counter");
}

/// Thread-safe aggregate counters shared by every in-flight chat turn.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    state: Mutex<MetricsSnapshot>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.with_state(|state| state.total_requests += 1);
    }

    /// Count each result from a known detector once under `direction`.
    /// Unknown detector ids are skipped.
    pub fn record_detections(&self, results: &[DetectionResult], direction: Direction) {
        let known: Vec<DetectorId> = results.iter().filter_map(DetectionResult::detector).collect();
        if known.is_empty() {
            return;
        }
        self.with_state(|state| {
            for detector in known {
                state.detections[detector.index()][direction.index()] += 1;
            }
        });
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.with_state(|state| *state)
    }

    pub fn render(&self) -> String {
        self.snapshot().render()
    }

    // Counters stay consistent even if a holder panicked, so poisoning is ignored.
    fn with_state<R>(&self, f: impl FnOnce(&mut MetricsSnapshot) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
