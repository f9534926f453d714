// Copyright 2026 The Lemonade Stand Project
// SPDX-License-Identifier: Apache-2.0

pub mod config;
pub mod detectors;
pub mod event;
pub mod metrics;
pub mod orchestrator;
pub mod server;
pub mod stream;
