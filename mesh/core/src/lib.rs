// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # MASTERLINC Agent Mesh Core
//!
//! Control-plane logic behind the agent mesh dashboard: the agent registry
//! contract, RBAC enforcement, message routing with deduplication and fallback
//! selection, and the time-series aggregation that feeds the dashboard and the
//! Prometheus exporters.
//!
//! # Architecture
//!
//! - **domain**: entities, value objects, the registry contract and errors
//! - **application**: policy enforcement, routing, health and metrics aggregation
//! - **infrastructure**: bounded cache, time-series buffers, in-memory registry,
//!   exporters, event bus and telemetry

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
