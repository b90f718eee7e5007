// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod cache;
pub mod time_series;
pub mod repositories;
pub mod exporters;
pub mod event_bus;
pub mod telemetry;

pub use cache::{BoundedCache, CacheOptions, CacheStats};
pub use event_bus::EventBus;
pub use repositories::InMemoryAgentRegistry;
pub use telemetry::MeshMetrics;
