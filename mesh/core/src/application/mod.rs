// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod policy;
pub mod routing;
pub mod health;
pub mod metrics_aggregator;

pub use policy::{PolicyContext, PolicyEnforcer, RbacPolicyEnforcer};
pub use routing::{MessageRouter, RouterOptions, SmartMessageRouter};
pub use health::HealthAggregator;
pub use metrics_aggregator::{AggregatedSnapshot, AggregatorOptions, MetricsAggregator};
