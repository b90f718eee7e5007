// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::{PermissionAction, PermissionResource, UserRole};

/// Outcome of a single routing decision, streamed to dashboard observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoutingEvent {
    Routed {
        message_id: String,
        receiver_id: String,
        routed_at: DateTime<Utc>,
    },
    Rerouted {
        message_id: String,
        original_receiver_id: String,
        fallback_receiver_id: String,
        rerouted_at: DateTime<Utc>,
    },
    DuplicateRejected {
        message_id: String,
        rejected_at: DateTime<Utc>,
    },
    PolicyDenied {
        message_id: String,
        actor_id: String,
        role: UserRole,
        resource: PermissionResource,
        action: PermissionAction,
        denied_at: DateTime<Utc>,
    },
    ReceiverNotFound {
        message_id: String,
        receiver_id: String,
        failed_at: DateTime<Utc>,
    },
}

impl RoutingEvent {
    pub fn message_id(&self) -> &str {
        match self {
            Self::Routed { message_id, .. }
            | Self::Rerouted { message_id, .. }
            | Self::DuplicateRejected { message_id, .. }
            | Self::PolicyDenied { message_id, .. }
            | Self::ReceiverNotFound { message_id, .. } => message_id,
        }
    }
}
