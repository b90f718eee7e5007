// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mesh Error Taxonomy
//!
//! Every failure the routing core surfaces to a caller is a [`MeshError`].
//! The variants map one-to-one onto the stable error codes exposed to the
//! dashboard API (see [`MeshError::code`]).
//!
//! | Variant | Code | Raised by |
//! |---------|------|-----------|
//! | `PolicyViolation` | `FORBIDDEN` | `PolicyEnforcer::require` |
//! | `Conflict` | `CONFLICT` | duplicate `message_id` inside the dedup window |
//! | `NotFound` | `NOT_FOUND` | unknown receiver agent |
//! | `Validation` | `VALIDATION_ERROR` | `Message::validate`, `Agent::validate` |
//! | `Registry` | `INTERNAL_ERROR` | backing registry store failures |

use crate::domain::registry::RegistryError;
use crate::domain::user::{PermissionAction, PermissionResource, PermissionScope, UserRole};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Forbidden: role {role} may not {action} {resource} (scope: {})", scope_label(.scope))]
    PolicyViolation {
        resource: PermissionResource,
        action: PermissionAction,
        /// Scope of the closest matching grant, `None` when the actor holds no
        /// grant for the resource/action pair at all.
        scope: Option<PermissionScope>,
        role: UserRole,
    },

    #[error("Duplicate message: {message_id}")]
    Conflict { message_id: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl MeshError {
    pub fn receiver_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Receiver agent",
            id: id.into(),
        }
    }

    /// Stable code for API responses and log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PolicyViolation { .. } => "FORBIDDEN",
            Self::Conflict { .. } => "CONFLICT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Registry(_) => "INTERNAL_ERROR",
        }
    }
}

fn scope_label(scope: &Option<PermissionScope>) -> String {
    scope.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string())
}

pub type MeshResult<T> = Result<T, MeshError>;
