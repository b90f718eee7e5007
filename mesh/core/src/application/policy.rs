// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Enforcement (RBAC)
//!
//! Checks an actor's own permission set against a resource/action pair and a
//! caller-supplied context. The role seed table is never consulted at check
//! time: an actor with no grants is denied, and the mismatch with its role
//! seed is logged as a provisioning problem.
//!
//! ## Scope rules
//!
//! | Scope | Satisfied when |
//! |-------|----------------|
//! | `system` | always |
//! | `self` | `actor_user_id` is absent, or equals `target_user_id` (which defaults to it) |
//! | `patient` | `patient_allowed` is absent or truthy |
//! | `team` | `team_allowed` is absent or truthy |
//!
//! A context key set to `null` counts as absent.
//!
//! On top of the scope, every condition key on the grant must be present in
//! the context with an equal value. Among several matching grants the first
//! satisfied one wins.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::errors::{MeshError, MeshResult};
use crate::domain::user::{Permission, PermissionAction, PermissionResource, PermissionScope, User};

pub const ACTOR_USER_ID: &str = "actor_user_id";
pub const TARGET_USER_ID: &str = "target_user_id";
pub const PATIENT_ALLOWED: &str = "patient_allowed";
pub const TEAM_ALLOWED: &str = "team_allowed";

/// Attributes of the request being authorised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyContext {
    values: HashMap<String, Value>,
}

impl PolicyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<HashMap<String, Value>> for PolicyContext {
    fn from(values: HashMap<String, Value>) -> Self {
        Self { values }
    }
}

pub trait PolicyEnforcer: Send + Sync {
    /// Fails with `MeshError::PolicyViolation` when no grant satisfies the
    /// request.
    fn require(
        &self,
        actor: &User,
        resource: PermissionResource,
        action: PermissionAction,
        context: Option<&PolicyContext>,
    ) -> MeshResult<()>;

    fn can(
        &self,
        actor: &User,
        resource: PermissionResource,
        action: PermissionAction,
        context: Option<&PolicyContext>,
    ) -> bool {
        self.require(actor, resource, action, context).is_ok()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RbacPolicyEnforcer;

impl RbacPolicyEnforcer {
    pub fn new() -> Self {
        Self
    }

    fn satisfies(permission: &Permission, context: Option<&PolicyContext>) -> bool {
        let scope_ok = match permission.scope {
            PermissionScope::System => true,
            PermissionScope::OwnRecords => match present(context, ACTOR_USER_ID) {
                None => true,
                Some(actor_id) => present(context, TARGET_USER_ID).map_or(true, |target| target == actor_id),
            },
            PermissionScope::Patient => flag_allows(context, PATIENT_ALLOWED),
            PermissionScope::Team => flag_allows(context, TEAM_ALLOWED),
        };

        scope_ok
            && permission
                .conditions
                .iter()
                .all(|(key, expected)| context.and_then(|c| c.get(key)) == Some(expected))
    }
}

impl PolicyEnforcer for RbacPolicyEnforcer {
    fn require(
        &self,
        actor: &User,
        resource: PermissionResource,
        action: PermissionAction,
        context: Option<&PolicyContext>,
    ) -> MeshResult<()> {
        if actor.permissions.is_empty() {
            let seeded = actor.missing_role_defaults();
            if !seeded.is_empty() {
                warn!(
                    user_id = %actor.user_id,
                    role = %actor.role,
                    missing_grants = seeded.len(),
                    "Actor carries no permissions although its role seed grants some; check user provisioning"
                );
            }
        }

        let mut closest_scope = None;
        for permission in actor.permissions.iter().filter(|p| p.grants(resource, action)) {
            if Self::satisfies(permission, context) {
                debug!(
                    user_id = %actor.user_id,
                    %resource,
                    %action,
                    scope = %permission.scope,
                    "Policy check passed"
                );
                return Ok(());
            }
            closest_scope.get_or_insert(permission.scope);
        }

        warn!(
            user_id = %actor.user_id,
            role = %actor.role,
            %resource,
            %action,
            "Policy check denied"
        );
        Err(MeshError::PolicyViolation {
            resource,
            action,
            scope: closest_scope,
            role: actor.role,
        })
    }
}

/// Context value for `key`, with an explicit `null` read as absent.
fn present<'a>(context: Option<&'a PolicyContext>, key: &str) -> Option<&'a Value> {
    context.and_then(|c| c.get(key)).filter(|v| !v.is_null())
}

/// Absent flags allow; present ones must be truthy.
fn flag_allows(context: Option<&PolicyContext>, key: &str) -> bool {
    match present(context, key) {
        None => true,
        Some(value) => is_truthy(value),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
