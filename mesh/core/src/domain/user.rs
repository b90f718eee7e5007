// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Users and RBAC Grants
//!
//! A [`User`] carries its own effective permission set. The role table in
//! [`default_role_permissions`] is only a seed used when provisioning users;
//! policy checks never consult it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Four-tier healthcare role model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Doctor,
    Nurse,
    Admin,
    Researcher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionResource {
    Workflow,
    Message,
    Agent,
    Policy,
    User,
    AuditLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Create,
    Read,
    Update,
    Execute,
    Delete,
    Approve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionScope {
    System,
    Team,
    Patient,
    #[serde(rename = "self")]
    OwnRecords,
}

/// A single grant: `resource` × `action` within `scope`, optionally narrowed
/// by `conditions` that must all be matched by the caller-supplied context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub resource: PermissionResource,
    pub action: PermissionAction,
    pub scope: PermissionScope,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub conditions: HashMap<String, Value>,
}

impl Permission {
    pub fn new(resource: PermissionResource, action: PermissionAction, scope: PermissionScope) -> Self {
        Self {
            resource,
            action,
            scope,
            conditions: HashMap::new(),
        }
    }

    pub fn with_condition(mut self, key: impl Into<String>, value: Value) -> Self {
        self.conditions.insert(key.into(), value);
        self
    }

    pub fn grants(&self, resource: PermissionResource, action: PermissionAction) -> bool {
        self.resource == resource && self.action == action
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Effective permission set. Authoritative for every policy check.
    #[serde(default)]
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a user with an empty permission set.
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            name: name.into(),
            role,
            email: None,
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a user whose permissions are seeded from the role table.
    pub fn with_role_defaults(user_id: impl Into<String>, name: impl Into<String>, role: UserRole) -> Self {
        let mut user = Self::new(user_id, name, role);
        user.permissions = default_role_permissions(role);
        user
    }

    pub fn with_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Grants in the seed table that this user does not hold. A non-empty
    /// result is a provisioning drift, not a routing failure.
    pub fn missing_role_defaults(&self) -> Vec<Permission> {
        default_role_permissions(self.role)
            .into_iter()
            .filter(|seed| !self.permissions.iter().any(|p| p.grants(seed.resource, seed.action)))
            .collect()
    }
}

/// Reference seed of role → grants. Used to provision users, never to
/// override a user's own permission set at check time.
pub fn default_role_permissions(role: UserRole) -> Vec<Permission> {
    use PermissionAction::*;
    use PermissionResource as R;
    use PermissionScope::*;

    let grants: &[(PermissionResource, PermissionAction, PermissionScope)] = match role {
        UserRole::Doctor => &[
            (R::Workflow, Create, Team),
            (R::Workflow, Execute, Patient),
            (R::Message, Create, Patient),
            (R::Agent, Read, System),
        ],
        UserRole::Nurse => &[
            (R::Workflow, Read, Patient),
            (R::Workflow, Execute, Team),
            (R::Message, Create, Patient),
        ],
        UserRole::Admin => &[
            (R::Agent, Create, System),
            (R::Agent, Update, System),
            (R::Policy, Create, System),
            (R::User, Create, System),
        ],
        UserRole::Researcher => &[
            (R::Workflow, Read, System),
            (R::Agent, Read, System),
        ],
    };

    grants
        .iter()
        .map(|(resource, action, scope)| Permission::new(*resource, *action, *scope))
        .collect()
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Doctor => "doctor",
            Self::Nurse => "nurse",
            Self::Admin => "admin",
            Self::Researcher => "researcher",
        };
        f.write_str(s)
    }
}

impl fmt::Display for PermissionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Workflow => "workflow",
            Self::Message => "message",
            Self::Agent => "agent",
            Self::Policy => "policy",
            Self::User => "user",
            Self::AuditLog => "audit_log",
        };
        f.write_str(s)
    }
}

impl fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Execute => "execute",
            Self::Delete => "delete",
            Self::Approve => "approve",
        };
        f.write_str(s)
    }
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::Team => "team",
            Self::Patient => "patient",
            Self::OwnRecords => "self",
        };
        f.write_str(s)
    }
}
