// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Inter-Agent Messages
//!
//! `message_id` doubles as the deduplication key: once the router has accepted
//! an id inside its dedup window, a second message with that id is rejected.
//!
//! Structural validation ([`Message::validate`]) belongs to the caller; the
//! router assumes well-formed input.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use uuid::Uuid;

use crate::domain::errors::MeshError;

const MAX_MESSAGE_ID_LEN: usize = 128;
const MAX_CONTENT_TYPE_LEN: usize = 128;
const MAX_POLICY_TAGS: usize = 64;
const MAX_POLICY_TAG_LEN: usize = 64;

static AGENT_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z][a-z0-9_-]{2,63}$").expect("Invalid agent id regex"));

// Letters in any script, digits, underscore, colon, dot, dash
static POLICY_TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\p{N}_:.\-]{1,64}$").expect("Invalid policy tag regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content_type: String,
    /// Opaque payload; never inspected by the router
    #[serde(default)]
    pub content: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    /// Policy metadata such as "phi" or "internal"
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_tags: Vec<String>,
}

impl Message {
    /// New pending message with a random id.
    pub fn new(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        content_type: impl Into<String>,
        content: Map<String, Value>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content_type: content_type.into(),
            content,
            timestamp: Utc::now(),
            status: DeliveryStatus::Pending,
            policy_tags: Vec::new(),
        }
    }

    pub fn with_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn with_policy_tags(mut self, tags: Vec<String>) -> Self {
        self.policy_tags = tags;
        self
    }

    /// Copy of this message addressed to `receiver_id`. The original is left
    /// untouched.
    pub fn redirected_to(&self, receiver_id: impl Into<String>) -> Self {
        Self {
            receiver_id: receiver_id.into(),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        if self.message_id.is_empty() || self.message_id.len() > MAX_MESSAGE_ID_LEN {
            return Err(MeshError::Validation(format!(
                "message_id must be 1-{} characters",
                MAX_MESSAGE_ID_LEN
            )));
        }

        for (field, value) in [("sender_id", &self.sender_id), ("receiver_id", &self.receiver_id)] {
            if !AGENT_ID_PATTERN.is_match(value) {
                return Err(MeshError::Validation(format!(
                    "{} '{}' must be 3-64 characters, start with a letter and contain only letters, digits, _ or -",
                    field, value
                )));
            }
        }

        if self.content_type.is_empty() || self.content_type.len() > MAX_CONTENT_TYPE_LEN {
            return Err(MeshError::Validation(format!(
                "content_type must be 1-{} characters",
                MAX_CONTENT_TYPE_LEN
            )));
        }

        if self.policy_tags.len() > MAX_POLICY_TAGS {
            return Err(MeshError::Validation(format!(
                "at most {} policy tags are allowed",
                MAX_POLICY_TAGS
            )));
        }

        for tag in &self.policy_tags {
            if tag.chars().count() > MAX_POLICY_TAG_LEN || !POLICY_TAG_PATTERN.is_match(tag) {
                return Err(MeshError::Validation(format!(
                    "policy tag '{}' contains invalid characters",
                    tag
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn referral() -> Message {
        let mut content = Map::new();
        content.insert("patient_ref".to_string(), json!("P-1002"));
        Message::new("doctorlinc", "claimlinc", "referral", content)
    }

    #[test]
    fn test_redirect_produces_copy() {
        let original = referral();
        let redirected = original.redirected_to("policylinc");
        assert_eq!(redirected.receiver_id, "policylinc");
        assert_eq!(redirected.message_id, original.message_id);
        assert_eq!(original.receiver_id, "claimlinc");
    }

    #[test]
    fn test_validate_accepts_well_formed_message() {
        let msg = referral().with_policy_tags(vec!["phi".to_string(), "hipaa:164.512".to_string(), "سري".to_string()]);
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_agent_ids() {
        let mut msg = referral();
        msg.receiver_id = "1abc".to_string();
        assert_eq!(msg.validate().unwrap_err().code(), "VALIDATION_ERROR");

        msg.receiver_id = "ab".to_string();
        assert!(msg.validate().is_err());

        msg.receiver_id = "a".repeat(65);
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_tags_and_ids() {
        let tagged = referral().with_policy_tags(vec!["has space".to_string()]);
        assert!(tagged.validate().is_err());

        let too_many = referral().with_policy_tags((0..65).map(|i| format!("t{}", i)).collect());
        assert!(too_many.validate().is_err());

        let blank_id = referral().with_id("");
        assert!(blank_id.validate().is_err());
    }
}
