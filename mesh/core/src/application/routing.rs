// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Message Routing
//!
//! [`SmartMessageRouter`] accepts inter-agent messages on behalf of an actor.
//! Each message goes through, in order and fail-fast:
//!
//! 1. **Policy**: the actor must hold `message:create` (patient context allowed).
//!    A denial happens before any cache is touched.
//! 2. **Dedup**: a `message_id` seen within the dedup TTL is a conflict. A new
//!    id is marked before the first await, so a concurrent resubmission
//!    through the same router always observes it.
//! 3. **Receiver lookup**: an unknown receiver is `NotFound`.
//! 4. **Fallback**: an offline receiver is replaced by the lowest-priority
//!    online agent of the same category. With no candidate the message is
//!    returned unchanged and delivery failure is left to the transport.
//!
//! Accepted ids stay marked even if the caller abandons the call later.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::agent::{Agent, AgentStatus};
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::errors::{MeshError, MeshResult};
use crate::domain::events::RoutingEvent;
use crate::domain::mesh_config::RouterConfig;
use crate::domain::message::Message;
use crate::domain::registry::AgentRegistry;
use crate::domain::user::{PermissionAction, PermissionResource, User};
use crate::application::policy::{PolicyContext, PolicyEnforcer, PATIENT_ALLOWED};
use crate::infrastructure::cache::{BoundedCache, CacheOptions, CacheStats};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::telemetry::{MeshMetrics, RejectReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterOptions {
    pub dedup: CacheOptions,
    pub capabilities: CacheOptions,
}

impl Default for RouterOptions {
    fn default() -> Self {
        RouterConfig::default().into()
    }
}

impl From<RouterConfig> for RouterOptions {
    fn from(config: RouterConfig) -> Self {
        Self {
            dedup: config.dedup.into(),
            capabilities: config.capabilities.into(),
        }
    }
}

#[async_trait]
pub trait MessageRouter: Send + Sync {
    /// Route one message, returning it as delivered (possibly re-addressed).
    async fn route_message(&self, message: &Message, actor: &User) -> MeshResult<Message>;

    /// Route messages sequentially, one result per message in input order.
    /// A failure does not stop the rest of the batch.
    async fn route_batch(&self, messages: &[Message], actor: &User) -> Vec<MeshResult<Message>>;

    /// Route messages sequentially, stopping at the first failure. Messages
    /// accepted before the failure stay marked as seen.
    async fn route_batch_atomic(&self, messages: &[Message], actor: &User) -> MeshResult<Vec<Message>>;

    /// Names of the agent's enabled capabilities. Advisory: unknown agents and
    /// registry failures yield an empty list.
    async fn get_agent_capabilities(&self, agent_id: &str) -> Vec<String>;
}

pub struct SmartMessageRouter {
    registry: Arc<dyn AgentRegistry>,
    policy: Arc<dyn PolicyEnforcer>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<MeshMetrics>>,
    events: Option<EventBus>,
    dedup: Mutex<BoundedCache<String, ()>>,
    capabilities: Mutex<BoundedCache<String, Vec<String>>>,
}

impl SmartMessageRouter {
    pub fn new(
        registry: Arc<dyn AgentRegistry>,
        policy: Arc<dyn PolicyEnforcer>,
        options: RouterOptions,
    ) -> Self {
        Self {
            registry,
            policy,
            clock: Arc::new(SystemClock),
            metrics: None,
            events: None,
            dedup: Mutex::new(BoundedCache::new(options.dedup)),
            capabilities: Mutex::new(BoundedCache::new(options.capabilities)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MeshMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn dedup_stats(&self) -> CacheStats {
        self.dedup.lock().stats()
    }

    pub fn capability_cache_stats(&self) -> CacheStats {
        self.capabilities.lock().stats()
    }

    /// Returns false when the id was already marked and still live.
    fn mark_seen(&self, message_id: &str, now: i64) -> bool {
        let mut dedup = self.dedup.lock();
        let key = message_id.to_string();
        if dedup.get(&key, now).is_some() {
            return false;
        }
        dedup.set(key, (), None, now);
        true
    }

    fn cached_capabilities(&self, agent_id: &str, now: i64) -> Option<Vec<String>> {
        self.capabilities.lock().get(&agent_id.to_string(), now)
    }

    fn cache_capabilities(&self, agent_id: &str, capabilities: Vec<String>, now: i64) {
        self.capabilities
            .lock()
            .set(agent_id.to_string(), capabilities, None, now);
    }

    async fn find_fallback(&self, receiver: &Agent) -> MeshResult<Option<Agent>> {
        let mut candidates: Vec<Agent> = self
            .registry
            .list_agents()
            .await?
            .into_iter()
            .filter(|a| a.category == receiver.category && a.is_online())
            .collect();

        // Stable: equal priorities keep registry order
        candidates.sort_by_key(|a| a.priority);
        Ok(candidates.into_iter().next())
    }

    fn reject(&self, reason: RejectReason, event: RoutingEvent) {
        if let Some(metrics) = &self.metrics {
            metrics.record_rejected(reason);
        }
        self.emit(event);
    }

    fn emit(&self, event: RoutingEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    fn record_routed(&self, rerouted: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_routed();
            if rerouted {
                metrics.record_rerouted();
            }
        }
    }
}

#[async_trait]
impl MessageRouter for SmartMessageRouter {
    async fn route_message(&self, message: &Message, actor: &User) -> MeshResult<Message> {
        let context = PolicyContext::new().with(PATIENT_ALLOWED, true);
        if let Err(e) = self.policy.require(
            actor,
            PermissionResource::Message,
            PermissionAction::Create,
            Some(&context),
        ) {
            self.reject(
                RejectReason::PolicyDenied,
                RoutingEvent::PolicyDenied {
                    message_id: message.message_id.clone(),
                    actor_id: actor.user_id.clone(),
                    role: actor.role,
                    resource: PermissionResource::Message,
                    action: PermissionAction::Create,
                    denied_at: Utc::now(),
                },
            );
            return Err(e);
        }

        let now = self.clock.now_ms();
        if !self.mark_seen(&message.message_id, now) {
            warn!(message_id = %message.message_id, "Rejected duplicate message");
            self.reject(
                RejectReason::Duplicate,
                RoutingEvent::DuplicateRejected {
                    message_id: message.message_id.clone(),
                    rejected_at: Utc::now(),
                },
            );
            return Err(MeshError::Conflict {
                message_id: message.message_id.clone(),
            });
        }

        let receiver = match self.registry.get_agent(&message.receiver_id).await {
            Ok(Some(agent)) => agent,
            Ok(None) => {
                debug!(
                    message_id = %message.message_id,
                    receiver_id = %message.receiver_id,
                    "Receiver agent not found"
                );
                self.reject(
                    RejectReason::ReceiverNotFound,
                    RoutingEvent::ReceiverNotFound {
                        message_id: message.message_id.clone(),
                        receiver_id: message.receiver_id.clone(),
                        failed_at: Utc::now(),
                    },
                );
                return Err(MeshError::receiver_not_found(&message.receiver_id));
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_rejected(RejectReason::RegistryError);
                }
                return Err(e.into());
            }
        };

        if receiver.status != AgentStatus::Offline {
            self.record_routed(false);
            self.emit(RoutingEvent::Routed {
                message_id: message.message_id.clone(),
                receiver_id: receiver.agent_id.clone(),
                routed_at: Utc::now(),
            });
            return Ok(message.clone());
        }

        match self.find_fallback(&receiver).await? {
            Some(fallback) => {
                info!(
                    message_id = %message.message_id,
                    original_receiver = %receiver.agent_id,
                    fallback_receiver = %fallback.agent_id,
                    priority = fallback.priority,
                    "Receiver offline, rerouting to fallback agent"
                );
                self.record_routed(true);
                self.emit(RoutingEvent::Rerouted {
                    message_id: message.message_id.clone(),
                    original_receiver_id: receiver.agent_id.clone(),
                    fallback_receiver_id: fallback.agent_id.clone(),
                    rerouted_at: Utc::now(),
                });
                Ok(message.redirected_to(fallback.agent_id))
            }
            None => {
                debug!(
                    message_id = %message.message_id,
                    receiver_id = %receiver.agent_id,
                    category = ?receiver.category,
                    "Receiver offline and no online fallback; leaving destination unchanged"
                );
                self.record_routed(false);
                self.emit(RoutingEvent::Routed {
                    message_id: message.message_id.clone(),
                    receiver_id: receiver.agent_id.clone(),
                    routed_at: Utc::now(),
                });
                Ok(message.clone())
            }
        }
    }

    async fn route_batch(&self, messages: &[Message], actor: &User) -> Vec<MeshResult<Message>> {
        let mut results = Vec::with_capacity(messages.len());
        for message in messages {
            results.push(self.route_message(message, actor).await);
        }
        results
    }

    async fn route_batch_atomic(&self, messages: &[Message], actor: &User) -> MeshResult<Vec<Message>> {
        let mut routed = Vec::with_capacity(messages.len());
        for message in messages {
            routed.push(self.route_message(message, actor).await?);
        }
        Ok(routed)
    }

    async fn get_agent_capabilities(&self, agent_id: &str) -> Vec<String> {
        let now = self.clock.now_ms();
        if let Some(cached) = self.cached_capabilities(agent_id, now) {
            return cached;
        }

        match self.registry.get_agent(agent_id).await {
            Ok(Some(agent)) => {
                let capabilities = agent.active_capabilities();
                self.cache_capabilities(agent_id, capabilities.clone(), now);
                capabilities
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(agent_id, error = %e, "Capability lookup failed; returning no capabilities");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::policy::RbacPolicyEnforcer;
    use crate::domain::agent::{AgentCapability, AgentCategory};
    use crate::domain::clock::ManualClock;
    use crate::domain::registry::RegistryError;
    use crate::domain::user::UserRole;
    use crate::infrastructure::repositories::InMemoryAgentRegistry;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn agent(id: &str, category: AgentCategory, status: AgentStatus, priority: i32) -> Agent {
        Agent::new(id, id, category, format!("http://{id}"))
            .with_status(status)
            .with_priority(priority)
    }

    fn message(id: &str, receiver: &str) -> Message {
        Message::new("intake-agent", receiver, "application/json", Map::new()).with_id(id)
    }

    fn doctor() -> User {
        User::with_role_defaults("u-doc", "Dr. Grey", UserRole::Doctor)
    }

    fn router(registry: Arc<dyn AgentRegistry>) -> (SmartMessageRouter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let router = SmartMessageRouter::new(registry, Arc::new(RbacPolicyEnforcer::new()), RouterOptions::default())
            .with_clock(clock.clone());
        (router, clock)
    }

    fn seeded(agents: Vec<Agent>) -> Arc<InMemoryAgentRegistry> {
        Arc::new(InMemoryAgentRegistry::seeded(agents).unwrap())
    }

    /// Counts lookups so cache hits are observable.
    struct CountingRegistry {
        inner: InMemoryAgentRegistry,
        lookups: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl AgentRegistry for CountingRegistry {
        async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, RegistryError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RegistryError::Unavailable("connection refused".to_string()));
            }
            self.inner.get_agent(agent_id).await
        }

        async fn list_agents(&self) -> Result<Vec<Agent>, RegistryError> {
            self.inner.list_agents().await
        }
    }

    #[tokio::test]
    async fn test_routes_to_online_receiver_unchanged() {
        let (router, _) = router(seeded(vec![agent("a1", AgentCategory::Healthcare, AgentStatus::Online, 1)]));
        let msg = message("m-1", "a1");
        let routed = router.route_message(&msg, &doctor()).await.unwrap();
        assert_eq!(routed, msg);
    }

    #[tokio::test]
    async fn test_offline_receiver_falls_back_by_priority() {
        let (router, _) = router(seeded(vec![
            agent("a1", AgentCategory::Healthcare, AgentStatus::Online, 5),
            agent("a2", AgentCategory::Healthcare, AgentStatus::Offline, 2),
            agent("a3", AgentCategory::Healthcare, AgentStatus::Online, 1),
            agent("a4", AgentCategory::Healthcare, AgentStatus::Degraded, 0),
            agent("b1", AgentCategory::Business, AgentStatus::Online, 0),
        ]));

        let msg = message("m-1", "a2");
        let routed = router.route_message(&msg, &doctor()).await.unwrap();
        assert_eq!(routed.receiver_id, "a3");
        assert_eq!(routed.message_id, "m-1");
        // The input is never rewritten in place
        assert_eq!(msg.receiver_id, "a2");
    }

    #[tokio::test]
    async fn test_degraded_receiver_is_not_rerouted() {
        let (router, _) = router(seeded(vec![
            agent("a1", AgentCategory::Security, AgentStatus::Online, 0),
            agent("a2", AgentCategory::Security, AgentStatus::Maintenance, 9),
        ]));
        let routed = router.route_message(&message("m-1", "a2"), &doctor()).await.unwrap();
        assert_eq!(routed.receiver_id, "a2");
    }

    #[tokio::test]
    async fn test_duplicate_is_conflict_even_for_other_receiver() {
        let (router, _) = router(seeded(vec![
            agent("a1", AgentCategory::Healthcare, AgentStatus::Online, 1),
            agent("a2", AgentCategory::Healthcare, AgentStatus::Online, 2),
        ]));

        router.route_message(&message("m-1", "a1"), &doctor()).await.unwrap();
        let err = router.route_message(&message("m-1", "a2"), &doctor()).await.unwrap_err();
        assert!(matches!(err, MeshError::Conflict { ref message_id } if message_id == "m-1"));
        assert_eq!(err.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn test_dedup_mark_expires_after_ttl() {
        let (router, clock) = router(seeded(vec![agent("a1", AgentCategory::Content, AgentStatus::Online, 1)]));
        router.route_message(&message("m-1", "a1"), &doctor()).await.unwrap();

        clock.advance(5 * 60 * 1000);
        assert!(router.route_message(&message("m-1", "a1"), &doctor()).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_receiver_is_not_found_and_stays_marked() {
        let (router, _) = router(seeded(vec![]));
        let err = router.route_message(&message("m-1", "ghost"), &doctor()).await.unwrap_err();
        assert!(matches!(err, MeshError::NotFound { ref id, .. } if id == "ghost"));

        let retry = router.route_message(&message("m-1", "ghost"), &doctor()).await.unwrap_err();
        assert!(matches!(retry, MeshError::Conflict { .. }));
    }

    /// Lookups never resolve, as with a stalled backing store.
    struct StalledRegistry;

    #[async_trait]
    impl AgentRegistry for StalledRegistry {
        async fn get_agent(&self, _agent_id: &str) -> Result<Option<Agent>, RegistryError> {
            futures::future::pending().await
        }

        async fn list_agents(&self) -> Result<Vec<Agent>, RegistryError> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_abandoned_route_keeps_message_marked() {
        let (router, clock) = router(Arc::new(StalledRegistry));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            router.route_message(&message("m-1", "a1"), &doctor()),
        )
        .await;
        assert!(abandoned.is_err());

        let retry = router.route_message(&message("m-1", "a1"), &doctor()).await.unwrap_err();
        assert!(matches!(retry, MeshError::Conflict { ref message_id } if message_id == "m-1"));

        // Still marked just before the TTL runs out
        clock.set(1_000 + 5 * 60 * 1000 - 1);
        let late = router.route_message(&message("m-1", "a1"), &doctor()).await.unwrap_err();
        assert_eq!(late.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn test_policy_denial_leaves_dedup_untouched() {
        let (router, _) = router(seeded(vec![agent("a1", AgentCategory::Healthcare, AgentStatus::Online, 1)]));
        let researcher = User::with_role_defaults("u-r", "Res", UserRole::Researcher);

        let err = router.route_message(&message("m-1", "a1"), &researcher).await.unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        assert_eq!(router.dedup_stats(), CacheStats::default());

        // Same id still routable by an authorised actor
        assert!(router.route_message(&message("m-1", "a1"), &doctor()).await.is_ok());
    }

    #[tokio::test]
    async fn test_route_batch_is_independent_per_item() {
        let (router, _) = router(seeded(vec![
            agent("a1", AgentCategory::Healthcare, AgentStatus::Online, 1),
            agent("a2", AgentCategory::Healthcare, AgentStatus::Offline, 2),
        ]));
        let batch = vec![message("m-1", "a1"), message("m-1", "a1"), message("m-2", "nope"), message("m-3", "a2")];

        let results = router.route_batch(&batch, &doctor()).await;
        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(MeshError::Conflict { .. })));
        assert!(matches!(results[2], Err(MeshError::NotFound { .. })));
        assert_eq!(results[3].as_ref().map(|m| m.receiver_id.as_str()).ok(), Some("a1"));
    }

    #[tokio::test]
    async fn test_route_batch_atomic_stops_at_first_failure() {
        let (router, _) = router(seeded(vec![agent("a1", AgentCategory::Healthcare, AgentStatus::Online, 1)]));
        let batch = vec![message("m-1", "a1"), message("m-2", "nope"), message("m-3", "a1")];

        let err = router.route_batch_atomic(&batch, &doctor()).await.unwrap_err();
        assert!(matches!(err, MeshError::NotFound { .. }));

        // m-3 was never reached, m-1 stays marked
        assert!(router.route_message(&message("m-3", "a1"), &doctor()).await.is_ok());
        assert!(router.route_message(&message("m-1", "a1"), &doctor()).await.is_err());
    }

    #[tokio::test]
    async fn test_capabilities_cached_and_filtered() {
        let registry = Arc::new(CountingRegistry {
            inner: InMemoryAgentRegistry::seeded(vec![agent("a1", AgentCategory::Automation, AgentStatus::Online, 1)
                .with_capability(AgentCapability::new("schedule", "1.0.0"))
                .with_capability(AgentCapability::new("bill", "1.2.0").disabled())])
            .unwrap(),
            lookups: AtomicUsize::new(0),
            fail: false,
        });
        let (router, clock) = router(registry.clone());

        assert_eq!(router.get_agent_capabilities("a1").await, vec!["schedule".to_string()]);
        assert_eq!(router.get_agent_capabilities("a1").await, vec!["schedule".to_string()]);
        assert_eq!(registry.lookups.load(Ordering::SeqCst), 1);

        clock.advance(30_000);
        router.get_agent_capabilities("a1").await;
        assert_eq!(registry.lookups.load(Ordering::SeqCst), 2);

        // Unknown agents are not cached
        assert!(router.get_agent_capabilities("zz").await.is_empty());
        assert!(router.get_agent_capabilities("zz").await.is_empty());
        assert_eq!(registry.lookups.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_capabilities_swallow_registry_errors() {
        let registry = Arc::new(CountingRegistry {
            inner: InMemoryAgentRegistry::new(),
            lookups: AtomicUsize::new(0),
            fail: true,
        });
        let (router, _) = router(registry);
        assert!(router.get_agent_capabilities("a1").await.is_empty());
    }

    #[tokio::test]
    async fn test_registry_failure_surfaces_on_routing() {
        let registry = Arc::new(CountingRegistry {
            inner: InMemoryAgentRegistry::new(),
            lookups: AtomicUsize::new(0),
            fail: true,
        });
        let (router, _) = router(registry);
        let err = router.route_message(&message("m-1", "a1"), &doctor()).await.unwrap_err();
        assert!(matches!(err, MeshError::Registry(RegistryError::Unavailable(_))));
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
