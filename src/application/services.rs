//! Service wiring shared by the binary and the integration tests.

use std::sync::Arc;

use super::call_controller::{CallCollaborators, CallController};
use super::connection_registry::ConnectionRegistry;
use super::dispatcher::Dispatcher;
use super::quota_gate::QuotaGate;
use super::room_router::RoomRouter;
use super::scheduler::{ExpirySweep, PeriodicTask, SessionTick};
use super::session_registry::SessionRegistry;
use crate::config::CallsConfig;
use crate::ports::{Clock, MediaProvider, QuotaStore, RelationshipChecker, SignalingStore};

/// Port implementations the services run against.
#[derive(Clone)]
pub struct Collaborators {
    pub relationships: Arc<dyn RelationshipChecker>,
    pub quota_store: Arc<dyn QuotaStore>,
    pub store: Arc<dyn SignalingStore>,
    pub media: Arc<dyn MediaProvider>,
    pub clock: Arc<dyn Clock>,
}

/// The wired signaling core.
#[derive(Clone)]
pub struct SignalingServices {
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<RoomRouter>,
    pub quota: Arc<QuotaGate>,
    pub sessions: Arc<SessionRegistry>,
    pub controller: Arc<CallController>,
    pub dispatcher: Arc<Dispatcher>,
    calls: CallsConfig,
}

impl SignalingServices {
    pub fn build(calls: &CallsConfig, ports: Collaborators) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(ports.relationships.clone()));
        let router = Arc::new(RoomRouter::new(registry.clone()));
        let quota = Arc::new(QuotaGate::new(
            ports.quota_store,
            ports.clock.clone(),
            calls.monthly_cap_secs,
        ));
        let sessions = Arc::new(SessionRegistry::new(
            quota.clone(),
            ports.clock.clone(),
            calls.per_call_ceiling_secs,
            calls.quota_warning_secs,
        ));
        let controller = Arc::new(CallController::new(
            router.clone(),
            quota.clone(),
            sessions.clone(),
            CallCollaborators {
                relationships: ports.relationships,
                store: ports.store.clone(),
                media: ports.media,
            },
            ports.clock.clone(),
            calls.ring_timeout(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            router.clone(),
            controller.clone(),
            ports.store,
            ports.clock,
            calls.max_message_len,
        ));

        Self {
            registry,
            router,
            quota,
            sessions,
            controller,
            dispatcher,
            calls: calls.clone(),
        }
    }

    /// Expiry sweep and session tick, ready to spawn.
    pub fn periodic_tasks(&self) -> Vec<PeriodicTask> {
        vec![
            PeriodicTask::new(
                Arc::new(ExpirySweep::new(self.controller.clone())),
                self.calls.sweep_interval(),
            ),
            PeriodicTask::new(
                Arc::new(SessionTick::new(self.controller.clone())),
                self.calls.tick_interval(),
            ),
        ]
    }
}
