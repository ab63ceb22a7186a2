// src/core/engine/mod.rs

//! The availability engine: one synchronous, single-threaded dispatcher over
//! the shared object model, composed of the six per-entity state machines.
//!
//! Handlers run to completion and never block; external effects (process
//! lifecycle, multicast, library callbacks) are submitted through the
//! actuator, the outbox and the callback queue, and complete as later events.

pub mod application;
pub mod cluster;
pub mod component;
pub mod node;
pub mod sg;
pub mod si;
pub mod su;

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, warn};

use crate::core::actuator::{ComponentActuator, NodeRepairer};
use crate::core::errors::AegisError;
use crate::core::events::{AmfEvent, Recallee};
use crate::core::model::types::{ClusterAcsmState, HaState, OperationalState};
use crate::core::model::{CompId, CsiaId, Model, NodeId};
use crate::core::sync::SyncReceiver;
use crate::core::timer::{TimerKind, TimerWheel};
use crate::core::transport::ClusterMessage;

/// What a pending library invocation refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationKind {
    CsiSet(CsiaId),
    HealthcheckCallback(CompId, String),
}

/// A healthcheck callback awaiting delivery to a component library session.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthcheckCallback {
    pub comp: CompId,
    pub invocation: u64,
    pub key: String,
}

/// Responses handed back to the library IPC layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientResponse {
    Ok,
    HaState(Option<HaState>),
}

pub struct Engine {
    pub model: Model,
    /// The node this engine instance runs on. Lifecycle actions are only
    /// executed for service units hosted here.
    pub self_node: NodeId,
    pub timers: TimerWheel,
    pub actuator: Box<dyn ComponentActuator>,
    pub repairer: Box<dyn NodeRepairer>,
    outbox: Vec<ClusterMessage>,
    callbacks: Vec<HealthcheckCallback>,
    invocations: HashMap<u64, InvocationKind>,
    next_invocation: u64,
    sync_receiver: Option<SyncReceiver>,
}

impl Engine {
    pub fn new(
        model: Model,
        self_node: NodeId,
        actuator: Box<dyn ComponentActuator>,
        repairer: Box<dyn NodeRepairer>,
    ) -> Self {
        Self {
            model,
            self_node,
            timers: TimerWheel::new(),
            actuator,
            repairer,
            outbox: Vec::new(),
            callbacks: Vec::new(),
            invocations: HashMap::new(),
            next_invocation: 1,
            sync_receiver: None,
        }
    }

    /// Dispatches one inbound event to its handler.
    pub fn dispatch(&mut self, event: AmfEvent) -> Result<(), AegisError> {
        debug!("Dispatching {:?}", event);
        match event {
            AmfEvent::NodeSyncReady(node) => {
                // The first sync-ready of a fresh model brings the whole
                // cluster up; later ones are node joins.
                if self.model.cluster.acsm_state == ClusterAcsmState::Uninstantiated {
                    self.model.node_mut(node).op_state = OperationalState::Enabled;
                    self.cluster_sync_ready()
                } else {
                    self.node_sync_ready(node)
                }
            }
            AmfEvent::NodeLeave(node) => self.node_leave(node),
            AmfEvent::NodeFailover(node) => self.node_failover(node),
            AmfEvent::NodeCompRestartReq(node, comp) => self.node_comp_restart_req(node, comp),
            AmfEvent::NodeCompFailoverReq(node, comp) => self.node_comp_failover_req(node, comp),
            AmfEvent::AppStart(app, node) => self.app_start(app, node),
            AmfEvent::AppAssignWorkload(app, node) => self.app_assign_workload(app, node),
            AmfEvent::AppSgStarted(app, sg, node) => self.app_sg_started(app, sg, node),
            AmfEvent::AppSgAssigned(app, sg) => self.app_sg_assigned(app, sg),
            AmfEvent::SgStart(sg, node) => {
                self.sg_start(sg, node);
                Ok(())
            }
            AmfEvent::SgAssignSi(sg, level) => self.sg_assign_si_req(sg, level).map(|_| ()),
            AmfEvent::SgFailoverSuReq(sg, su, node) => self.sg_failover_su_req(sg, su, node),
            AmfEvent::SgFailoverNodeReq(sg, node) => self.sg_failover_node_req(sg, node),
            AmfEvent::SgSuStateChanged(sg, su, state) => self.sg_su_state_changed(sg, su, state),
            AmfEvent::SuCompStateChanged(su, comp, state) => {
                self.su_comp_state_changed(su, comp, state)
            }
            AmfEvent::SuCompErrorSuspected(su, comp, recovery) => {
                self.su_comp_error_suspected(su, comp, recovery)
            }
            AmfEvent::CompCleanupCompleted(comp, exit_code) => {
                self.comp_cleanup_completed(comp, exit_code)
            }
            AmfEvent::CompInstantiateTmo(comp) => self.comp_instantiate_tmo(comp),
            AmfEvent::CompCleanupTmo(comp) => self.comp_cleanup_tmo(comp),
            AmfEvent::HealthcheckTmo(comp, key, recovery) => {
                self.comp_healthcheck_tmo(comp, &key, recovery)
            }
            AmfEvent::ClusterStartupTmo => self.cluster_startup_tmo(),
            AmfEvent::SyncDataChunk(payload) => self.sync_data(&payload),
        }
    }

    /// Routes one delivered cluster message into the engine.
    pub fn handle_message(&mut self, msg: ClusterMessage) -> Result<(), AegisError> {
        match msg {
            ClusterMessage::ComponentRegister { comp_dn, proxy_dn } => {
                self.comp_register(&comp_dn, proxy_dn)
            }
            ClusterMessage::ComponentErrorReport { comp_dn, recovery } => {
                let comp = self.comp_by_dn(&comp_dn)?;
                self.comp_error_report(comp, recovery)
            }
            ClusterMessage::ComponentInstantiate { comp_dn } => {
                let comp = self.comp_by_dn(&comp_dn)?;
                self.comp_instantiate_event(comp)
            }
            ClusterMessage::ClcCleanupCompleted { comp_dn, exit_code } => {
                let comp = self.comp_by_dn(&comp_dn)?;
                self.dispatch(AmfEvent::CompCleanupCompleted(comp, exit_code))
            }
            ClusterMessage::HealthcheckTmo {
                comp_dn,
                key,
                recovery,
            } => {
                let comp = self.comp_by_dn(&comp_dn)?;
                self.dispatch(AmfEvent::HealthcheckTmo(comp, key, recovery))
            }
            ClusterMessage::Response { invocation, ok } => self.invocation_response(invocation, ok),
            ClusterMessage::SyncStart { from_node_id } => {
                debug!("Sync start from node {}", from_node_id);
                Ok(())
            }
            ClusterMessage::SyncRequest { from_node_id } => {
                debug!("Sync request from node {}", from_node_id);
                Ok(())
            }
            ClusterMessage::SyncData { chunk } => {
                if let Some(receiver) = self.sync_receiver.as_mut() {
                    receiver.apply(&chunk)
                } else {
                    debug!("Ignoring sync data outside a sync exchange");
                    Ok(())
                }
            }
            ClusterMessage::ClusterStartTmo { source_node } => {
                debug!("Cluster start timeout announced by '{}'", source_node);
                self.dispatch(AmfEvent::ClusterStartupTmo)
            }
            ClusterMessage::ComponentInstantiateTmo { comp_dn } => {
                let comp = self.comp_by_dn(&comp_dn)?;
                self.dispatch(AmfEvent::CompInstantiateTmo(comp))
            }
            ClusterMessage::ComponentCleanupTmo { comp_dn } => {
                let comp = self.comp_by_dn(&comp_dn)?;
                self.dispatch(AmfEvent::CompCleanupTmo(comp))
            }
        }
    }

    /// Runs one expired timer.
    pub fn on_timer(&mut self, kind: TimerKind) -> Result<(), AegisError> {
        match kind {
            TimerKind::ClusterStartup => {
                self.model.cluster.startup_timer = None;
                let source = self.model.node(self.self_node).name.clone();
                self.mcast(ClusterMessage::ClusterStartTmo {
                    source_node: source,
                });
                Ok(())
            }
            TimerKind::CompInstantiate(comp) => {
                self.model.comp_mut(comp).instantiate_timer = None;
                let dn = self.model.comp_dn(comp);
                self.mcast(ClusterMessage::ComponentInstantiateTmo { comp_dn: dn });
                Ok(())
            }
            TimerKind::CompCleanup(comp) => {
                self.model.comp_mut(comp).cleanup_timer = None;
                let dn = self.model.comp_dn(comp);
                self.mcast(ClusterMessage::ComponentCleanupTmo { comp_dn: dn });
                Ok(())
            }
            TimerKind::HealthcheckPeriod(comp, key) => self.healthcheck_period_expired(comp, &key),
            TimerKind::HealthcheckDuration(comp, key) => {
                self.healthcheck_duration_expired(comp, &key)
            }
            TimerKind::HaStateAssumed(sia) => self.si_ha_state_assumed_tick(sia),
            TimerKind::DependentsDeactivated(sg) => self.sg_dependents_deactivated_tick(sg),
            TimerKind::RecallDeferred(recallee) => self.recall_deferred(recallee),
        }
    }

    /// Drains every timer that is already due (zero-delay continuations and
    /// any expired real timers). One call is one reactor turn.
    pub fn run_until_idle(&mut self) -> Result<(), AegisError> {
        while let Some((_, kind)) = self.timers.pop_due(Instant::now()) {
            self.on_timer(kind)?;
        }
        Ok(())
    }

    /// Messages queued for multicast; the reactor flushes these after every
    /// dispatch.
    pub fn take_outbox(&mut self) -> Vec<ClusterMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Healthcheck callbacks queued for library delivery.
    pub fn take_callbacks(&mut self) -> Vec<HealthcheckCallback> {
        std::mem::take(&mut self.callbacks)
    }

    pub(crate) fn mcast(&mut self, msg: ClusterMessage) {
        self.outbox.push(msg);
    }

    pub(crate) fn push_callback(&mut self, cb: HealthcheckCallback) {
        self.callbacks.push(cb);
    }

    pub(crate) fn new_invocation(&mut self, kind: InvocationKind) -> u64 {
        let id = self.next_invocation;
        self.next_invocation += 1;
        self.invocations.insert(id, kind);
        id
    }

    /// Resolves a delivered invocation response to its pending work.
    /// Responses are multicast, so invocations issued by peer engines are
    /// unknown here and skipped.
    fn invocation_response(&mut self, invocation: u64, ok: bool) -> Result<(), AegisError> {
        let Some(kind) = self.invocations.remove(&invocation) else {
            debug!("Ignoring response for invocation {} issued elsewhere", invocation);
            return Ok(());
        };
        if !ok {
            warn!("Invocation {} answered with an error", invocation);
        }
        match kind {
            InvocationKind::CsiSet(csia) => {
                if ok {
                    self.comp_confirm_hastate(csia)
                } else {
                    // A failed HA transfer leaves the assignment unconfirmed;
                    // escalation arrives separately as an error report.
                    Ok(())
                }
            }
            InvocationKind::HealthcheckCallback(comp, key) => {
                if ok {
                    self.comp_healthcheck_confirm(comp, &key, true)
                } else {
                    let dn = self.model.comp_dn(comp);
                    let recovery = self
                        .model
                        .find_healthcheck(comp, &key)
                        .map(|hc| self.model.healthchecks[hc.index()].recommended_recovery)
                        .unwrap_or_default();
                    self.mcast(ClusterMessage::ComponentErrorReport {
                        comp_dn: dn,
                        recovery,
                    });
                    Ok(())
                }
            }
        }
    }

    pub(crate) fn comp_by_dn(&self, dn: &str) -> Result<CompId, AegisError> {
        self.model
            .find_comp_by_dn(dn)
            .ok_or_else(|| AegisError::NotFound(dn.to_string()))
    }

    /// Starts receiving a model sync stream (a fresh joiner's side).
    pub fn begin_sync_receive(&mut self) {
        self.sync_receiver = Some(SyncReceiver::new());
    }

    /// Finishes the sync stream and swaps in the received model.
    pub fn finish_sync_receive(&mut self) -> Result<(), AegisError> {
        let receiver = self
            .sync_receiver
            .take()
            .ok_or_else(|| AegisError::InvalidState("no sync exchange active".into()))?;
        self.model = receiver.finish()?;
        Ok(())
    }

    fn sync_data(&mut self, payload: &[u8]) -> Result<(), AegisError> {
        use bytes::Buf;
        let mut buf = bytes::Bytes::copy_from_slice(payload);
        let kind = crate::core::sync::SyncObjectKind::from_repr(
            crate::core::model::serialize::get_u8(&mut buf)?,
        )
        .ok_or(AegisError::IncompleteData)?;
        let len = crate::core::model::serialize::get_u32(&mut buf)? as usize;
        if buf.remaining() < len {
            return Err(AegisError::IncompleteData);
        }
        let chunk = crate::core::sync::SyncChunk {
            kind,
            payload: buf.split_to(len).to_vec(),
        };
        if let Some(receiver) = self.sync_receiver.as_mut() {
            receiver.apply(&chunk)
        } else {
            debug!("Ignoring sync data chunk outside a sync exchange");
            Ok(())
        }
    }

    /// Drains one entry of an entity's deferred FIFO and re-dispatches it
    /// with its original payload.
    fn recall_deferred(&mut self, recallee: Recallee) -> Result<(), AegisError> {
        match recallee {
            Recallee::App(app) => self.app_recall_deferred(app),
            Recallee::Sg(sg) => self.sg_recall_deferred(sg),
            Recallee::Su(su) => self.su_recall_deferred(su),
        }
    }
}
