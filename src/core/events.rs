// src/core/events.rs

//! The event envelope dispatched into the engine, and the deferred-event
//! FIFOs entities use to park events that arrive mid-transition.

use std::collections::VecDeque;

use tracing::warn;

use crate::core::model::types::{EntityState, RecommendedRecovery};
use crate::core::model::{AppId, CompId, NodeId, SgId, SuId};

/// Every handler of the engine is reached through one of these variants.
/// Events enter at the top of the hierarchy (membership), at the bottom
/// (component reports), or through timers.
#[derive(Debug, Clone, PartialEq)]
pub enum AmfEvent {
    NodeSyncReady(NodeId),
    NodeLeave(NodeId),
    NodeFailover(NodeId),
    NodeCompRestartReq(NodeId, CompId),
    NodeCompFailoverReq(NodeId, CompId),
    AppStart(AppId, Option<NodeId>),
    AppAssignWorkload(AppId, Option<NodeId>),
    AppSgStarted(AppId, SgId, Option<NodeId>),
    AppSgAssigned(AppId, SgId),
    SgStart(SgId, Option<NodeId>),
    SgAssignSi(SgId, u32),
    SgFailoverSuReq(SgId, SuId, NodeId),
    SgFailoverNodeReq(SgId, NodeId),
    SgSuStateChanged(SgId, SuId, EntityState),
    SuCompStateChanged(SuId, CompId, EntityState),
    SuCompErrorSuspected(SuId, CompId, RecommendedRecovery),
    CompCleanupCompleted(CompId, i32),
    CompInstantiateTmo(CompId),
    CompCleanupTmo(CompId),
    HealthcheckTmo(CompId, String, RecommendedRecovery),
    ClusterStartupTmo,
    SyncDataChunk(Vec<u8>),
}

/// A bounded FIFO of deferred events. Entries carry the full parameter tuple
/// so re-dispatch is payload-identical to the original delivery.
#[derive(Debug, Clone)]
pub struct DeferredFifo<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> Default for DeferredFifo<T> {
    fn default() -> Self {
        Self::new(64)
    }
}

impl<T> DeferredFifo<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.entries.len() >= self.capacity {
            warn!("Deferred event FIFO full, dropping oldest entry");
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn pop(&mut self) -> Option<T> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Events an application defers while it is mid-composite-action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppDeferredEvent {
    Start(Option<NodeId>),
    AssignWorkload(Option<NodeId>),
}

/// Events a service unit defers while a restart recovery is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuDeferredEvent {
    CompErrorSuspected {
        comp: CompId,
        recovery: RecommendedRecovery,
    },
}

/// Events a service group defers while a recovery scope is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgDeferredEvent {
    FailoverSu { su: SuId, node: NodeId },
    FailoverNode { node: NodeId },
}

/// Entity whose deferred FIFO should be drained by one entry on the next
/// reactor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recallee {
    App(AppId),
    Sg(SgId),
    Su(SuId),
}
