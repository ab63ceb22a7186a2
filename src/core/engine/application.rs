// src/core/engine/application.rs

//! The application state machine: fans start and workload-assignment
//! requests out to its service groups and reports aggregate completion
//! upward, deferring requests that arrive mid-action.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::engine::Engine;
use crate::core::errors::AegisError;
use crate::core::events::{AppDeferredEvent, Recallee};
use crate::core::model::types::{AppAcsmState, PresenceState, SgAcsmState};
use crate::core::model::{AppId, NodeId, SgId};
use crate::core::timer::TimerKind;

impl Engine {
    // --- Guards ---

    fn no_su_is_instantiating(&self, app: AppId) -> bool {
        for sg in self.model.sgs_of_app(app) {
            for su in self.model.sus_of_sg(sg) {
                if self.model.su(su).presence_state == PresenceState::Instantiating {
                    return false;
                }
            }
        }
        true
    }

    fn all_sgs_idle(&self, app: AppId) -> bool {
        self.model
            .sgs_of_app(app)
            .into_iter()
            .all(|sg| self.model.sg(sg).acsm_state == SgAcsmState::Idle)
    }

    // --- State entry helpers ---

    fn app_enter_starting_sgs(
        &mut self,
        app: AppId,
        node: Option<NodeId>,
    ) -> Result<(), AegisError> {
        {
            let a = self.model.app_mut(app);
            a.node_to_start = node;
            a.acsm_state = AppAcsmState::StartingSgs;
        }
        for sg in self.model.sgs_of_app(app) {
            self.sg_start(sg, node);
        }
        Ok(())
    }

    fn app_enter_assigning_workload(&mut self, app: AppId) -> Result<(), AegisError> {
        self.model.app_mut(app).acsm_state = AppAcsmState::AssigningWorkload;
        let mut possible = false;
        for sg in self.model.sgs_of_app(app) {
            if self.sg_assign_si_req(sg, 0)? {
                possible = true;
            }
        }
        if !possible {
            // Nothing was assignable; complete immediately so the parent is
            // not left waiting.
            self.app_enter_workload_assigned(app)?;
        }
        Ok(())
    }

    fn app_enter_workload_assigned(&mut self, app: AppId) -> Result<(), AegisError> {
        if !self.all_sgs_idle(app) {
            return Ok(());
        }
        self.model.app_mut(app).acsm_state = AppAcsmState::WorkloadAssigned;
        let node = self.model.app(app).node_to_start;
        match node {
            None => self.cluster_application_workload_assigned(app)?,
            Some(node) => self.node_application_workload_assigned(node, app)?,
        }
        if !self.model.app(app).deferred_events.is_empty() {
            self.timers.add(
                Duration::ZERO,
                TimerKind::RecallDeferred(Recallee::App(app)),
            );
        }
        Ok(())
    }

    // --- Event methods ---

    /// Starts the application's service groups, cluster-wide (`node` unset)
    /// or for one joining node.
    pub(crate) fn app_start(&mut self, app: AppId, node: Option<NodeId>) -> Result<(), AegisError> {
        debug!("Starting application '{}'", self.model.app(app).name);
        match self.model.app(app).acsm_state {
            AppAcsmState::Uninstantiated | AppAcsmState::WorkloadAssigned => {
                self.app_enter_starting_sgs(app, node)
            }
            AppAcsmState::StartingSgs => {
                if self.model.app(app).node_to_start == node {
                    for sg in self.model.sgs_of_app(app) {
                        self.sg_start(sg, node);
                    }
                    Ok(())
                } else {
                    debug!(
                        "Deferring start of '{}' for another node",
                        self.model.app(app).name
                    );
                    self.model
                        .app_mut(app)
                        .deferred_events
                        .push(AppDeferredEvent::Start(node));
                    Ok(())
                }
            }
            AppAcsmState::Started => self.app_enter_starting_sgs(app, node),
            AppAcsmState::AssigningWorkload => {
                warn!(
                    "Deferring start of application '{}' while workload is being assigned",
                    self.model.app(app).name
                );
                self.model
                    .app_mut(app)
                    .deferred_events
                    .push(AppDeferredEvent::Start(node));
                Ok(())
            }
        }
    }

    /// Assigns the application's workload through its service groups.
    pub(crate) fn app_assign_workload(
        &mut self,
        app: AppId,
        node: Option<NodeId>,
    ) -> Result<(), AegisError> {
        debug!(
            "Assigning workload of application '{}'",
            self.model.app(app).name
        );
        match self.model.app(app).acsm_state {
            AppAcsmState::Started | AppAcsmState::WorkloadAssigned => {
                self.model.app_mut(app).node_to_start = node;
                self.app_enter_assigning_workload(app)
            }
            AppAcsmState::AssigningWorkload => {
                if self.model.app(app).node_to_start == node {
                    Err(AegisError::InvalidState(format!(
                        "duplicate workload assignment request for '{}'",
                        self.model.app(app).name
                    )))
                } else {
                    warn!(
                        "Deferring workload assignment of '{}' for another node",
                        self.model.app(app).name
                    );
                    self.model
                        .app_mut(app)
                        .deferred_events
                        .push(AppDeferredEvent::AssignWorkload(node));
                    Ok(())
                }
            }
            other => Err(AegisError::InvalidState(format!(
                "workload assignment requested for '{}' in state {}",
                self.model.app(app).name,
                other
            ))),
        }
    }

    // --- Response event methods ---

    /// A service group finished starting its units.
    pub(crate) fn app_sg_started(
        &mut self,
        app: AppId,
        sg: SgId,
        node: Option<NodeId>,
    ) -> Result<(), AegisError> {
        debug!(
            "Application '{}': SG '{}' started",
            self.model.app(app).name,
            self.model.sg(sg).name
        );
        match self.model.app(app).acsm_state {
            AppAcsmState::StartingSgs => {
                if self.no_su_is_instantiating(app) {
                    self.model.app_mut(app).acsm_state = AppAcsmState::Started;
                    match self.model.app(app).node_to_start {
                        None => self.cluster_application_started(app)?,
                        Some(node_to_start) => {
                            self.node_application_started(node_to_start, app)?;
                        }
                    }
                }
                let _ = node;
                Ok(())
            }
            other => Err(AegisError::InvalidState(format!(
                "SG started report for '{}' in state {}",
                self.model.app(app).name,
                other
            ))),
        }
    }

    /// A service group finished assigning the SIs it protects.
    pub(crate) fn app_sg_assigned(&mut self, app: AppId, sg: SgId) -> Result<(), AegisError> {
        debug!(
            "Application '{}': SG '{}' assigned",
            self.model.app(app).name,
            self.model.sg(sg).name
        );
        match self.model.app(app).acsm_state {
            AppAcsmState::AssigningWorkload => self.app_enter_workload_assigned(app),
            other => Err(AegisError::InvalidState(format!(
                "SG assigned report for '{}' in state {}",
                self.model.app(app).name,
                other
            ))),
        }
    }

    /// Drains one deferred application event.
    pub(crate) fn app_recall_deferred(&mut self, app: AppId) -> Result<(), AegisError> {
        if let Some(event) = self.model.app_mut(app).deferred_events.pop() {
            match event {
                AppDeferredEvent::Start(node) => {
                    info!(
                        "Recalling deferred start of application '{}'",
                        self.model.app(app).name
                    );
                    self.app_start(app, node)?;
                }
                AppDeferredEvent::AssignWorkload(node) => {
                    info!(
                        "Recalling deferred workload assignment of '{}'",
                        self.model.app(app).name
                    );
                    self.app_assign_workload(app, node)?;
                }
            }
        }
        Ok(())
    }
}
