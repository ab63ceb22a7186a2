// src/core/engine/node.rs

//! The node state machine: join/leave handling, the escalation levels above
//! service-unit recovery, and the node repair (reboot) policy.

use tracing::{debug, info, warn};

use crate::core::engine::Engine;
use crate::core::errors::AegisError;
use crate::core::model::types::{
    AppAcsmState, NodeAcsmState, OperationalState, SgAcsmState,
};
use crate::core::model::{CompId, NodeId, SgId};

impl Engine {
    // --- Guards ---

    fn all_apps_started_with_no_starting_sgs(&self) -> bool {
        self.model
            .apps()
            .into_iter()
            .all(|app| self.model.app(app).acsm_state != AppAcsmState::StartingSgs)
    }

    fn all_apps_workload_assigned(&self) -> bool {
        self.model
            .apps()
            .into_iter()
            .all(|app| self.model.app(app).acsm_state == AppAcsmState::WorkloadAssigned)
    }

    fn all_sgs_on_node_idle(&self, node: NodeId) -> bool {
        self.model
            .sgs_with_su_on_node(node)
            .into_iter()
            .all(|sg| self.model.sg(sg).acsm_state == SgAcsmState::Idle)
    }

    // --- State entry helpers ---

    fn node_enter_leaving_spontaneously(&mut self, node: NodeId) {
        let n = self.model.node_mut(node);
        n.op_state = OperationalState::Disabled;
        n.node_id = 0;
    }

    /// Marks every component hosted on the node as gone and asks every
    /// affected service group to fail its workload over.
    fn node_enter_failing_over(&mut self, node: NodeId) -> Result<(), AegisError> {
        self.model.node_mut(node).acsm_state = NodeAcsmState::LeavingSpontaneouslyFailingOver;

        for sg in self.model.all_sgs() {
            for su in self.model.sus_of_sg(sg) {
                if self.model.su_hosted_on(su, node) {
                    for comp in self.model.comps_of_su(su) {
                        self.comp_node_left(comp);
                    }
                    // The unit itself is gone with its node; reset it quietly,
                    // the failover below owns the consequences.
                    {
                        let s = self.model.su_mut(su);
                        s.presence_state = crate::core::model::types::PresenceState::Uninstantiated;
                        s.rcsm_state = crate::core::model::types::SuRcsmState::IdleLevel0;
                    }
                    self.su_op_state_set(su, OperationalState::Disabled);
                }
            }
        }

        for sg in self.model.sgs_with_su_on_node(node) {
            self.sg_failover_node_req(sg, node)?;
        }
        Ok(())
    }

    fn failover_all_sg_on_node(&mut self, node: NodeId) -> Result<(), AegisError> {
        for sg in self.model.sgs_with_su_on_node(node) {
            self.sg_failover_node_req(sg, node)?;
        }
        Ok(())
    }

    fn node_enter_idle(&mut self, node: NodeId) {
        let history = self.model.node(node).history_state;
        debug!(
            "Node '{}' returning to history state {}",
            self.model.node(node).name,
            history
        );
        self.model.node_mut(node).acsm_state = history;
    }

    /// Reboots the node if it is this one; peer nodes just track the state.
    fn repair_node(&mut self, node: NodeId) {
        if node == self.self_node {
            let name = self.model.node(node).name.clone();
            self.repairer.repair(&name);
        }
    }

    // --- Event methods ---

    /// The node joined the cluster and its model is synchronized: start the
    /// applications' service units hosted there.
    pub(crate) fn node_sync_ready(&mut self, node: NodeId) -> Result<(), AegisError> {
        info!(
            "Node={}: sync ready, starting hosted SUs.",
            self.model.node(node).name
        );
        self.model.node_mut(node).op_state = OperationalState::Enabled;

        match self.model.node(node).acsm_state {
            s if s.is_idle()
                || s == NodeAcsmState::LeavingSpontaneouslyWaitingForNodeToJoin =>
            {
                self.model.node_mut(node).acsm_state = NodeAcsmState::JoiningStartingApplications;
                for app in self.model.apps() {
                    self.app_start(app, Some(node))?;
                }
                Ok(())
            }
            NodeAcsmState::RepairNeeded => Ok(()),
            other => Err(AegisError::InvalidState(format!(
                "sync ready for node '{}' in state {}",
                self.model.node(node).name,
                other
            ))),
        }
    }

    /// The node unexpectedly left the cluster.
    pub(crate) fn node_leave(&mut self, node: NodeId) -> Result<(), AegisError> {
        info!(
            "Node '{}' (CLM node '{}') left the cluster",
            self.model.node(node).name,
            self.model.node(node).clm_name
        );
        match self.model.node(node).acsm_state {
            s if s.is_idle() => {
                self.node_enter_leaving_spontaneously(node);
                self.node_enter_failing_over(node)
            }
            NodeAcsmState::RepairNeeded => Ok(()),
            NodeAcsmState::FailingGracefullyRebootingNode => {
                // The ordered reboot took effect; the node is repaired when
                // it comes back.
                self.model.node_mut(node).op_state = OperationalState::Enabled;
                self.node_enter_idle(node);
                Ok(())
            }
            other => Err(AegisError::InvalidState(format!(
                "node leave for '{}' in state {} (should have been deferred)",
                self.model.node(node).name,
                other
            ))),
        }
    }

    /// A detected error is to be recovered by failing over the whole node.
    pub(crate) fn node_failover(&mut self, node: NodeId) -> Result<(), AegisError> {
        match self.model.node(node).acsm_state {
            s if s.is_idle() => {
                self.model.node_mut(node).acsm_state =
                    NodeAcsmState::FailingGracefullyFailingOver;
                self.failover_all_sg_on_node(node)
            }
            NodeAcsmState::RepairNeeded => Ok(()),
            other => Err(AegisError::InvalidState(format!(
                "node failover for '{}' in state {} (should have been deferred)",
                self.model.node(node).name,
                other
            ))),
        }
    }

    /// An escalated component-restart request: decide between SU restart, SU
    /// failover, and failing over the whole node.
    pub(crate) fn node_comp_restart_req(
        &mut self,
        node: NodeId,
        comp: CompId,
    ) -> Result<(), AegisError> {
        let su = self.model.comp(comp).su;
        let acsm = self.model.node(node).acsm_state;
        debug!(
            "Component restart request for '{}' at node escalation {}",
            self.model.comp_dn(comp),
            acsm
        );

        match acsm {
            NodeAcsmState::IdleLevel0 => {
                self.model.node_mut(node).acsm_state = NodeAcsmState::IdleLevel2;
                self.node_comp_restart_req(node, comp)
            }
            NodeAcsmState::IdleLevel2 => {
                let su_restart_max = self.model.sg(self.model.su(su).sg).su_restart_max;
                if self.model.su(su).restart_count >= su_restart_max {
                    self.model.node_mut(node).acsm_state = NodeAcsmState::IdleLevel3;
                    self.comp_op_state_set(comp, OperationalState::Disabled)?;
                    self.su_op_state_set(su, OperationalState::Disabled);
                    info!(
                        "Error detected for '{}', recovery action: SU failover",
                        self.model.comp_dn(comp)
                    );
                    let sg = self.model.su(su).sg;
                    self.sg_failover_su_req(sg, su, node)
                } else {
                    self.su_restart(su)
                }
            }
            NodeAcsmState::IdleLevel3 => {
                if self.model.su(su).failover_count < self.model.node(node).su_failover_max {
                    self.comp_op_state_set(comp, OperationalState::Disabled)?;
                    self.su_op_state_set(su, OperationalState::Disabled);
                    info!(
                        "Error detected for '{}', recovery action: SU failover",
                        self.model.comp_dn(comp)
                    );
                    let sg = self.model.su(su).sg;
                    self.sg_failover_su_req(sg, su, node)
                } else {
                    self.model.node_mut(node).history_state = NodeAcsmState::IdleLevel0;
                    self.node_failover(node)
                }
            }
            other => Err(AegisError::InvalidState(format!(
                "component restart request in node state {}",
                other
            ))),
        }
    }

    /// An escalated component-failover request.
    pub(crate) fn node_comp_failover_req(
        &mut self,
        node: NodeId,
        comp: CompId,
    ) -> Result<(), AegisError> {
        let su = self.model.comp(comp).su;
        match self.model.node(node).acsm_state {
            NodeAcsmState::IdleLevel0 | NodeAcsmState::IdleLevel2 => {
                if self.model.su(su).failover {
                    let sg = self.model.su(su).sg;
                    self.sg_failover_su_req(sg, su, node)?;
                }
                Ok(())
            }
            NodeAcsmState::IdleLevel3 => {
                if self.model.su(su).failover_count < self.model.node(node).su_failover_max {
                    if self.model.su(su).failover {
                        let sg = self.model.su(su).sg;
                        self.sg_failover_su_req(sg, su, node)?;
                    }
                    Ok(())
                } else {
                    self.model.node_mut(node).history_state = NodeAcsmState::IdleLevel0;
                    self.node_failover(node)
                }
            }
            other => Err(AegisError::InvalidState(format!(
                "component failover request in node state {}",
                other
            ))),
        }
    }

    // --- Response event methods ---

    /// An application finished starting (no service unit of it is still in
    /// an -ING state).
    pub(crate) fn node_application_started(
        &mut self,
        node: NodeId,
        _app: crate::core::model::AppId,
    ) -> Result<(), AegisError> {
        match self.model.node(node).acsm_state {
            NodeAcsmState::JoiningStartingApplications => {
                if self.all_apps_started_with_no_starting_sgs() {
                    info!(
                        "Node={}: all applications started, assigning workload.",
                        self.model.node(node).name
                    );
                    self.model.node_mut(node).acsm_state =
                        NodeAcsmState::JoiningAssigningWorkload;
                    for app in self.model.apps() {
                        self.app_assign_workload(app, Some(node))?;
                    }
                }
                Ok(())
            }
            other => Err(AegisError::InvalidState(format!(
                "application started report in node state {}",
                other
            ))),
        }
    }

    /// An application finished assigning its workload.
    pub(crate) fn node_application_workload_assigned(
        &mut self,
        node: NodeId,
        _app: crate::core::model::AppId,
    ) -> Result<(), AegisError> {
        match self.model.node(node).acsm_state {
            NodeAcsmState::JoiningAssigningWorkload => {
                if self.all_apps_workload_assigned() {
                    info!("Node={}: all workload assigned", self.model.node(node).name);
                    self.node_enter_idle(node);
                }
                Ok(())
            }
            other => Err(AegisError::InvalidState(format!(
                "workload assigned report in node state {}",
                other
            ))),
        }
    }

    /// A service group finished failing over after this node went away.
    pub(crate) fn node_sg_failed_over(&mut self, node: NodeId, sg: SgId) -> Result<(), AegisError> {
        debug!(
            "Node '{}': SG '{}' finished failing over",
            self.model.node(node).name,
            self.model.sg(sg).name
        );
        match self.model.node(node).acsm_state {
            NodeAcsmState::LeavingSpontaneouslyFailingOver => {
                if self.all_sgs_on_node_idle(node) {
                    self.model.node_mut(node).acsm_state =
                        NodeAcsmState::LeavingSpontaneouslyWaitingForNodeToJoin;
                }
                Ok(())
            }
            NodeAcsmState::LeavingSpontaneouslyWaitingForNodeToJoin => {
                // Late completions of groups that already reported are fine.
                Ok(())
            }
            NodeAcsmState::FailingGracefullyFailingOver => {
                if self.all_sgs_on_node_idle(node) {
                    self.model.node_mut(node).acsm_state =
                        NodeAcsmState::FailingGracefullyRebootingNode;
                    self.repair_node(node);
                }
                Ok(())
            }
            other => {
                warn!(
                    "SG '{}' failed over while node '{}' is in state {}",
                    self.model.sg(sg).name,
                    self.model.node(node).name,
                    other
                );
                Ok(())
            }
        }
    }
}
