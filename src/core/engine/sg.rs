// src/core/engine/sg.rs

//! The service-group state machine: the N+M assignment algorithm and the
//! failover recovery sequence over a per-group recovery scope.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::engine::Engine;
use crate::core::errors::AegisError;
use crate::core::events::{Recallee, SgDeferredEvent};
use crate::core::model::RecoveryScope;
use crate::core::model::types::{
    AssumedCallback, EntityState, HaState, OperationalState, PresenceState, ReadinessState,
    RecoveryType, SgAcsmState,
};
use crate::core::model::{NodeId, SgId, SiId, SiaId, SuId};
use crate::core::timer::TimerKind;

fn div_round(a: u32, b: u32) -> u32 {
    a.div_ceil(b)
}

impl Engine {
    // --- Start and on-request assignment ---

    /// Instantiates the group's service units: all of them for a cluster
    /// start, or the ones hosted on `node` for a node join.
    pub(crate) fn sg_start(&mut self, sg: SgId, node: Option<NodeId>) {
        debug!("Starting SG '{}'", self.model.sg_dn(sg));
        let old_state = self.model.sg(sg).acsm_state;
        {
            let s = self.model.sg_mut(sg);
            s.node_to_start = node;
            s.acsm_state = SgAcsmState::InstantiatingServiceUnits;
        }

        let mut started = 0;
        for su in self.model.sus_of_sg(sg) {
            let matches = match node {
                None => true,
                Some(n) => self.model.su_hosted_on(su, n),
            };
            if matches {
                if let Err(e) = self.su_instantiate(su) {
                    warn!("Failed to instantiate '{}': {}", self.model.su_dn(su), e);
                }
                started += 1;
            }
        }
        if started == 0 {
            self.model.sg_mut(sg).acsm_state = old_state;
        }
    }

    /// Requests assignment of the SIs this group protects. Returns whether
    /// any assignment work is now in flight; with nothing to do the group
    /// falls straight back to idle.
    pub fn sg_assign_si_req(&mut self, sg: SgId, level: u32) -> Result<bool, AegisError> {
        // Dependency levels collapse into a single pass.
        let _ = level;
        self.model.sg_mut(sg).acsm_state = SgAcsmState::AssigningOnRequest;
        let pending = self.sg_do_assign_si(sg)?;
        if pending == 0 {
            self.sg_return_to_idle(sg)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// One pass of the N+M assignment algorithm. Returns the number of
    /// assignments whose HA transfer is now pending.
    fn sg_do_assign_si(&mut self, sg: SgId) -> Result<usize, AegisError> {
        let sis = self.model.sis_protected_by(sg);
        let si_total = sis.len() as u32;
        if si_total == 0 {
            return Ok(0);
        }

        // Reset stale requested states left behind by a partial failure, so
        // the walk below sees the confirmed picture.
        for &si in &sis {
            for sia in self.model.sias_of_si(si) {
                if let Some(a) = self.model.sia_mut(sia) {
                    a.requested_ha_state = a.ha_state;
                }
            }
        }

        let (pref_active, pref_standby, pref_inservice, max_active, max_standby) = {
            let s = self.model.sg(sg);
            (
                s.pref_active_sus,
                s.pref_standby_sus,
                s.pref_inservice_sus,
                s.max_active_sis_per_su,
                s.max_standby_sis_per_su,
            )
        };
        if pref_active == 0 {
            return Err(AegisError::Config(format!(
                "SG '{}' needs at least one preferred active SU",
                self.model.sg_dn(sg)
            )));
        }

        let inservice = self.sg_inservice_count(sg);
        let active_needed = div_round(si_total, max_active);
        // A group configured without standbys needs no standby units.
        let standby_needed = if pref_standby == 0 {
            0
        } else {
            div_round(si_total, max_standby)
        };

        // Reduction procedure: how many SUs take active, standby and spare
        // roles given how many are actually in service.
        let (su_active, su_standby, su_spare) = if inservice < active_needed {
            debug!("Assignment VI: partial assignment with SI drop-outs");
            (inservice, 0, 0)
        } else if inservice < active_needed + standby_needed {
            debug!("Assignment V: partial assignment with standby reduction");
            (active_needed, inservice - active_needed, 0)
        } else if inservice < pref_active + standby_needed {
            debug!("Assignment IV: full assignment with active reduction");
            (inservice - standby_needed, standby_needed, 0)
        } else if inservice < pref_active + pref_standby {
            debug!("Assignment III: full assignment with standby reduction");
            (pref_active, inservice - pref_active, 0)
        } else if inservice == pref_active + pref_standby {
            if pref_inservice > inservice {
                debug!("Assignment II: full assignment with spare reduction");
            } else {
                debug!("Assignment II: full assignment without spares");
            }
            (pref_active, pref_standby, 0)
        } else {
            debug!("Assignment I: full assignment with spares");
            (
                pref_active,
                pref_standby,
                inservice - pref_active - pref_standby,
            )
        };
        debug!(
            "SG '{}': inservice={} active={} standby={} spare={}",
            self.model.sg_dn(sg),
            inservice,
            su_active,
            su_standby,
            su_spare
        );

        if inservice == 0 {
            return Ok(0);
        }

        self.sg_assign_nm_active(sg, su_active);
        self.sg_assign_nm_standby(sg, su_standby);

        // Commit: issue the HA transfer for every new or changed assignment.
        let mut pending = 0;
        for &si in &sis {
            for sia in self.model.sias_of_si(si) {
                let differs = self
                    .model
                    .sia(sia)
                    .is_some_and(|a| a.requested_ha_state != a.ha_state);
                if differs {
                    pending += 1;
                    self.si_ha_state_assume(sia, AssumedCallback::SgAssignOnRequest)?;
                }
            }
        }
        Ok(pending)
    }

    fn sg_inservice_count(&self, sg: SgId) -> u32 {
        self.model
            .sus_of_sg(sg)
            .into_iter()
            .filter(|&su| self.model.su_readiness(su) == ReadinessState::InService)
            .count() as u32
    }

    /// Step 2: walk the service units in order and hand out active SIs,
    /// skipping units that are out of service or already carry standby work.
    fn sg_assign_nm_active(&mut self, sg: SgId, su_active_assign: u32) -> u32 {
        if su_active_assign == 0 {
            return 0;
        }
        let sis = self.model.sis_protected_by(sg);
        let max_active = self.model.sg(sg).max_active_sis_per_su;
        let mut si_left = sis.len() as u32;
        let mut su_left = su_active_assign;
        let mut total = 0;

        for su in self.model.sus_of_sg(sg) {
            if su_left == 0 {
                break;
            }
            let assign_to_su = div_round(si_left, su_left).min(max_active);
            if self.model.su_readiness(su) != ReadinessState::InService
                || self.model.su_curr_active_si_count(su) == assign_to_su
                || self.model.su_curr_standby_si_count(su) > 0
            {
                continue;
            }

            let mut assigned = 0;
            for &si in &sis {
                if assigned < assign_to_su && self.model.si_req_active_count(si) == 0 {
                    assigned += 1;
                    total += 1;
                    self.model.create_si_assignment(su, si, HaState::Active);
                }
            }
            su_left -= 1;
            si_left -= assigned;
        }
        if total == 0 {
            debug!("No active SIs assigned for '{}'", self.model.sg_dn(sg));
        }
        total
    }

    /// Step 3: the standby walk, skipping units that carry active work.
    fn sg_assign_nm_standby(&mut self, sg: SgId, su_standby_assign: u32) -> u32 {
        if su_standby_assign == 0 {
            return 0;
        }
        let sis = self.model.sis_protected_by(sg);
        let max_standby = self.model.sg(sg).max_standby_sis_per_su;
        let mut si_left = sis.len() as u32;
        let mut su_left = su_standby_assign;
        let mut total = 0;

        for su in self.model.sus_of_sg(sg) {
            if su_left == 0 {
                break;
            }
            let assign_to_su = div_round(si_left, su_left).min(max_standby);
            if self.model.su_readiness(su) != ReadinessState::InService
                || self.model.su_curr_active_si_count(su) > 0
                || self.model.su_curr_standby_si_count(su) == assign_to_su
            {
                continue;
            }

            let mut assigned = 0;
            for &si in &sis {
                if assigned < assign_to_su && self.model.si_req_standby_count(si) == 0 {
                    assigned += 1;
                    total += 1;
                    self.model.create_si_assignment(su, si, HaState::Standby);
                }
            }
            su_left -= 1;
            si_left -= assigned;
        }
        if total == 0 {
            debug!("No standby SIs assigned for '{}'", self.model.sg_dn(sg));
        }
        total
    }

    // --- Recovery entry points ---

    /// Failover of one service unit. Mid-recovery requests are deferred and
    /// recalled when the group returns to idle.
    pub(crate) fn sg_failover_su_req(
        &mut self,
        sg: SgId,
        su: SuId,
        node: NodeId,
    ) -> Result<(), AegisError> {
        if self.model.sg(sg).acsm_state != SgAcsmState::Idle {
            warn!(
                "Deferring SU failover for '{}': SG '{}' is in state {:?}",
                self.model.su_dn(su),
                self.model.sg_dn(sg),
                self.model.sg(sg).acsm_state
            );
            self.model
                .sg_mut(sg)
                .deferred_events
                .push(SgDeferredEvent::FailoverSu { su, node });
            return Ok(());
        }

        self.model.su_mut(su).failover_count += 1;
        self.sg_set_scope_for_failover_su(sg, su);
        if self.sg_any_scope_su_active(sg) {
            self.sg_enter_deactivating_dependent(sg)
        } else {
            self.sg_enter_terminating_suspected(sg)
        }
    }

    /// Failover of every service unit this group hosts on `node`.
    pub(crate) fn sg_failover_node_req(&mut self, sg: SgId, node: NodeId) -> Result<(), AegisError> {
        if self.model.sg(sg).acsm_state != SgAcsmState::Idle {
            warn!(
                "Deferring node failover for '{}': SG '{}' is in state {:?}",
                self.model.node(node).name,
                self.model.sg_dn(sg),
                self.model.sg(sg).acsm_state
            );
            self.model
                .sg_mut(sg)
                .deferred_events
                .push(SgDeferredEvent::FailoverNode { node });
            return Ok(());
        }

        self.sg_set_scope_for_failover_node(sg, node);
        if self.sg_any_scope_su_active(sg) {
            self.sg_enter_deactivating_dependent(sg)
        } else if self.sg_scope_su_needing_termination(sg).is_some() {
            self.sg_enter_terminating_suspected(sg)
        } else {
            self.sg_delete_si_assignments_in_scope(sg);
            self.sg_return_to_idle(sg)
        }
    }

    // --- Recovery scope construction ---

    fn sg_set_scope_for_failover_su(&mut self, sg: SgId, su: SuId) {
        info!(
            "'FailoverSU' for '{}' recovery action started",
            self.model.su_dn(su)
        );
        debug_assert_eq!(self.model.su(su).sg, sg);

        let mut sis: Vec<SiId> = Vec::new();
        for sia in self.model.sias_of_su(su) {
            if let Some(a) = self.model.sia(sia)
                && !sis.contains(&a.si)
            {
                sis.push(a.si);
            }
        }
        self.model.sg_mut(sg).recovery_scope = RecoveryScope {
            recovery_type: Some(RecoveryType::FailoverSu),
            sus: vec![su],
            sis,
            comp: None,
            node: None,
        };
    }

    fn sg_set_scope_for_failover_node(&mut self, sg: SgId, node: NodeId) {
        info!(
            "'FailoverNode' for node '{}' recovery action started",
            self.model.node(node).name
        );
        let sus: Vec<SuId> = self
            .model
            .sus_of_sg(sg)
            .into_iter()
            .filter(|&su| self.model.su_hosted_on(su, node))
            .collect();
        let mut sis: Vec<SiId> = Vec::new();
        for &su in &sus {
            for sia in self.model.sias_of_su(su) {
                if let Some(a) = self.model.sia(sia)
                    && !sis.contains(&a.si)
                {
                    sis.push(a.si);
                }
            }
        }
        self.model.sg_mut(sg).recovery_scope = RecoveryScope {
            recovery_type: Some(RecoveryType::FailoverNode),
            sus,
            sis,
            comp: None,
            node: Some(node),
        };
    }

    // --- Scope queries ---

    fn sg_any_scope_su_active(&self, sg: SgId) -> bool {
        self.model
            .sg(sg)
            .recovery_scope
            .sus
            .iter()
            .any(|&su| {
                self.model.sias_of_su(su).into_iter().any(|sia| {
                    self.model
                        .sia(sia)
                        .is_some_and(|a| a.ha_state == Some(HaState::Active))
                })
            })
    }

    /// The first scoped service unit that is still up and must be terminated.
    fn sg_scope_su_needing_termination(&self, sg: SgId) -> Option<SuId> {
        self.model
            .sg(sg)
            .recovery_scope
            .sus
            .iter()
            .copied()
            .find(|&su| {
                !matches!(
                    self.model.su(su).presence_state,
                    PresenceState::Uninstantiated
                        | PresenceState::InstantiationFailed
                        | PresenceState::TerminationFailed
                )
            })
    }

    fn sg_all_scope_su_has_presence(&self, sg: SgId, state: PresenceState) -> bool {
        self.model
            .sg(sg)
            .recovery_scope
            .sus
            .iter()
            .all(|&su| self.model.su(su).presence_state == state)
    }

    /// Any scoped SI with no active assignment but at least one standby.
    fn sg_is_standby_for_non_active_si_in_scope(&self, sg: SgId) -> bool {
        self.model.sg(sg).recovery_scope.sis.iter().any(|&si| {
            self.model.si_curr_active_count(si) == 0 && self.model.si_curr_standby_count(si) > 0
        })
    }

    fn sg_su_instantiated_count(&self, sg: SgId) -> u32 {
        self.model
            .sus_of_sg(sg)
            .into_iter()
            .filter(|&su| self.model.su(su).presence_state == PresenceState::Instantiated)
            .count() as u32
    }

    /// Whether every service unit in the start scope reached a terminal
    /// start outcome (instantiated, or failed and thus skipped).
    fn sg_all_su_started(&self, sg: SgId, node: Option<NodeId>) -> bool {
        for su in self.model.sus_of_sg(sg) {
            let done = matches!(
                self.model.su(su).presence_state,
                PresenceState::Instantiated | PresenceState::InstantiationFailed
            );
            if !done {
                match node {
                    None => return false,
                    Some(n) => {
                        if self.model.su_hosted_on(su, n) {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    // --- Assignment teardown ---

    fn sg_delete_si_assignments_of_su(&mut self, su: SuId) {
        let sg = self.model.su(su).sg;
        for si in self.model.sis_protected_by(sg) {
            for csi in self.model.csis_of_si(si) {
                self.model.delete_csi_assignments(csi, su);
            }
            for sia in self.model.sias_of_si(si) {
                if self.model.sia(sia).is_some_and(|a| a.su == su) {
                    debug!("SI assignment of '{}' unlinked", self.model.si_dn(si));
                    self.model.delete_si_assignment(sia);
                }
            }
        }
    }

    fn sg_delete_si_assignments_in_scope(&mut self, sg: SgId) {
        for su in self.model.sg(sg).recovery_scope.sus.clone() {
            self.sg_delete_si_assignments_of_su(su);
        }
    }

    // --- Recovery sequence states ---

    /// Quiesce the workload of every SI that depends on an SI in the scope.
    /// With no dependents, completion is reported on the next tick.
    fn sg_enter_deactivating_dependent(&mut self, sg: SgId) -> Result<(), AegisError> {
        self.model.sg_mut(sg).acsm_state = SgAcsmState::DeactivatingDependantWorkload;

        let mut pending = false;
        for si in self.model.sg(sg).recovery_scope.sis.clone() {
            for dependent in self.model.dependents_of_si(si) {
                for sia in self.model.sias_of_si(dependent) {
                    let is_active = self
                        .model
                        .sia(sia)
                        .is_some_and(|a| a.ha_state == Some(HaState::Active));
                    if is_active {
                        if let Some(a) = self.model.sia_mut(sia) {
                            a.requested_ha_state = Some(HaState::Quiesced);
                        }
                        self.si_ha_state_assume(sia, AssumedCallback::SgDependentDeactivated)?;
                        pending = true;
                    }
                }
            }
        }

        if !pending {
            self.timers
                .add(Duration::ZERO, TimerKind::DependentsDeactivated(sg));
        }
        Ok(())
    }

    fn sg_enter_terminating_suspected(&mut self, sg: SgId) -> Result<(), AegisError> {
        self.model.sg_mut(sg).acsm_state = SgAcsmState::TerminatingSuspected;
        for su in self.model.sg(sg).recovery_scope.sus.clone() {
            self.su_terminate(su)?;
        }
        Ok(())
    }

    /// Activates exactly one standby assignment per scoped SI.
    fn sg_enter_activating_standby(&mut self, sg: SgId) -> Result<(), AegisError> {
        self.model.sg_mut(sg).acsm_state = SgAcsmState::ActivatingStandby;

        let mut activated = false;
        for si in self.model.sg(sg).recovery_scope.sis.clone() {
            for sia in self.model.sias_of_si(si) {
                let is_standby = self
                    .model
                    .sia(sia)
                    .is_some_and(|a| a.ha_state == Some(HaState::Standby));
                if is_standby {
                    if let Some(a) = self.model.sia_mut(sia) {
                        a.requested_ha_state = Some(HaState::Active);
                    }
                    self.si_ha_state_assume(sia, AssumedCallback::SgStandbyActivated)?;
                    activated = true;
                    break;
                }
            }
        }

        if !activated {
            self.model.sg_mut(sg).acsm_state = SgAcsmState::AssigningStandbyToSpare;
            self.sg_enter_repairing_su(sg)?;
        }
        Ok(())
    }

    /// Re-instantiates scoped service units up to the in-service preference,
    /// skipping units whose hosting node is disabled.
    fn sg_enter_repairing_su(&mut self, sg: SgId) -> Result<(), AegisError> {
        self.model.sg_mut(sg).acsm_state = SgAcsmState::ReparingSu;
        let pref_inservice = self.model.sg(sg).pref_inservice_sus;

        let mut any_instantiating = false;
        for su in self.model.sg(sg).recovery_scope.sus.clone() {
            if self.sg_su_instantiated_count(sg) >= pref_inservice {
                break;
            }
            let node = self.model.node_of_su(su)?;
            if self.model.node(node).op_state != OperationalState::Enabled {
                debug!(
                    "Skipping repair of '{}': node '{}' is disabled",
                    self.model.su_dn(su),
                    self.model.node(node).name
                );
                continue;
            }
            if self.su_instantiate(su)? {
                any_instantiating = true;
            }
        }

        if !any_instantiating {
            self.sg_return_to_idle(sg)?;
        }
        Ok(())
    }

    /// Ends the current composite action: clears the recovery scope, reports
    /// completion, and recalls one deferred event if any are queued.
    pub(crate) fn sg_return_to_idle(&mut self, sg: SgId) -> Result<(), AegisError> {
        self.model.sg_mut(sg).acsm_state = SgAcsmState::Idle;
        let scope = std::mem::take(&mut self.model.sg_mut(sg).recovery_scope);
        self.model.sg_mut(sg).node_to_start = None;

        match scope.recovery_type {
            Some(RecoveryType::FailoverSu) => {
                let dn = scope
                    .sus
                    .first()
                    .map(|&su| self.model.su_dn(su))
                    .unwrap_or_default();
                info!("'{}' FailoverSU recovery action finished", dn);
            }
            Some(RecoveryType::FailoverNode) => {
                info!(
                    "'FailoverNode for {}' recovery action finished",
                    self.model.sg(sg).name
                );
            }
            None => {}
        }

        if let (Some(node), Some(RecoveryType::FailoverNode)) = (scope.node, scope.recovery_type) {
            self.node_sg_failed_over(node, sg)?;
        }

        if !self.model.sg(sg).deferred_events.is_empty() {
            self.timers
                .add(Duration::ZERO, TimerKind::RecallDeferred(Recallee::Sg(sg)));
        }
        Ok(())
    }

    // --- Reports and continuations ---

    /// A service unit reported a presence change.
    pub(crate) fn sg_su_state_changed(
        &mut self,
        sg: SgId,
        su: SuId,
        state: EntityState,
    ) -> Result<(), AegisError> {
        let acsm = self.model.sg(sg).acsm_state;
        let presence = match state {
            EntityState::Presence(p) => p,
            EntityState::Operational(_) => {
                debug!(
                    "SG '{}' noting operational change of '{}'",
                    self.model.sg_dn(sg),
                    self.model.su_dn(su)
                );
                return Ok(());
            }
        };
        debug!(
            "SG '{}' SU '{}' presence {} in state {:?}",
            self.model.sg_dn(sg),
            self.model.su_dn(su),
            presence,
            acsm
        );

        match presence {
            PresenceState::Instantiated => match acsm {
                SgAcsmState::InstantiatingServiceUnits => {
                    let node = self.model.sg(sg).node_to_start;
                    if self.sg_all_su_started(sg, node) {
                        self.model.sg_mut(sg).acsm_state = SgAcsmState::Idle;
                        let app = self.model.sg(sg).app;
                        self.app_sg_started(app, sg, node)?;
                    }
                    Ok(())
                }
                SgAcsmState::ReparingSu => {
                    if self.sg_all_scope_su_has_presence(sg, PresenceState::Instantiated) {
                        self.model.sg_mut(sg).acsm_state = SgAcsmState::AssigningStandBy;
                        if self.sg_do_assign_si(sg)? == 0 {
                            self.sg_return_to_idle(sg)?;
                        }
                    }
                    Ok(())
                }
                other => Err(AegisError::InvalidState(format!(
                    "SU '{}' instantiated while SG '{}' is in state {:?}",
                    self.model.su_dn(su),
                    self.model.sg_dn(sg),
                    other
                ))),
            },

            PresenceState::Uninstantiated => match acsm {
                SgAcsmState::TerminatingSuspected => {
                    if self.sg_all_scope_su_has_presence(sg, PresenceState::Uninstantiated) {
                        self.sg_delete_si_assignments_in_scope(sg);
                        if self.sg_is_standby_for_non_active_si_in_scope(sg) {
                            self.sg_enter_activating_standby(sg)?;
                        } else {
                            self.model.sg_mut(sg).acsm_state = SgAcsmState::AssigningStandbyToSpare;
                            self.sg_enter_repairing_su(sg)?;
                        }
                    }
                    Ok(())
                }
                other => Err(AegisError::InvalidState(format!(
                    "SU '{}' uninstantiated while SG '{}' is in state {:?}",
                    self.model.su_dn(su),
                    self.model.sg_dn(sg),
                    other
                ))),
            },

            PresenceState::InstantiationFailed => match acsm {
                SgAcsmState::InstantiatingServiceUnits => {
                    // The unit stays out of service and is skipped in
                    // assignment; the group start completes around it.
                    warn!(
                        "SU '{}' failed to instantiate during start",
                        self.model.su_dn(su)
                    );
                    let node = self.model.sg(sg).node_to_start;
                    if self.sg_all_su_started(sg, node) {
                        self.model.sg_mut(sg).acsm_state = SgAcsmState::Idle;
                        let app = self.model.sg(sg).app;
                        self.app_sg_started(app, sg, node)?;
                    }
                    Ok(())
                }
                SgAcsmState::ReparingSu => {
                    warn!(
                        "Repair of SU '{}' failed, abandoning recovery",
                        self.model.su_dn(su)
                    );
                    self.sg_return_to_idle(sg)
                }
                _ => {
                    warn!(
                        "SU '{}' instantiation failed while SG '{}' is in state {:?}",
                        self.model.su_dn(su),
                        self.model.sg_dn(sg),
                        acsm
                    );
                    Ok(())
                }
            },

            PresenceState::TerminationFailed => {
                // Stuck until node-level repair takes the whole node down.
                warn!(
                    "SU '{}' failed to terminate; awaiting node repair",
                    self.model.su_dn(su)
                );
                Ok(())
            }

            PresenceState::Instantiating
            | PresenceState::Restarting
            | PresenceState::Terminating => Ok(()),
        }
    }

    /// Continuation of the on-request assignment commit: once every
    /// assignment of the protected SIs is confirmed, report to the owning
    /// application (or simply return to idle after a repair re-assignment).
    pub(crate) fn sg_assign_si_assumed_cb(&mut self, sia: SiaId) -> Result<(), AegisError> {
        let sg = match self.model.sia(sia) {
            Some(a) => self.model.su(a.su).sg,
            None => return Ok(()),
        };

        let mut total = 0usize;
        let mut confirmed = 0usize;
        for si in self.model.sis_protected_by(sg) {
            for sia in self.model.sias_of_si(si) {
                if let Some(a) = self.model.sia(sia) {
                    total += 1;
                    if a.requested_ha_state.is_some() && a.requested_ha_state == a.ha_state {
                        confirmed += 1;
                    }
                }
            }
        }
        if confirmed == 0 {
            return Err(AegisError::InvalidState(format!(
                "assignment confirmation with no confirmed assignments in '{}'",
                self.model.sg_dn(sg)
            )));
        }

        match self.model.sg(sg).acsm_state {
            SgAcsmState::AssigningOnRequest => {
                if total == confirmed {
                    self.sg_return_to_idle(sg)?;
                    let app = self.model.sg(sg).app;
                    self.app_sg_assigned(app, sg)?;
                }
                Ok(())
            }
            SgAcsmState::AssigningStandBy => {
                if total == confirmed {
                    self.sg_return_to_idle(sg)?;
                }
                Ok(())
            }
            other => Err(AegisError::InvalidState(format!(
                "assignment confirmed while SG '{}' is in state {:?}",
                self.model.sg_dn(sg),
                other
            ))),
        }
    }

    /// Continuation of standby promotion during recovery: once every scoped
    /// SI has an active assignment, move on to repair.
    pub(crate) fn sg_standby_su_activated_cb(&mut self, sia: SiaId) -> Result<(), AegisError> {
        let sg = match self.model.sia(sia) {
            Some(a) => self.model.su(a.su).sg,
            None => return Ok(()),
        };
        let all_active = self
            .model
            .sg(sg)
            .recovery_scope
            .sis
            .iter()
            .all(|&si| self.model.si_curr_active_count(si) > 0);
        if all_active {
            self.model.sg_mut(sg).acsm_state = SgAcsmState::AssigningStandbyToSpare;
            self.sg_enter_repairing_su(sg)?;
        }
        Ok(())
    }

    /// Continuation of dependent-workload quiescing. The confirmed
    /// assignment belongs to a *dependent* SI, possibly protected by another
    /// group, so the recovering group is found by state: once every quiesce
    /// it requested is confirmed, it picks its next recovery step.
    pub(crate) fn sg_dependent_si_deactivated_cb(&mut self, _sia: SiaId) -> Result<(), AegisError> {
        let recovering: Vec<SgId> = self
            .model
            .all_sgs()
            .into_iter()
            .filter(|&sg| {
                self.model.sg(sg).acsm_state == SgAcsmState::DeactivatingDependantWorkload
            })
            .collect();

        for sg in recovering {
            let mut pending = false;
            'scope: for si in self.model.sg(sg).recovery_scope.sis.clone() {
                for dependent in self.model.dependents_of_si(si) {
                    for sia in self.model.sias_of_si(dependent) {
                        if let Some(a) = self.model.sia(sia)
                            && a.ha_state != a.requested_ha_state
                        {
                            pending = true;
                            break 'scope;
                        }
                    }
                }
            }
            if !pending {
                self.sg_dependents_deactivated_tick(sg)?;
            }
        }
        Ok(())
    }

    /// Next step after dependent workload is down (or there was none).
    pub(crate) fn sg_dependents_deactivated_tick(&mut self, sg: SgId) -> Result<(), AegisError> {
        if self.sg_scope_su_needing_termination(sg).is_some() {
            self.sg_enter_terminating_suspected(sg)
        } else {
            self.sg_delete_si_assignments_in_scope(sg);
            self.sg_enter_activating_standby(sg)
        }
    }

    /// Drains one deferred service-group event.
    pub(crate) fn sg_recall_deferred(&mut self, sg: SgId) -> Result<(), AegisError> {
        if let Some(event) = self.model.sg_mut(sg).deferred_events.pop() {
            match event {
                SgDeferredEvent::FailoverSu { su, node } => {
                    info!(
                        "Recalling deferred SU failover for '{}'",
                        self.model.su_dn(su)
                    );
                    self.sg_failover_su_req(sg, su, node)?;
                }
                SgDeferredEvent::FailoverNode { node } => {
                    info!(
                        "Recalling deferred node failover for '{}'",
                        self.model.node(node).name
                    );
                    self.sg_failover_node_req(sg, node)?;
                }
            }
        }
        Ok(())
    }
}
