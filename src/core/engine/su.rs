// src/core/engine/su.rs

//! The service-unit state machine: presence/operational aggregation over
//! components, instantiation-level sequencing, and the restart-control
//! escalation ladder.

use tracing::{debug, info, warn};

use crate::core::engine::Engine;
use crate::core::errors::AegisError;
use crate::core::events::SuDeferredEvent;
use crate::core::model::types::{
    AssumedCallback, EntityState, OperationalState, PresenceState, RecommendedRecovery,
    SuRcsmState,
};
use crate::core::model::{CompId, SiaId, SuId};
use crate::core::timer::TimerKind;

impl Engine {
    // --- Instantiation-level helpers ---

    fn comps_at_level(&self, su: SuId, level: u32) -> Vec<CompId> {
        self.model
            .comps_of_su(su)
            .into_iter()
            .filter(|&c| self.model.comp(c).instantiation_level == level)
            .collect()
    }

    fn lowest_level(&self, su: SuId) -> Option<u32> {
        self.model
            .comps_of_su(su)
            .into_iter()
            .map(|c| self.model.comp(c).instantiation_level)
            .min()
    }

    fn highest_level(&self, su: SuId) -> Option<u32> {
        self.model
            .comps_of_su(su)
            .into_iter()
            .map(|c| self.model.comp(c).instantiation_level)
            .max()
    }

    fn next_level_above(&self, su: SuId, level: u32) -> Option<u32> {
        self.model
            .comps_of_su(su)
            .into_iter()
            .map(|c| self.model.comp(c).instantiation_level)
            .filter(|&l| l > level)
            .min()
    }

    fn next_level_below(&self, su: SuId, level: u32) -> Option<u32> {
        self.model
            .comps_of_su(su)
            .into_iter()
            .map(|c| self.model.comp(c).instantiation_level)
            .filter(|&l| l < level)
            .max()
    }

    fn any_comp_in_state(&self, su: SuId, state: PresenceState) -> bool {
        self.model
            .comps_of_su(su)
            .into_iter()
            .any(|c| self.model.comp(c).presence_state == state)
    }

    fn all_comps_in_state(&self, su: SuId, state: PresenceState) -> bool {
        self.model
            .comps_of_su(su)
            .into_iter()
            .all(|c| self.model.comp(c).presence_state == state)
    }

    fn all_comps_at_level_instantiated(&self, su: SuId, level: u32) -> bool {
        self.comps_at_level(su, level)
            .into_iter()
            .all(|c| self.model.comp(c).presence_state == PresenceState::Instantiated)
    }

    fn all_comps_at_level_down(&self, su: SuId, level: u32) -> bool {
        self.comps_at_level(su, level).into_iter().all(|c| {
            matches!(
                self.model.comp(c).presence_state,
                PresenceState::Uninstantiated | PresenceState::TerminationFailed
            )
        })
    }

    fn worst_comp_presence(&self, su: SuId) -> PresenceState {
        self.model
            .comps_of_su(su)
            .into_iter()
            .map(|c| self.model.comp(c).presence_state)
            .max()
            .unwrap_or(PresenceState::Uninstantiated)
    }

    // --- Presence / operational setters ---

    /// Sets the service-unit presence state, clears stale confirmed HA states
    /// when leaving UNINSTANTIATED, and reports upward unless a restart
    /// recovery wants to observe the transition itself.
    pub(crate) fn su_presence_set(
        &mut self,
        su: SuId,
        state: PresenceState,
    ) -> Result<(), AegisError> {
        let old = self.model.su(su).presence_state;
        if old == state {
            return Ok(());
        }
        if old == PresenceState::Uninstantiated {
            for sia in self.model.sias_of_su(su) {
                if let Some(a) = self.model.sia_mut(sia) {
                    a.ha_state = None;
                }
            }
        }
        self.model.su_mut(su).presence_state = state;
        info!(
            "Setting SU '{}' presence state: {}",
            self.model.su_dn(su),
            state
        );

        let rcsm = self.model.su(su).rcsm_state;
        if rcsm != SuRcsmState::RestartSuSetting && rcsm != SuRcsmState::RestartCompRestarting {
            let sg = self.model.su(su).sg;
            self.sg_su_state_changed(sg, su, EntityState::Presence(state))?;
        }
        Ok(())
    }

    pub(crate) fn su_op_state_set(&mut self, su: SuId, state: OperationalState) {
        if self.model.su(su).op_state == state {
            return;
        }
        self.model.su_mut(su).op_state = state;
        info!(
            "Setting SU '{}' operational state: {}",
            self.model.su_dn(su),
            state
        );
        info!(
            "Setting SU '{}' readiness state: {}",
            self.model.su_dn(su),
            self.model.su_readiness(su)
        );
    }

    // --- Lifecycle entry points ---

    /// Starts instantiating the service unit bottom-up from its lowest
    /// component instantiation level. Returns whether any instantiation was
    /// initiated or already running.
    pub(crate) fn su_instantiate(&mut self, su: SuId) -> Result<bool, AegisError> {
        debug!(
            "Instantiating SU '{}' in presence state {}",
            self.model.su_dn(su),
            self.model.su(su).presence_state
        );
        match self.model.su(su).presence_state {
            PresenceState::Uninstantiated => {
                let Some(level) = self.lowest_level(su) else {
                    warn!("SU '{}' has no components", self.model.su_dn(su));
                    return Ok(false);
                };
                self.model.su_mut(su).current_instantiation_level = level;
                for comp in self.comps_at_level(su, level) {
                    self.comp_instantiate(comp)?;
                }
                Ok(true)
            }
            PresenceState::Restarting | PresenceState::Instantiating => Ok(true),
            PresenceState::Instantiated
            | PresenceState::Terminating
            | PresenceState::InstantiationFailed
            | PresenceState::TerminationFailed => Ok(false),
        }
    }

    /// Abruptly terminates the service unit top-down from its highest
    /// component instantiation level.
    pub fn su_terminate(&mut self, su: SuId) -> Result<(), AegisError> {
        debug!("Terminating SU '{}'", self.model.su_dn(su));
        let Some(level) = self.highest_level(su) else {
            return Ok(());
        };
        self.model.su_mut(su).current_instantiation_level = level;
        for comp in self.comps_at_level(su, level) {
            self.comp_terminate(comp)?;
        }
        Ok(())
    }

    /// Restart recovery for the whole service unit.
    pub(crate) fn su_restart(&mut self, su: SuId) -> Result<(), AegisError> {
        info!(
            "Error detected for '{}', recovery action: SU restart",
            self.model.su_dn(su)
        );
        {
            let s = self.model.su_mut(su);
            s.rcsm_state = SuRcsmState::RestartSuInstantiating;
            s.escalation_history_state = SuRcsmState::IdleLevel2;
            s.restart_count += 1;
        }
        for comp in self.model.comps_of_su(su) {
            self.comp_restart(comp)?;
        }
        Ok(())
    }

    // --- Component state reports ---

    /// A component reported a state change.
    pub(crate) fn su_comp_state_changed(
        &mut self,
        su: SuId,
        comp: CompId,
        state: EntityState,
    ) -> Result<(), AegisError> {
        match state {
            EntityState::Presence(p) => self.su_comp_presence_changed(su, comp, p),
            EntityState::Operational(o) => self.su_comp_op_changed(su, o),
        }
    }

    fn su_comp_presence_changed(
        &mut self,
        su: SuId,
        comp: CompId,
        state: PresenceState,
    ) -> Result<(), AegisError> {
        let rcsm = self.model.su(su).rcsm_state;
        debug!(
            "SU '{}' component '{}' presence {} (rcsm {})",
            self.model.su_dn(su),
            self.model.comp(comp).name,
            state,
            rcsm
        );

        match state {
            PresenceState::Instantiated => match rcsm {
                SuRcsmState::IdleLevel0 | SuRcsmState::IdleLevel1 | SuRcsmState::IdleLevel2 => {
                    if self.any_comp_in_state(su, PresenceState::Instantiating) {
                        return Ok(());
                    }
                    let level = self.model.su(su).current_instantiation_level;
                    if self.all_comps_at_level_instantiated(su, level) {
                        match self.next_level_above(su, level) {
                            Some(next) => {
                                self.model.su_mut(su).current_instantiation_level = next;
                                for c in self.comps_at_level(su, next) {
                                    self.comp_instantiate(c)?;
                                }
                            }
                            None => self.su_presence_set(su, PresenceState::Instantiated)?,
                        }
                    } else if self.any_comp_in_state(su, PresenceState::InstantiationFailed) {
                        self.su_presence_set(su, PresenceState::InstantiationFailed)?;
                    } else {
                        return Err(AegisError::InvalidState(format!(
                            "component instantiated in inconsistent SU '{}'",
                            self.model.su_dn(su)
                        )));
                    }
                    Ok(())
                }
                SuRcsmState::RestartCompRestarting => {
                    self.model.su_mut(su).rcsm_state = SuRcsmState::RestartCompSetting;
                    self.su_reassign_sis(su)
                }
                SuRcsmState::RestartSuInstantiating => {
                    if self.any_comp_in_state(su, PresenceState::Restarting) {
                        return Ok(());
                    }
                    if self.all_comps_in_state(su, PresenceState::Instantiated) {
                        self.model.su_mut(su).rcsm_state = SuRcsmState::RestartSuSetting;
                        self.su_presence_set(su, PresenceState::Instantiated)?;
                        self.su_reassign_sis(su)
                    } else if self.any_comp_in_state(su, PresenceState::InstantiationFailed) {
                        self.su_presence_set(su, PresenceState::InstantiationFailed)
                    } else {
                        Err(AegisError::InvalidState(format!(
                            "restart of SU '{}' saw inconsistent component states",
                            self.model.su_dn(su)
                        )))
                    }
                }
                other => Err(AegisError::InvalidState(format!(
                    "component instantiated while SU '{}' rcsm is {}",
                    self.model.su_dn(su),
                    other
                ))),
            },

            PresenceState::Uninstantiated => {
                if self.any_comp_in_state(su, PresenceState::Terminating) {
                    return Ok(());
                }
                let level = self.model.su(su).current_instantiation_level;
                if self.all_comps_at_level_down(su, level) {
                    match self.next_level_below(su, level) {
                        Some(prev) => {
                            self.model.su_mut(su).current_instantiation_level = prev;
                            for c in self.comps_at_level(su, prev) {
                                self.comp_terminate(c)?;
                            }
                        }
                        None => {
                            let worst = self.worst_comp_presence(su);
                            self.su_presence_set(su, worst)?;
                        }
                    }
                }
                Ok(())
            }

            PresenceState::Instantiating => self.su_presence_set(su, PresenceState::Instantiating),

            PresenceState::Restarting | PresenceState::Terminating => Ok(()),

            PresenceState::InstantiationFailed => match rcsm {
                SuRcsmState::IdleLevel0 | SuRcsmState::IdleLevel1 | SuRcsmState::IdleLevel2 => {
                    if !self.any_comp_in_state(su, PresenceState::Instantiating) {
                        self.su_presence_set(su, PresenceState::InstantiationFailed)?;
                    }
                    Ok(())
                }
                SuRcsmState::RestartCompRestarting => {
                    let history = self.model.su(su).escalation_history_state;
                    self.model.su_mut(su).rcsm_state = history;
                    self.su_presence_set(su, PresenceState::InstantiationFailed)
                }
                SuRcsmState::RestartSuInstantiating => {
                    if !self.any_comp_in_state(su, PresenceState::Instantiating) {
                        let history = self.model.su(su).escalation_history_state;
                        self.model.su_mut(su).rcsm_state = history;
                        self.su_presence_set(su, PresenceState::InstantiationFailed)?;
                    }
                    Ok(())
                }
                other => Err(AegisError::InvalidState(format!(
                    "instantiation failure while SU '{}' rcsm is {}",
                    self.model.su_dn(su),
                    other
                ))),
            },

            PresenceState::TerminationFailed => match rcsm {
                SuRcsmState::IdleLevel0 | SuRcsmState::IdleLevel1 | SuRcsmState::IdleLevel2 => {
                    if self.any_comp_in_state(su, PresenceState::Terminating) {
                        return Ok(());
                    }
                    let level = self.model.su(su).current_instantiation_level;
                    if self.all_comps_at_level_down(su, level) {
                        match self.next_level_below(su, level) {
                            Some(prev) => {
                                self.model.su_mut(su).current_instantiation_level = prev;
                                for c in self.comps_at_level(su, prev) {
                                    self.comp_terminate(c)?;
                                }
                            }
                            None => {
                                let worst = self.worst_comp_presence(su);
                                self.su_presence_set(su, worst)?;
                            }
                        }
                    }
                    Ok(())
                }
                SuRcsmState::RestartCompRestarting => {
                    let history = self.model.su(su).escalation_history_state;
                    self.model.su_mut(su).rcsm_state = history;
                    self.su_presence_set(su, PresenceState::TerminationFailed)
                }
                SuRcsmState::RestartSuInstantiating | SuRcsmState::RestartSuTerminating => {
                    if !self.any_comp_in_state(su, PresenceState::Terminating) {
                        let history = self.model.su(su).escalation_history_state;
                        self.model.su_mut(su).rcsm_state = history;
                        self.su_presence_set(su, PresenceState::TerminationFailed)?;
                    }
                    Ok(())
                }
                other => Err(AegisError::InvalidState(format!(
                    "termination failure while SU '{}' rcsm is {}",
                    self.model.su_dn(su),
                    other
                ))),
            },
        }
    }

    /// Operational aggregation: the service unit is ENABLED iff every
    /// component is ENABLED.
    fn su_comp_op_changed(&mut self, su: SuId, state: OperationalState) -> Result<(), AegisError> {
        match state {
            OperationalState::Enabled => {
                let all_enabled = self
                    .model
                    .comps_of_su(su)
                    .into_iter()
                    .all(|c| self.model.comp(c).op_state == OperationalState::Enabled);
                if all_enabled {
                    self.su_op_state_set(su, OperationalState::Enabled);
                } else {
                    self.su_op_state_set(su, OperationalState::Disabled);
                }
            }
            OperationalState::Disabled => {
                self.su_op_state_set(su, OperationalState::Disabled);
            }
        }
        Ok(())
    }

    // --- Restart escalation ladder ---

    fn comp_restarted_max_times(&self, su: SuId, comp: CompId) -> bool {
        let max = self.model.sg(self.model.su(su).sg).comp_restart_max;
        self.model.comp(comp).restart_count >= max
    }

    fn su_comp_restart_recovery(&mut self, su: SuId, comp: CompId) -> Result<(), AegisError> {
        info!(
            "Error detected for '{}', recovery action: Component restart",
            self.model.comp_dn(comp)
        );
        {
            let s = self.model.su_mut(su);
            s.rcsm_state = SuRcsmState::RestartCompRestarting;
            s.escalation_history_state = SuRcsmState::IdleLevel1;
        }
        self.comp_restart(comp)
    }

    /// A suspected error on a component. Level 1 restarts the component;
    /// exceeding the restart budget escalates through level 2 to the node.
    pub(crate) fn su_comp_error_suspected(
        &mut self,
        su: SuId,
        comp: CompId,
        recovery: RecommendedRecovery,
    ) -> Result<(), AegisError> {
        let rcsm = self.model.su(su).rcsm_state;
        debug!(
            "Error suspected on '{}' (SU '{}', rcsm {}, recovery {})",
            self.model.comp(comp).name,
            self.model.su_dn(su),
            rcsm,
            recovery
        );

        match rcsm {
            SuRcsmState::IdleLevel0 => {
                self.model.su_mut(su).rcsm_state = SuRcsmState::IdleLevel1;
                if self.comp_restarted_max_times(su, comp) {
                    self.model.su_mut(su).rcsm_state = SuRcsmState::IdleLevel2;
                    self.su_comp_error_suspected(su, comp, recovery)
                } else {
                    self.su_comp_restart_recovery(su, comp)
                }
            }
            SuRcsmState::IdleLevel1 => {
                if self.comp_restarted_max_times(su, comp) {
                    self.model.su_mut(su).rcsm_state = SuRcsmState::IdleLevel2;
                    let node = self.model.node_of_su(su)?;
                    self.node_comp_restart_req(node, comp)
                } else {
                    self.su_comp_restart_recovery(su, comp)
                }
            }
            SuRcsmState::IdleLevel2 => {
                let node = self.model.node_of_su(su)?;
                self.node_comp_restart_req(node, comp)
            }
            _ => {
                debug!(
                    "Deferring error report for '{}' while SU '{}' is restarting",
                    self.model.comp(comp).name,
                    self.model.su_dn(su)
                );
                self.model
                    .su_mut(su)
                    .deferred_events
                    .push(SuDeferredEvent::CompErrorSuspected { comp, recovery });
                Ok(())
            }
        }
    }

    // --- Reassignment after restart ---

    /// Re-asserts the requested HA state of every assignment the service
    /// unit holds, after its components came back up.
    fn su_reassign_sis(&mut self, su: SuId) -> Result<(), AegisError> {
        for sia in self.model.sias_of_su(su) {
            if let Some(a) = self.model.sia_mut(sia) {
                a.ha_state = None;
            }
            self.si_ha_state_assume(sia, AssumedCallback::SuHaStateAssumed)?;
        }
        Ok(())
    }

    /// One reassigned SI confirmed. When every CSI assignment of the unit is
    /// confirmed, the restart recovery is finished and the escalation level
    /// is restored from history.
    pub(crate) fn su_si_ha_state_assumed_cb(&mut self, sia: SiaId) -> Result<(), AegisError> {
        let su = match self.model.sia(sia) {
            Some(a) => a.su,
            None => return Ok(()),
        };

        let all_confirmed = self.model.comps_of_su(su).into_iter().all(|comp| {
            self.model.csias_of_comp(comp).into_iter().all(|csia| {
                self.model
                    .csia(csia)
                    .is_some_and(|c| c.ha_state == c.requested_ha_state)
            })
        });
        if !all_confirmed {
            return Ok(());
        }

        match self.model.su(su).rcsm_state {
            SuRcsmState::RestartCompSetting => {
                info!("Component restart recovery finished");
            }
            SuRcsmState::RestartSuSetting => {
                info!("SU restart recovery finished");
            }
            other => {
                return Err(AegisError::InvalidState(format!(
                    "assignment confirmed while SU '{}' rcsm is {}",
                    self.model.su_dn(su),
                    other
                )));
            }
        }
        let history = self.model.su(su).escalation_history_state;
        self.model.su_mut(su).rcsm_state = history;
        if !self.model.su(su).deferred_events.is_empty() {
            self.timers.add(
                std::time::Duration::ZERO,
                TimerKind::RecallDeferred(crate::core::events::Recallee::Su(su)),
            );
        }
        Ok(())
    }

    /// Drains one deferred service-unit event.
    pub(crate) fn su_recall_deferred(&mut self, su: SuId) -> Result<(), AegisError> {
        if let Some(event) = self.model.su_mut(su).deferred_events.pop() {
            match event {
                SuDeferredEvent::CompErrorSuspected { comp, recovery } => {
                    info!(
                        "Recalling deferred error report for '{}'",
                        self.model.comp(comp).name
                    );
                    self.su_comp_error_suspected(su, comp, recovery)?;
                }
            }
        }
        Ok(())
    }
}
