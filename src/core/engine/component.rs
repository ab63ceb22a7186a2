// src/core/engine/component.rs

//! Component lifecycle: instantiation, termination, restart, HA-state
//! delivery, healthchecks and error reports.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::engine::{Engine, HealthcheckCallback, InvocationKind};
use crate::core::errors::AegisError;
use crate::core::model::types::{
    EntityState, HealthcheckInvocation, OperationalState, PresenceState, RecommendedRecovery,
};
use crate::core::model::{CompId, CsiaId};
use crate::core::timer::TimerKind;
use crate::core::transport::ClusterMessage;

impl Engine {
    /// Whether the hosting service unit of `comp` lives on this node.
    /// Lifecycle actions are only executed locally.
    pub(crate) fn comp_is_local(&self, comp: CompId) -> bool {
        let su = self.model.comp(comp).su;
        self.model.su_hosted_on(su, self.self_node)
    }

    /// Sets the presence state and reports the change to the owning service
    /// unit.
    pub(crate) fn comp_presence_set(
        &mut self,
        comp: CompId,
        state: PresenceState,
    ) -> Result<(), AegisError> {
        let old = self.model.comp(comp).presence_state;
        if old == state {
            return Ok(());
        }
        self.model.comp_mut(comp).presence_state = state;
        info!(
            "Setting component '{}' presence state: {}",
            self.model.comp_dn(comp),
            state
        );
        let su = self.model.comp(comp).su;
        self.su_comp_state_changed(su, comp, EntityState::Presence(state))
    }

    /// Sets the operational state and reports the change to the owning
    /// service unit.
    pub(crate) fn comp_op_state_set(
        &mut self,
        comp: CompId,
        state: OperationalState,
    ) -> Result<(), AegisError> {
        if self.model.comp(comp).op_state == state {
            return Ok(());
        }
        self.model.comp_mut(comp).op_state = state;
        info!(
            "Setting component '{}' operational state: {}",
            self.model.comp_dn(comp),
            state
        );
        let su = self.model.comp(comp).su;
        self.su_comp_state_changed(su, comp, EntityState::Operational(state))
    }

    /// Starts the component's process through the actuator and arms the
    /// instantiation timeout. Remote components are instantiated by their
    /// own node; the state change arrives through the cluster.
    pub(crate) fn comp_instantiate(&mut self, comp: CompId) -> Result<(), AegisError> {
        if !self.comp_is_local(comp) {
            debug!(
                "Skipping lifecycle action for remote component '{}'",
                self.model.comp_dn(comp)
            );
            return Ok(());
        }
        self.comp_presence_set(comp, PresenceState::Instantiating)?;
        let dn = self.model.comp_dn(comp);
        let timeout = Duration::from_millis(self.model.comp(comp).instantiate.timeout_ms);
        let handle = self.timers.add(timeout, TimerKind::CompInstantiate(comp));
        self.model.comp_mut(comp).instantiate_timer = Some(handle);
        let snapshot = self.model.comp(comp).clone();
        self.actuator.instantiate(comp, &snapshot, &dn);
        Ok(())
    }

    /// Instantiation completion report for components without a registration
    /// path (non-sa-aware lifecycle).
    pub(crate) fn comp_instantiate_event(&mut self, comp: CompId) -> Result<(), AegisError> {
        if let Some(handle) = self.model.comp_mut(comp).instantiate_timer.take() {
            self.timers.cancel(handle);
        }
        // Operational state first: the presence report may cascade all the
        // way into workload assignment, which reads readiness.
        self.comp_op_state_set(comp, OperationalState::Enabled)?;
        self.comp_presence_set(comp, PresenceState::Instantiated)
    }

    /// A library session registered for this component: instantiation has
    /// succeeded.
    pub(crate) fn comp_register(
        &mut self,
        comp_dn: &str,
        proxy_dn: Option<String>,
    ) -> Result<(), AegisError> {
        let comp = self.comp_by_dn(comp_dn)?;
        info!("Component '{}' registered", comp_dn);
        {
            let c = self.model.comp_mut(comp);
            c.registered = true;
            c.error_suspected = false;
            c.proxy_name = proxy_dn;
        }
        if let Some(handle) = self.model.comp_mut(comp).instantiate_timer.take() {
            self.timers.cancel(handle);
        }
        // Operational state first: the presence report may cascade all the
        // way into workload assignment, which reads readiness.
        self.comp_op_state_set(comp, OperationalState::Enabled)?;
        self.comp_presence_set(comp, PresenceState::Instantiated)
    }

    pub(crate) fn comp_unregister(&mut self, comp_dn: &str) -> Result<(), AegisError> {
        let comp = self.comp_by_dn(comp_dn)?;
        self.model.comp_mut(comp).registered = false;
        Ok(())
    }

    /// Abrupt termination: the component is suspect, clean it up without a
    /// graceful stop.
    pub(crate) fn comp_terminate(&mut self, comp: CompId) -> Result<(), AegisError> {
        self.model.comp_mut(comp).error_suspected = true;
        self.comp_presence_set(comp, PresenceState::Terminating)?;
        if !self.comp_is_local(comp) {
            return Ok(());
        }
        let dn = self.model.comp_dn(comp);
        let timeout = Duration::from_millis(self.model.comp(comp).cleanup.timeout_ms);
        let handle = self.timers.add(timeout, TimerKind::CompCleanup(comp));
        self.model.comp_mut(comp).cleanup_timer = Some(handle);
        let snapshot = self.model.comp(comp).clone();
        self.actuator.cleanup(comp, &snapshot, &dn);
        Ok(())
    }

    /// Restart recovery for one component: clean up, then instantiate again
    /// once the cleanup completes.
    pub(crate) fn comp_restart(&mut self, comp: CompId) -> Result<(), AegisError> {
        {
            let c = self.model.comp_mut(comp);
            c.restart_count += 1;
            c.registered = false;
        }
        // The restarted process re-asserts its CSI states from scratch.
        for csia in self.model.csias_of_comp(comp) {
            if let Some(c) = self.model.csia_mut(csia) {
                c.ha_state = None;
            }
        }
        self.comp_presence_set(comp, PresenceState::Restarting)?;
        if !self.comp_is_local(comp) {
            return Ok(());
        }
        let dn = self.model.comp_dn(comp);
        let timeout = Duration::from_millis(self.model.comp(comp).cleanup.timeout_ms);
        let handle = self.timers.add(timeout, TimerKind::CompCleanup(comp));
        self.model.comp_mut(comp).cleanup_timer = Some(handle);
        let snapshot = self.model.comp(comp).clone();
        self.actuator.cleanup(comp, &snapshot, &dn);
        Ok(())
    }

    /// Cleanup finished. For a restarting component this chains into a new
    /// instantiation; otherwise the component is down.
    pub(crate) fn comp_cleanup_completed(
        &mut self,
        comp: CompId,
        exit_code: i32,
    ) -> Result<(), AegisError> {
        if let Some(handle) = self.model.comp_mut(comp).cleanup_timer.take() {
            self.timers.cancel(handle);
        }
        if exit_code != 0 {
            warn!(
                "Cleanup of '{}' failed with exit code {}",
                self.model.comp_dn(comp),
                exit_code
            );
            return self.comp_presence_set(comp, PresenceState::TerminationFailed);
        }
        if self.model.comp(comp).presence_state == PresenceState::Restarting {
            // Skip the intermediate UNINSTANTIATED step of the restart cycle
            // and bring the process straight back up.
            let dn = self.model.comp_dn(comp);
            let timeout = Duration::from_millis(self.model.comp(comp).instantiate.timeout_ms);
            let handle = self.timers.add(timeout, TimerKind::CompInstantiate(comp));
            self.model.comp_mut(comp).instantiate_timer = Some(handle);
            let snapshot = self.model.comp(comp).clone();
            self.actuator.instantiate(comp, &snapshot, &dn);
            return Ok(());
        }
        self.comp_presence_set(comp, PresenceState::Uninstantiated)
    }

    pub(crate) fn comp_instantiate_tmo(&mut self, comp: CompId) -> Result<(), AegisError> {
        warn!("Instantiation of '{}' timed out", self.model.comp_dn(comp));
        self.model.comp_mut(comp).instantiate_timer = None;
        self.comp_presence_set(comp, PresenceState::InstantiationFailed)
    }

    pub(crate) fn comp_cleanup_tmo(&mut self, comp: CompId) -> Result<(), AegisError> {
        warn!("Cleanup of '{}' timed out", self.model.comp_dn(comp));
        self.model.comp_mut(comp).cleanup_timer = None;
        self.comp_presence_set(comp, PresenceState::TerminationFailed)
    }

    /// The hosting node left the cluster. Reset the component silently; the
    /// service-group failover decides what happens to the workload.
    pub(crate) fn comp_node_left(&mut self, comp: CompId) {
        let c = self.model.comp_mut(comp);
        c.registered = false;
        c.error_suspected = false;
        c.presence_state = PresenceState::Uninstantiated;
        c.op_state = OperationalState::Disabled;
        if let Some(handle) = c.instantiate_timer.take() {
            self.timers.cancel(handle);
        }
        if let Some(handle) = self.model.comp_mut(comp).cleanup_timer.take() {
            self.timers.cancel(handle);
        }
        for csia in self.model.csias_of_comp(comp) {
            if let Some(a) = self.model.csia_mut(csia) {
                a.ha_state = None;
            }
        }
    }

    /// Requests the component to assume the HA state of one CSI assignment.
    /// Returns whether the state was confirmed synchronously: suspect or
    /// unregistered components cannot answer, so their assignments are
    /// settled on the spot.
    pub(crate) fn comp_hastate_set(
        &mut self,
        comp: CompId,
        csia: CsiaId,
    ) -> Result<bool, AegisError> {
        let requested = self
            .model
            .csia(csia)
            .and_then(|c| c.requested_ha_state)
            .ok_or_else(|| AegisError::InvalidState("HA set without requested state".into()))?;
        let c = self.model.comp(comp);
        if c.error_suspected || !c.registered {
            if let Some(a) = self.model.csia_mut(csia) {
                a.ha_state = Some(requested);
            }
            return Ok(true);
        }
        let invocation = self.new_invocation(InvocationKind::CsiSet(csia));
        let dn = self.model.comp_dn(comp);
        let snapshot = self.model.comp(comp).clone();
        self.actuator
            .set_hastate(comp, &snapshot, &dn, csia, requested, invocation);
        Ok(false)
    }

    /// A component confirmed a CSI HA-state transfer.
    pub(crate) fn comp_confirm_hastate(&mut self, csia: CsiaId) -> Result<(), AegisError> {
        let Some(a) = self.model.csia_mut(csia) else {
            // Assignment deleted while the response was in flight.
            return Ok(());
        };
        a.ha_state = a.requested_ha_state;
        self.si_comp_set_hastate_done(csia)
    }

    /// An error report against this component (from itself, a peer, or a
    /// healthcheck). Escalates through the owning service unit.
    pub(crate) fn comp_error_report(
        &mut self,
        comp: CompId,
        recovery: RecommendedRecovery,
    ) -> Result<(), AegisError> {
        let recovery = if recovery == RecommendedRecovery::NoRecommendation {
            self.model.comp(comp).recommended_recovery
        } else {
            recovery
        };
        self.model.comp_mut(comp).error_suspected = true;
        let su = self.model.comp(comp).su;
        self.su_comp_error_suspected(su, comp, recovery)
    }

    /// A healthcheck missed its deadline; treated as an error report with the
    /// healthcheck's recommended recovery.
    pub(crate) fn comp_healthcheck_tmo(
        &mut self,
        comp: CompId,
        key: &str,
        recovery: RecommendedRecovery,
    ) -> Result<(), AegisError> {
        warn!(
            "Healthcheck '{}' timed out for '{}'",
            key,
            self.model.comp_dn(comp)
        );
        if let Some(hc) = self.model.find_healthcheck(comp, key) {
            let hc = &mut self.model.healthchecks[hc.index()];
            hc.active = false;
            if let Some(handle) = hc.period_timer.take() {
                self.timers.cancel(handle);
            }
            if let Some(handle) = hc.duration_timer.take() {
                self.timers.cancel(handle);
            }
        }
        self.comp_error_report(comp, recovery)
    }

    // --- Healthcheck scheduling (library-originated) ---

    pub(crate) fn comp_healthcheck_start(
        &mut self,
        comp: CompId,
        key: &str,
        invocation: HealthcheckInvocation,
        recovery: RecommendedRecovery,
    ) -> Result<(), AegisError> {
        let hc_id = self
            .model
            .find_healthcheck(comp, key)
            .ok_or_else(|| AegisError::HealthcheckNotConfigured(key.to_string()))?;
        let period = {
            let hc = &mut self.model.healthchecks[hc_id.index()];
            hc.active = true;
            hc.invocation = invocation;
            hc.recommended_recovery = recovery;
            hc.period_ms
        };
        let handle = self.timers.add(
            Duration::from_millis(period),
            TimerKind::HealthcheckPeriod(comp, key.to_string()),
        );
        self.model.healthchecks[hc_id.index()].period_timer = Some(handle);
        debug!("Healthcheck '{}' started for '{}'", key, self.model.comp_dn(comp));
        Ok(())
    }

    pub(crate) fn comp_healthcheck_stop(&mut self, comp: CompId, key: &str) -> Result<(), AegisError> {
        let hc_id = self
            .model
            .find_healthcheck(comp, key)
            .ok_or_else(|| AegisError::HealthcheckNotConfigured(key.to_string()))?;
        let hc = &mut self.model.healthchecks[hc_id.index()];
        hc.active = false;
        if let Some(handle) = hc.period_timer.take() {
            self.timers.cancel(handle);
        }
        if let Some(handle) = hc.duration_timer.take() {
            self.timers.cancel(handle);
        }
        debug!("Healthcheck '{}' stopped for '{}'", key, self.model.comp_dn(comp));
        Ok(())
    }

    /// One healthcheck period elapsed: issue the callback (framework-invoked)
    /// and start the answer deadline.
    pub(crate) fn healthcheck_period_expired(
        &mut self,
        comp: CompId,
        key: &str,
    ) -> Result<(), AegisError> {
        let Some(hc_id) = self.model.find_healthcheck(comp, key) else {
            return Ok(());
        };
        let (active, invocation_type, max_duration, period) = {
            let hc = &self.model.healthchecks[hc_id.index()];
            (hc.active, hc.invocation, hc.max_duration_ms, hc.period_ms)
        };
        if !active {
            return Ok(());
        }

        let duration_handle = self.timers.add(
            Duration::from_millis(max_duration),
            TimerKind::HealthcheckDuration(comp, key.to_string()),
        );
        let period_handle = self.timers.add(
            Duration::from_millis(period),
            TimerKind::HealthcheckPeriod(comp, key.to_string()),
        );
        {
            let hc = &mut self.model.healthchecks[hc_id.index()];
            hc.duration_timer = Some(duration_handle);
            hc.period_timer = Some(period_handle);
        }

        if invocation_type == HealthcheckInvocation::AmfInvoked {
            let invocation =
                self.new_invocation(InvocationKind::HealthcheckCallback(comp, key.to_string()));
            self.push_callback(HealthcheckCallback {
                comp,
                invocation,
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// The component answered (or self-confirmed) a healthcheck in time:
    /// cancel the deadline and keep the period running.
    pub(crate) fn comp_healthcheck_confirm(
        &mut self,
        comp: CompId,
        key: &str,
        healthy: bool,
    ) -> Result<(), AegisError> {
        let hc_id = self
            .model
            .find_healthcheck(comp, key)
            .ok_or_else(|| AegisError::HealthcheckNotConfigured(key.to_string()))?;
        let recovery = {
            let hc = &mut self.model.healthchecks[hc_id.index()];
            if let Some(handle) = hc.duration_timer.take() {
                self.timers.cancel(handle);
            }
            hc.recommended_recovery
        };
        if !healthy {
            let dn = self.model.comp_dn(comp);
            self.mcast(ClusterMessage::ComponentErrorReport {
                comp_dn: dn,
                recovery,
            });
        }
        Ok(())
    }

    /// The healthcheck deadline passed without an answer: broadcast the
    /// timeout so every node escalates identically.
    pub(crate) fn healthcheck_duration_expired(
        &mut self,
        comp: CompId,
        key: &str,
    ) -> Result<(), AegisError> {
        let Some(hc_id) = self.model.find_healthcheck(comp, key) else {
            return Ok(());
        };
        self.model.healthchecks[hc_id.index()].duration_timer = None;
        let recovery = self.model.healthchecks[hc_id.index()].recommended_recovery;
        let dn = self.model.comp_dn(comp);
        self.mcast(ClusterMessage::HealthcheckTmo {
            comp_dn: dn,
            key: key.to_string(),
            recovery,
        });
        Ok(())
    }
}
