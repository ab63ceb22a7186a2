// src/core/engine/si.rs

//! The SI/CSI assignment layer: HA-state transfer between service instances
//! and the components carrying their CSIs.

use std::time::Duration;

use tracing::{debug, info};

use crate::core::engine::Engine;
use crate::core::errors::AegisError;
use crate::core::model::types::{AssumedCallback, HaState};
use crate::core::model::{CsiaId, SiId, SiaId, SuId};
use crate::core::timer::TimerKind;

impl Engine {
    /// Requests every CSI assignment under `si` to go ACTIVE. The callback
    /// fires once the SI's aggregate HA state actually becomes ACTIVE.
    pub fn si_activate(&mut self, si: SiId, cb: AssumedCallback) -> Result<(), AegisError> {
        debug!("Activating '{}'", self.model.si_dn(si));
        for sia in self.model.sias_of_si(si) {
            if let Some(a) = self.model.sia_mut(sia) {
                a.requested_ha_state = Some(HaState::Active);
            }
            self.si_ha_state_assume(sia, cb)?;
        }
        Ok(())
    }

    /// For the one service unit of `sia`, updates every CSI assignment whose
    /// confirmed HA state differs from the requested one and asks the owning
    /// component to assume it. If nothing needed updating, the confirmation
    /// is delivered on the next reactor tick, so callers always observe a
    /// deferred callback.
    pub fn si_ha_state_assume(
        &mut self,
        sia: SiaId,
        cb: AssumedCallback,
    ) -> Result<(), AegisError> {
        let (si, su, requested) = {
            let a = self
                .model
                .sia(sia)
                .ok_or_else(|| AegisError::NotFound("SI assignment".into()))?;
            (a.si, a.su, a.requested_ha_state)
        };
        let requested =
            requested.ok_or_else(|| AegisError::InvalidState("assume without requested state".into()))?;

        debug!(
            "SI '{}' assuming {} on SU '{}'",
            self.model.si_dn(si),
            requested,
            self.model.su_dn(su)
        );

        if let Some(a) = self.model.sia_mut(sia) {
            a.pending_callback = Some(cb);
        }

        let mut updated = 0usize;
        let mut confirmed_now = 0usize;
        for csi in self.model.csis_of_si(si) {
            for csia in self.model.csias_of_csi(csi) {
                let (comp, current) = {
                    let c = self.model.csia(csia).expect("enumerated assignment exists");
                    (c.comp, c.ha_state)
                };
                if self.model.comp(comp).su != su || current == Some(requested) {
                    continue;
                }
                updated += 1;
                if let Some(c) = self.model.csia_mut(csia) {
                    c.requested_ha_state = Some(requested);
                }
                if self.comp_hastate_set(comp, csia)? {
                    confirmed_now += 1;
                }
            }
        }

        // Every involved component confirmed synchronously (or none needed a
        // change): simulate the asynchronous response with a zero-delay timer.
        if updated == confirmed_now {
            self.timers
                .add(Duration::ZERO, TimerKind::HaStateAssumed(sia));
        }
        Ok(())
    }

    /// Zero-delay continuation of `si_ha_state_assume` for the synchronous
    /// case: the confirmed state becomes the requested one and the pending
    /// callback fires.
    pub(crate) fn si_ha_state_assumed_tick(&mut self, sia: SiaId) -> Result<(), AegisError> {
        let Some(a) = self.model.sia_mut(sia) else {
            // The assignment was deleted before the tick ran.
            return Ok(());
        };
        a.ha_state = a.requested_ha_state;
        let cb = a.pending_callback.take();
        if let Some(cb) = cb {
            self.run_assumed_callback(sia, cb)?;
        }
        Ok(())
    }

    /// Called when a component confirms a CSI HA-state change. Recomputes the
    /// SI aggregate and, if the requested state is reached, fires the pending
    /// callback exactly once.
    pub fn si_comp_set_hastate_done(&mut self, csia: CsiaId) -> Result<(), AegisError> {
        let sia = {
            let c = self
                .model
                .csia(csia)
                .ok_or_else(|| AegisError::NotFound("CSI assignment".into()))?;
            c.si_assignment
        };

        self.set_si_ha_state(csia)?;

        let (reached, cb) = {
            let a = self
                .model
                .sia_mut(sia)
                .ok_or_else(|| AegisError::NotFound("SI assignment".into()))?;
            let reached = a.requested_ha_state.is_some() && a.ha_state == a.requested_ha_state;
            let cb = if reached { a.pending_callback.take() } else { None };
            (reached, cb)
        };

        if reached
            && let Some(cb) = cb
        {
            self.run_assumed_callback(sia, cb)?;
        }
        Ok(())
    }

    /// SI HA-state aggregation, first match wins:
    /// any QUIESCED → QUIESCED; any QUIESCING → QUIESCING;
    /// all STANDBY → STANDBY; all ACTIVE → ACTIVE; otherwise unchanged.
    fn set_si_ha_state(&mut self, csia: CsiaId) -> Result<(), AegisError> {
        let (sia, su) = {
            let c = self.model.csia(csia).expect("caller verified assignment");
            let su = self.model.comp(c.comp).su;
            (c.si_assignment, su)
        };
        let (si, old_ha) = {
            let a = self
                .model
                .sia(sia)
                .ok_or_else(|| AegisError::NotFound("SI assignment".into()))?;
            (a.si, a.ha_state)
        };
        let old_assignment_state = self.model.si_assignment_state(si);

        let new_ha = if self.any_csi_in_su_has(su, HaState::Quiesced) {
            Some(HaState::Quiesced)
        } else if self.any_csi_in_su_has(su, HaState::Quiescing) {
            Some(HaState::Quiescing)
        } else if self.all_csias_of_sia_have(sia, HaState::Standby) {
            Some(HaState::Standby)
        } else if self.all_csias_of_sia_have(sia, HaState::Active) {
            Some(HaState::Active)
        } else {
            old_ha
        };

        if let Some(a) = self.model.sia_mut(sia) {
            a.ha_state = new_ha;
        }

        if old_ha != new_ha
            && let Some(state) = new_ha
        {
            info!(
                "SU HA state changed to '{}' for SI '{}', SU '{}'",
                state,
                self.model.si_dn(si),
                self.model.su_dn(su)
            );
        }

        let new_assignment_state = self.model.si_assignment_state(si);
        if old_assignment_state != new_assignment_state {
            info!(
                "SI assignment state changed to '{}' for '{}'",
                new_assignment_state,
                self.model.si_dn(si)
            );
        }
        Ok(())
    }

    fn any_csi_in_su_has(&self, su: SuId, state: HaState) -> bool {
        self.model.comps_of_su(su).into_iter().any(|comp| {
            self.model
                .csias_of_comp(comp)
                .into_iter()
                .any(|csia| self.model.csia(csia).is_some_and(|c| c.ha_state == Some(state)))
        })
    }

    fn all_csias_of_sia_have(&self, sia: SiaId, state: HaState) -> bool {
        self.model
            .csias_of_sia(sia)
            .into_iter()
            .all(|csia| self.model.csia(csia).is_some_and(|c| c.ha_state == Some(state)))
    }

    /// Dispatches a fired completion continuation to its owner.
    fn run_assumed_callback(
        &mut self,
        sia: SiaId,
        cb: AssumedCallback,
    ) -> Result<(), AegisError> {
        match cb {
            AssumedCallback::SgAssignOnRequest => self.sg_assign_si_assumed_cb(sia),
            AssumedCallback::SgStandbyActivated => self.sg_standby_su_activated_cb(sia),
            AssumedCallback::SgDependentDeactivated => self.sg_dependent_si_deactivated_cb(sia),
            AssumedCallback::SuHaStateAssumed => self.su_si_ha_state_assumed_cb(sia),
        }
    }
}
