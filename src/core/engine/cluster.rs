// src/core/engine/cluster.rs

//! The cluster state machine: initial bring-up of all applications and the
//! startup timeout that forces workload assignment when some units never
//! come up.

use std::time::Duration;

use tracing::{info, warn};

use crate::core::engine::Engine;
use crate::core::errors::AegisError;
use crate::core::model::types::{AppAcsmState, ClusterAcsmState, PresenceState};
use crate::core::model::AppId;
use crate::core::timer::TimerKind;

impl Engine {
    fn all_sus_instantiated(&self) -> bool {
        (0..self.model.sus.len()).all(|i| {
            self.model.sus[i].presence_state == PresenceState::Instantiated
        })
    }

    fn all_apps_assigned(&self) -> bool {
        self.model
            .apps()
            .into_iter()
            .all(|app| self.model.app(app).acsm_state == AppAcsmState::WorkloadAssigned)
    }

    /// The cluster formed and the model is synchronized: start every
    /// application and arm the startup timeout.
    pub(crate) fn cluster_sync_ready(&mut self) -> Result<(), AegisError> {
        match self.model.cluster.acsm_state {
            ClusterAcsmState::Uninstantiated => {
                info!("Cluster: starting applications.");
                self.model.cluster.acsm_state = ClusterAcsmState::StartingComponents;
                for app in self.model.apps() {
                    self.app_start(app, None)?;
                }
                let timeout = Duration::from_millis(self.model.cluster.startup_timeout_ms);
                let handle = self.timers.add(timeout, TimerKind::ClusterStartup);
                self.model.cluster.startup_timer = Some(handle);
                Ok(())
            }
            ClusterAcsmState::StartingComponents => Ok(()),
            other => Err(AegisError::InvalidState(format!(
                "cluster sync ready in state {}",
                other
            ))),
        }
    }

    /// Assigns workload through every application, cancelling the startup
    /// timer if it is still pending.
    pub(crate) fn cluster_assign_workload(&mut self) -> Result<(), AegisError> {
        self.model.cluster.acsm_state = ClusterAcsmState::StartingWorkload;
        if let Some(handle) = self.model.cluster.startup_timer.take() {
            self.timers.cancel(handle);
        }
        for app in self.model.apps() {
            self.app_assign_workload(app, None)?;
        }
        Ok(())
    }

    /// An application reported that all its service units started.
    pub(crate) fn cluster_application_started(&mut self, app: AppId) -> Result<(), AegisError> {
        info!(
            "Cluster: application '{}' started",
            self.model.app(app).name
        );
        if self.all_sus_instantiated() {
            info!("Cluster: all applications started, assigning workload.");
            self.cluster_assign_workload()?;
        }
        Ok(())
    }

    /// An application reported its workload fully assigned.
    pub(crate) fn cluster_application_workload_assigned(
        &mut self,
        app: AppId,
    ) -> Result<(), AegisError> {
        info!(
            "Cluster: application '{}' assigned.",
            self.model.app(app).name
        );
        if self.all_apps_assigned() {
            self.model.cluster.acsm_state = ClusterAcsmState::Started;
            info!("Cluster: started");
        }
        Ok(())
    }

    /// The startup window closed before every unit came up: assign whatever
    /// workload is placeable.
    pub(crate) fn cluster_startup_tmo(&mut self) -> Result<(), AegisError> {
        match self.model.cluster.acsm_state {
            ClusterAcsmState::StartingComponents => {
                warn!("Cluster startup timed out; assigning available workload");
                self.cluster_assign_workload()
            }
            _ => Ok(()),
        }
    }
}
