// src/core/actuator.rs

//! The component-lifecycle actuator boundary.
//!
//! The engine never spawns or signals processes itself; it submits lifecycle
//! work through `ComponentActuator` and observes completion as later events.
//! `ScriptActuator` is the production implementation backed by the
//! components' lifecycle commands; `RecordingActuator` captures calls for
//! tests and lets a harness feed back synthetic completions.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::core::events::AmfEvent;
use crate::core::model::entities::{ClcCommand, Component};
use crate::core::model::types::HaState;
use crate::core::model::{CompId, CsiaId};

/// Abstract executor for component lifecycle actions. Each call is
/// fire-and-forget; the engine arms the matching timeout before calling and
/// the result arrives as an event.
pub trait ComponentActuator: Send {
    /// Spawn the component's process.
    fn instantiate(&mut self, comp_id: CompId, comp: &Component, dn: &str);

    /// Gracefully stop the component.
    fn terminate(&mut self, comp_id: CompId, comp: &Component, dn: &str);

    /// Forcibly clean the component up; completion arrives as
    /// `CompCleanupCompleted` with the exit code.
    fn cleanup(&mut self, comp_id: CompId, comp: &Component, dn: &str);

    /// Request an HA-state transfer for one CSI assignment; the confirmation
    /// arrives as a `Response` carrying `invocation`.
    fn set_hastate(
        &mut self,
        comp_id: CompId,
        comp: &Component,
        dn: &str,
        csia: CsiaId,
        requested: HaState,
        invocation: u64,
    );
}

/// Repairs a node that exhausted its escalation budget. Swappable so tests
/// never reboot the build machine.
pub trait NodeRepairer: Send {
    fn repair(&mut self, node_name: &str);
}

/// Production repairer: reboots the host, or exits cleanly in debug builds.
pub struct SystemRepairer;

impl NodeRepairer for SystemRepairer {
    fn repair(&mut self, node_name: &str) {
        info!("Repairing node '{}' by reboot", node_name);
        if cfg!(debug_assertions) {
            std::process::exit(0);
        }
        match std::process::Command::new("reboot").status() {
            Ok(_) => {}
            Err(e) => error!("Failed to execute reboot for '{}': {}", node_name, e),
        }
    }
}

/// Production actuator: runs the component's lifecycle commands as detached
/// tokio tasks and reports completion through the reactor's event channel.
pub struct ScriptActuator {
    events: UnboundedSender<AmfEvent>,
}

impl ScriptActuator {
    pub fn new(events: UnboundedSender<AmfEvent>) -> Self {
        Self { events }
    }

    fn spawn_clc(&self, dn: &str, clc: &ClcCommand, completion: Option<(CompId, UnboundedSender<AmfEvent>)>) {
        if clc.cmd.is_empty() {
            debug!("No lifecycle command configured for '{}'", dn);
            if let Some((comp, events)) = completion {
                let _ = events.send(AmfEvent::CompCleanupCompleted(comp, 0));
            }
            return;
        }
        let cmd = clc.cmd.clone();
        let args = clc.args.clone();
        let dn = dn.to_string();
        tokio::spawn(async move {
            let status = tokio::process::Command::new(&cmd)
                .args(&args)
                .stdin(Stdio::null())
                .status()
                .await;
            match status {
                Ok(status) => {
                    debug!("Lifecycle command '{}' for '{}' exited with {}", cmd, dn, status);
                    if let Some((comp, events)) = completion {
                        let code = status.code().unwrap_or(-1);
                        let _ = events.send(AmfEvent::CompCleanupCompleted(comp, code));
                    }
                }
                Err(e) => {
                    error!("Failed to run lifecycle command '{}' for '{}': {}", cmd, dn, e);
                    if let Some((comp, events)) = completion {
                        let _ = events.send(AmfEvent::CompCleanupCompleted(comp, -1));
                    }
                }
            }
        });
    }
}

impl ComponentActuator for ScriptActuator {
    fn instantiate(&mut self, _comp_id: CompId, comp: &Component, dn: &str) {
        // Success is observed through component registration (sa-aware) or
        // the instantiate completion report; failure through the timeout.
        self.spawn_clc(dn, &comp.instantiate, None);
    }

    fn terminate(&mut self, _comp_id: CompId, comp: &Component, dn: &str) {
        self.spawn_clc(dn, &comp.terminate, None);
    }

    fn cleanup(&mut self, comp_id: CompId, comp: &Component, dn: &str) {
        self.spawn_clc(dn, &comp.cleanup, Some((comp_id, self.events.clone())));
    }

    fn set_hastate(
        &mut self,
        _comp_id: CompId,
        _comp: &Component,
        dn: &str,
        _csia: CsiaId,
        requested: HaState,
        invocation: u64,
    ) {
        // Delivered through the component's library session; the session
        // layer answers with a Response carrying the invocation id.
        debug!(
            "CSI set callback for '{}' requested state {} (invocation {})",
            dn, requested, invocation
        );
    }
}

/// One recorded actuator call.
#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCall {
    Instantiate {
        comp: CompId,
        dn: String,
    },
    Terminate {
        comp: CompId,
        dn: String,
    },
    Cleanup {
        comp: CompId,
        dn: String,
    },
    SetHaState {
        comp: CompId,
        dn: String,
        csia: CsiaId,
        requested: HaState,
        invocation: u64,
    },
}

/// Test actuator: records every call; a harness drains the record and feeds
/// back whatever completions the scenario calls for.
#[derive(Clone, Default)]
pub struct RecordingActuator {
    calls: Arc<Mutex<Vec<ActuatorCall>>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<ActuatorCall> {
        std::mem::take(&mut *self.calls.lock().expect("actuator call log poisoned"))
    }

    pub fn len(&self) -> usize {
        self.calls.lock().expect("actuator call log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, call: ActuatorCall) {
        self.calls
            .lock()
            .expect("actuator call log poisoned")
            .push(call);
    }
}

impl ComponentActuator for RecordingActuator {
    fn instantiate(&mut self, comp_id: CompId, _comp: &Component, dn: &str) {
        self.push(ActuatorCall::Instantiate {
            comp: comp_id,
            dn: dn.to_string(),
        });
    }

    fn terminate(&mut self, comp_id: CompId, _comp: &Component, dn: &str) {
        self.push(ActuatorCall::Terminate {
            comp: comp_id,
            dn: dn.to_string(),
        });
    }

    fn cleanup(&mut self, comp_id: CompId, _comp: &Component, dn: &str) {
        self.push(ActuatorCall::Cleanup {
            comp: comp_id,
            dn: dn.to_string(),
        });
    }

    fn set_hastate(
        &mut self,
        comp_id: CompId,
        _comp: &Component,
        dn: &str,
        csia: CsiaId,
        requested: HaState,
        invocation: u64,
    ) {
        self.push(ActuatorCall::SetHaState {
            comp: comp_id,
            dn: dn.to_string(),
            csia,
            requested,
            invocation,
        });
    }
}

/// Test repairer: records which nodes would have been rebooted.
#[derive(Clone, Default)]
pub struct RecordingRepairer {
    repaired: Arc<Mutex<Vec<String>>>,
}

impl RecordingRepairer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repaired(&self) -> Vec<String> {
        self.repaired.lock().expect("repair log poisoned").clone()
    }
}

impl NodeRepairer for RecordingRepairer {
    fn repair(&mut self, node_name: &str) {
        self.repaired
            .lock()
            .expect("repair log poisoned")
            .push(node_name.to_string());
    }
}
