// tests/common/mod.rs

//! Shared test harness: model fixtures and a deterministic reactor that
//! settles the engine by auto-answering actuator calls and delivering the
//! outbox in multicast order.

#![allow(dead_code)]

use aegis::core::actuator::{ActuatorCall, RecordingActuator, RecordingRepairer};
use aegis::core::client::ClientRequest;
use aegis::core::engine::Engine;
use aegis::core::model::types::HaState;
use aegis::core::model::{CompId, Model, NodeId};
use aegis::core::transport::ClusterMessage;

/// The engine under test plus its recorded side effects.
pub struct Harness {
    pub engine: Engine,
    pub actuator: RecordingActuator,
    pub repairer: RecordingRepairer,
    /// Components whose instantiation the harness should not auto-confirm.
    pub hold_registration: Vec<CompId>,
    /// CSI transfers the harness should not auto-confirm.
    pub hold_hastate: bool,
    /// Pending CSI-set invocations when `hold_hastate` is on.
    pub pending_hastate: Vec<u64>,
}

impl Harness {
    pub fn new(model: Model, self_node: NodeId) -> Self {
        let actuator = RecordingActuator::new();
        let repairer = RecordingRepairer::new();
        let engine = Engine::new(
            model,
            self_node,
            Box::new(actuator.clone()),
            Box::new(repairer.clone()),
        );
        Self {
            engine,
            actuator,
            repairer,
            hold_registration: Vec::new(),
            hold_hastate: false,
            pending_hastate: Vec::new(),
        }
    }

    /// Runs the engine until no actuator call, outbox message or due timer
    /// remains, simulating a healthy single-node world: instantiated
    /// components register, cleanups succeed, HA transfers are confirmed.
    pub fn settle(&mut self) {
        for _ in 0..256 {
            self.engine.run_until_idle().expect("engine dispatch failed");

            let outbox = self.engine.take_outbox();
            let _ = self.engine.take_callbacks();
            let calls = self.actuator.drain();
            if outbox.is_empty() && calls.is_empty() {
                // Stand in for the other nodes: components they would be
                // instantiating register here, keeping the shared model
                // converging like a real multicast round would.
                let remote = self.pending_remote_registrations();
                if remote.is_empty() {
                    return;
                }
                for dn in remote {
                    self.register(&dn);
                }
                continue;
            }

            for msg in outbox {
                // Loopback total order: encode/decode and deliver locally.
                let decoded = ClusterMessage::decode(&msg.encode()).expect("codec round-trip");
                self.engine
                    .handle_message(decoded)
                    .expect("message handling failed");
            }

            for call in calls {
                match call {
                    ActuatorCall::Instantiate { comp, dn } => {
                        if self.hold_registration.contains(&comp) {
                            continue;
                        }
                        self.register(&dn);
                    }
                    ActuatorCall::Cleanup { comp, .. } | ActuatorCall::Terminate { comp, .. } => {
                        self.engine
                            .dispatch(aegis::core::AmfEvent::CompCleanupCompleted(comp, 0))
                            .expect("cleanup completion failed");
                    }
                    ActuatorCall::SetHaState { invocation, .. } => {
                        if self.hold_hastate {
                            self.pending_hastate.push(invocation);
                            continue;
                        }
                        self.respond(invocation, true);
                    }
                }
            }
        }
        panic!("harness did not settle within 256 rounds");
    }

    /// Unregistered components of remote service units whose group is still
    /// instantiating.
    fn pending_remote_registrations(&self) -> Vec<String> {
        use aegis::core::model::types::{PresenceState, SgAcsmState};
        let model = &self.engine.model;
        let mut out = Vec::new();
        for sg in model.all_sgs() {
            if model.sg(sg).acsm_state != SgAcsmState::InstantiatingServiceUnits {
                continue;
            }
            for su in model.sus_of_sg(sg) {
                if model.su_hosted_on(su, self.engine.self_node) {
                    continue;
                }
                for comp in model.comps_of_su(su) {
                    if self.hold_registration.contains(&comp) {
                        continue;
                    }
                    if model.comp(comp).presence_state == PresenceState::Uninstantiated {
                        out.push(model.comp_dn(comp));
                    }
                }
            }
        }
        out
    }

    /// Registers a component by DN, as its library session would.
    pub fn register(&mut self, dn: &str) {
        self.engine
            .handle_client(ClientRequest::Register {
                comp_dn: dn.to_string(),
                proxy_dn: None,
            })
            .expect("register failed");
    }

    /// Answers one pending invocation.
    pub fn respond(&mut self, invocation: u64, ok: bool) {
        self.engine
            .handle_client(ClientRequest::Response { invocation, ok })
            .expect("response failed");
    }

    /// Releases invocations parked by `hold_hastate`.
    pub fn release_hastate(&mut self) {
        self.hold_hastate = false;
        for invocation in std::mem::take(&mut self.pending_hastate) {
            self.respond(invocation, true);
        }
    }

    /// Brings a cluster up from cold and settles it.
    pub fn start_cluster(&mut self) {
        let node = self.engine.self_node;
        self.engine
            .dispatch(aegis::core::AmfEvent::NodeSyncReady(node))
            .expect("sync ready failed");
        self.settle();
    }
}

// --- Model fixtures ---

/// One node, one application, one N+M group (1 active / 0 standby), one SU
/// with one component, one SI with one CSI.
pub fn single_node_model() -> Model {
    let mut model = Model::new("ExampleCluster");
    let n1 = model.new_node("N1").unwrap();
    let _ = n1;
    let app = model.new_application("A").unwrap();
    let sg = model.new_sg(app, "G").unwrap();
    {
        let s = model.sg_mut(sg);
        s.pref_active_sus = 1;
        s.pref_standby_sus = 0;
        s.comp_restart_max = 3;
    }
    let su = model.new_su(sg, "S").unwrap();
    model.su_mut(su).hosted_by_node = "N1".to_string();
    let comp = model.new_component(su, "C").unwrap();
    model.comp_mut(comp).cs_types = vec!["web".to_string()];
    let si = model.new_si(app, "I").unwrap();
    {
        let s = model.si_mut(si);
        s.protected_by_sg = "G".to_string();
        s.pref_standby_assignments = 0;
    }
    let csi = model.new_csi(si, "X").unwrap();
    model.csis[csi.index()].cs_type = "web".to_string();
    model
}

/// Two nodes, one 1+1 group with one SU per node, one SI with one CSI.
/// Walking the SUs in order puts the active assignment on N1.
pub fn two_node_model() -> Model {
    let mut model = Model::new("PairCluster");
    model.new_node("N1").unwrap();
    model.new_node("N2").unwrap();
    let app = model.new_application("A").unwrap();
    let sg = model.new_sg(app, "G").unwrap();
    {
        let s = model.sg_mut(sg);
        s.pref_active_sus = 1;
        s.pref_standby_sus = 1;
        s.comp_restart_max = 3;
    }
    for (su_name, comp_name, node_name) in [("S1", "C1", "N1"), ("S2", "C2", "N2")] {
        let su = model.new_su(sg, su_name).unwrap();
        model.su_mut(su).hosted_by_node = node_name.to_string();
        let comp = model.new_component(su, comp_name).unwrap();
        model.comp_mut(comp).cs_types = vec!["web".to_string()];
    }
    let si = model.new_si(app, "I").unwrap();
    model.si_mut(si).protected_by_sg = "G".to_string();
    let csi = model.new_csi(si, "X").unwrap();
    model.csis[csi.index()].cs_type = "web".to_string();
    model
}

/// The confirmed HA states of every assignment of `si`, as (SU name, state).
pub fn assignment_states(model: &Model, si_name: &str) -> Vec<(String, Option<HaState>)> {
    let app = model.find_application("A").unwrap();
    let si = model.find_si(app, si_name).unwrap();
    let mut out: Vec<(String, Option<HaState>)> = model
        .sias_of_si(si)
        .into_iter()
        .filter_map(|id| model.sia(id))
        .map(|a| (model.su(a.su).name.clone(), a.ha_state))
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}
