// tests/integration_test.rs

//! End-to-end scenarios: cluster bring-up, restart escalation, failover,
//! node departure, cross-node model sync and deferred-event replay.

mod common;

use aegis::core::AmfEvent;
use aegis::core::actuator::ActuatorCall;
use aegis::core::model::types::{
    AppAcsmState, AssignmentState, ClusterAcsmState, HaState, NodeAcsmState, PresenceState,
    RecommendedRecovery, SgAcsmState, SuRcsmState,
};
use aegis::core::model::NodeId;
use aegis::core::sync::{snapshot, SyncReceiver};

use common::Harness;

/// Single-node startup: one node, one application, one 1+0 group, one SU
/// with one component, one SI with one CSI.
#[test]
fn test_single_node_startup() {
    let mut h = Harness::new(common::single_node_model(), NodeId(0));
    h.engine
        .dispatch(AmfEvent::NodeSyncReady(NodeId(0)))
        .unwrap();
    h.settle();

    let model = &h.engine.model;
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let su = model.find_su(sg, "S").unwrap();
    let si = model.find_si(app, "I").unwrap();

    assert_eq!(model.cluster.acsm_state, ClusterAcsmState::Started);
    assert_eq!(model.app(app).acsm_state, AppAcsmState::WorkloadAssigned);
    assert_eq!(model.sg(sg).acsm_state, SgAcsmState::Idle);
    assert_eq!(model.su(su).presence_state, PresenceState::Instantiated);

    let sia = model.sia_of_si_su(si, su).unwrap();
    assert_eq!(model.sia(sia).unwrap().ha_state, Some(HaState::Active));
}

/// Component restart within the threshold: the component is cleaned up and
/// re-instantiated exactly once, its workload re-asserted, and the unit ends
/// at escalation level 1.
#[test]
fn test_component_restart_within_threshold() {
    let mut h = Harness::new(common::single_node_model(), NodeId(0));
    h.start_cluster();

    let model = &mut h.engine.model;
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let su = model.find_su(sg, "S").unwrap();
    let comp = model.find_component(su, "C").unwrap();
    model.comp_mut(comp).restart_count = 1;

    h.engine
        .dispatch(AmfEvent::SuCompErrorSuspected(
            su,
            comp,
            RecommendedRecovery::ComponentRestart,
        ))
        .unwrap();

    // Exactly one restart cycle.
    let calls = h.actuator.drain();
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0], ActuatorCall::Cleanup { .. }));
    h.engine
        .dispatch(AmfEvent::CompCleanupCompleted(comp, 0))
        .unwrap();
    let calls = h.actuator.drain();
    assert_eq!(calls.len(), 1);
    let dn = match &calls[0] {
        ActuatorCall::Instantiate { dn, .. } => dn.clone(),
        other => panic!("unexpected call {other:?}"),
    };
    h.register(&dn);
    h.settle();

    let model = &h.engine.model;
    let si = model.find_si(app, "I").unwrap();
    assert_eq!(model.su(su).rcsm_state, SuRcsmState::IdleLevel1);
    assert_eq!(model.comp(comp).restart_count, 2);
    assert_eq!(model.si_curr_active_count(si), 1);
}

/// Component restart over the threshold escalates through the node into an
/// SU failover; the standby on the other node takes the workload.
#[test]
fn test_restart_over_threshold_escalates_to_failover() {
    let mut model = common::two_node_model();
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    // No SU restart budget: the node escalates straight to SU failover.
    model.sg_mut(sg).su_restart_max = 0;

    let mut h = Harness::new(model, NodeId(0));
    h.start_cluster();

    let model = &mut h.engine.model;
    let s1 = model.find_su(sg, "S1").unwrap();
    let c1 = model.find_component(s1, "C1").unwrap();
    model.comp_mut(c1).restart_count = 3;

    h.engine
        .dispatch(AmfEvent::SuCompErrorSuspected(
            s1,
            c1,
            RecommendedRecovery::ComponentRestart,
        ))
        .unwrap();
    h.settle();

    let model = &h.engine.model;
    let n1 = model.find_node("N1").unwrap();
    assert_eq!(model.node(n1).acsm_state, NodeAcsmState::IdleLevel3);
    let states = common::assignment_states(model, "I");
    assert!(states.contains(&("S2".to_string(), Some(HaState::Active))));
    assert_eq!(model.sg(sg).acsm_state, SgAcsmState::Idle);
    assert!(model.sg(sg).recovery_scope.is_empty());
}

/// A node leaves spontaneously: its components are reset without lifecycle
/// actions, the standby on the survivor is activated, and the departed node
/// waits to join again.
#[test]
fn test_node_leaves_spontaneously() {
    let mut h = Harness::new(common::two_node_model(), NodeId(1));
    h.start_cluster();

    let model = &h.engine.model;
    let n1 = model.find_node("N1").unwrap();
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let s2 = model.find_su(sg, "S2").unwrap();
    let c2 = model.find_component(s2, "C2").unwrap();

    h.engine.dispatch(AmfEvent::NodeLeave(n1)).unwrap();
    h.settle();

    let model = &h.engine.model;
    assert_eq!(
        model.node(n1).acsm_state,
        NodeAcsmState::LeavingSpontaneouslyWaitingForNodeToJoin
    );
    assert_eq!(
        common::assignment_states(model, "I"),
        vec![("S2".to_string(), Some(HaState::Active))]
    );
    // The survivor's component is untouched.
    assert_eq!(model.comp(c2).su, s2);
    assert_eq!(model.comp(c2).presence_state, PresenceState::Instantiated);
    assert!(model.comp(c2).registered);
}

/// Cross-node model sync: the survivor's post-failover model is chunked,
/// streamed, and rebuilt into a semantically equal model.
#[test]
fn test_cross_node_model_sync() {
    let mut h = Harness::new(common::two_node_model(), NodeId(1));
    h.start_cluster();
    let n1 = h.engine.model.find_node("N1").unwrap();
    h.engine.dispatch(AmfEvent::NodeLeave(n1)).unwrap();
    h.settle();

    let chunks = snapshot(&h.engine.model);
    let mut receiver = SyncReceiver::new();
    for chunk in &chunks {
        receiver.apply(chunk).unwrap();
    }
    let rebuilt = receiver.finish().unwrap();

    // The rebuilt model matches the source: same entities, same states,
    // same assignments.
    assert_eq!(rebuilt.cluster.acsm_state, ClusterAcsmState::Started);
    assert_eq!(rebuilt.nodes.len(), 2);
    let r_n1 = rebuilt.find_node("N1").unwrap();
    assert_eq!(
        rebuilt.node(r_n1).acsm_state,
        NodeAcsmState::LeavingSpontaneouslyWaitingForNodeToJoin
    );
    for app in rebuilt.apps() {
        assert_eq!(rebuilt.app(app).acsm_state, AppAcsmState::WorkloadAssigned);
    }
    assert_eq!(
        common::assignment_states(&rebuilt, "I"),
        common::assignment_states(&h.engine.model, "I")
    );
    let r_app = rebuilt.find_application("A").unwrap();
    let r_si = rebuilt.find_si(r_app, "I").unwrap();
    assert_eq!(
        rebuilt.si_assignment_state(r_si),
        AssignmentState::PartiallyAssigned
    );

    // A second pass over the rebuilt model is identical chunk for chunk.
    assert_eq!(snapshot(&rebuilt), chunks);
}

/// Deferred event: a start request arriving while the application assigns
/// workload is parked and replayed with an identical payload afterwards.
#[test]
fn test_deferred_event_replay() {
    let mut h = Harness::new(common::two_node_model(), NodeId(0));
    h.hold_hastate = true;
    h.start_cluster();

    let app = h.engine.model.find_application("A").unwrap();
    let n2 = h.engine.model.find_node("N2").unwrap();
    assert_eq!(
        h.engine.model.app(app).acsm_state,
        AppAcsmState::AssigningWorkload
    );

    h.engine
        .dispatch(AmfEvent::AppStart(app, Some(n2)))
        .unwrap();
    assert_eq!(h.engine.model.app(app).deferred_events.len(), 1);

    h.release_hastate();
    h.settle();

    let model = &h.engine.model;
    assert_eq!(model.app(app).deferred_events.len(), 0);
    assert_eq!(model.app(app).acsm_state, AppAcsmState::StartingSgs);
    assert_eq!(model.app(app).node_to_start, Some(n2));
}
