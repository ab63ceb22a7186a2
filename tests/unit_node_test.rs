// tests/unit_node_test.rs

mod common;

use aegis::core::AmfEvent;
use aegis::core::model::types::{
    HaState, NodeAcsmState, OperationalState, PresenceState, SgAcsmState,
};
use aegis::core::model::NodeId;

use common::Harness;

#[test]
fn test_node_leave_fails_over_to_standby() {
    let mut h = Harness::new(common::two_node_model(), NodeId(1));
    h.start_cluster();

    let model = &h.engine.model;
    let n1 = model.find_node("N1").unwrap();
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let s1 = model.find_su(sg, "S1").unwrap();
    let c1 = model.find_component(s1, "C1").unwrap();

    h.engine.dispatch(AmfEvent::NodeLeave(n1)).unwrap();
    h.settle();

    let model = &h.engine.model;
    // The departed node is out of service and waits to join again.
    assert_eq!(model.node(n1).op_state, OperationalState::Disabled);
    assert_eq!(model.node(n1).node_id, 0);
    assert_eq!(
        model.node(n1).acsm_state,
        NodeAcsmState::LeavingSpontaneouslyWaitingForNodeToJoin
    );
    // Its components were told the node is gone, without lifecycle scripts.
    assert_eq!(model.comp(c1).presence_state, PresenceState::Uninstantiated);
    assert!(!model.comp(c1).registered);
    // The standby on the surviving node took the workload over.
    assert_eq!(
        common::assignment_states(model, "I"),
        vec![("S2".to_string(), Some(HaState::Active))]
    );
    assert_eq!(model.sg(sg).acsm_state, SgAcsmState::Idle);
}

#[test]
fn test_node_rejoin_after_leave_restarts_applications() {
    let mut h = Harness::new(common::two_node_model(), NodeId(1));
    h.start_cluster();
    let n1 = h.engine.model.find_node("N1").unwrap();
    h.engine.dispatch(AmfEvent::NodeLeave(n1)).unwrap();
    h.settle();

    h.engine.dispatch(AmfEvent::NodeSyncReady(n1)).unwrap();
    h.settle();

    let model = &h.engine.model;
    assert_eq!(model.node(n1).op_state, OperationalState::Enabled);
    // Join completed: back to the idle escalation level via history.
    assert_eq!(model.node(n1).acsm_state, NodeAcsmState::IdleLevel0);
    // The rejoined unit is instantiated again and picked up the standby
    // side of the workload.
    let states = common::assignment_states(model, "I");
    assert!(states.contains(&("S2".to_string(), Some(HaState::Active))));
    assert!(states.contains(&("S1".to_string(), Some(HaState::Standby))));
}

#[test]
fn test_escalation_exhaustion_reboots_the_node() {
    let mut h = Harness::new(common::single_node_model(), NodeId(0));
    h.start_cluster();

    let model = &mut h.engine.model;
    let n1 = model.find_node("N1").unwrap();
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let su = model.find_su(sg, "S").unwrap();
    let comp = model.find_component(su, "C").unwrap();

    // The unit has exhausted its failover budget at escalation level 3.
    model.node_mut(n1).acsm_state = NodeAcsmState::IdleLevel3;
    model.node_mut(n1).su_failover_max = 1;
    model.su_mut(su).failover_count = 1;

    h.engine
        .dispatch(AmfEvent::NodeCompRestartReq(n1, comp))
        .unwrap();
    h.settle();

    let model = &h.engine.model;
    assert_eq!(
        model.node(n1).acsm_state,
        NodeAcsmState::FailingGracefullyRebootingNode
    );
    // This is the local node, so the repairer was invoked for it.
    assert_eq!(h.repairer.repaired(), vec!["N1".to_string()]);

    // The ordered reboot shows up as a node leave, which completes the
    // repair cycle.
    h.engine.dispatch(AmfEvent::NodeLeave(n1)).unwrap();
    let model = &h.engine.model;
    assert_eq!(model.node(n1).op_state, OperationalState::Enabled);
    assert_eq!(model.node(n1).acsm_state, NodeAcsmState::IdleLevel0);
}

#[test]
fn test_comp_failover_req_respects_su_flag() {
    let mut h = Harness::new(common::two_node_model(), NodeId(0));
    h.start_cluster();

    let model = &mut h.engine.model;
    let n1 = model.find_node("N1").unwrap();
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let s1 = model.find_su(sg, "S1").unwrap();
    let c1 = model.find_component(s1, "C1").unwrap();
    model.su_mut(s1).failover = false;

    h.engine
        .dispatch(AmfEvent::NodeCompFailoverReq(n1, c1))
        .unwrap();
    h.settle();

    // No recovery was started.
    let model = &h.engine.model;
    assert_eq!(model.sg(sg).acsm_state, SgAcsmState::Idle);
    assert_eq!(model.su(s1).failover_count, 0);
    assert_eq!(
        common::assignment_states(model, "I"),
        vec![
            ("S1".to_string(), Some(HaState::Active)),
            ("S2".to_string(), Some(HaState::Standby)),
        ]
    );
}

#[test]
fn test_comp_failover_req_triggers_su_failover() {
    let mut h = Harness::new(common::two_node_model(), NodeId(0));
    h.start_cluster();

    let model = &h.engine.model;
    let n1 = model.find_node("N1").unwrap();
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let s1 = model.find_su(sg, "S1").unwrap();
    let c1 = model.find_component(s1, "C1").unwrap();

    h.engine
        .dispatch(AmfEvent::NodeCompFailoverReq(n1, c1))
        .unwrap();
    h.settle();

    let model = &h.engine.model;
    assert_eq!(model.su(s1).failover_count, 1);
    let states = common::assignment_states(model, "I");
    assert!(states.contains(&("S2".to_string(), Some(HaState::Active))));
}
