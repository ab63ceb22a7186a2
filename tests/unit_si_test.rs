// tests/unit_si_test.rs

mod common;

use aegis::core::model::types::{
    AppAcsmState, AssignmentState, AssumedCallback, HaState, SgAcsmState,
};

use common::Harness;

/// The SU carries two components of the same CS type, so one SI assignment
/// fans out into two CSI assignments that must both confirm.
fn dual_comp_model() -> aegis::core::model::Model {
    let mut model = common::single_node_model();
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let su = model.find_su(sg, "S").unwrap();
    let c2 = model.new_component(su, "C2").unwrap();
    model.comp_mut(c2).cs_types = vec!["web".to_string()];
    model
}

#[test]
fn test_si_aggregate_waits_for_all_csi_confirmations() {
    let mut h = Harness::new(dual_comp_model(), aegis::core::model::NodeId(0));
    h.hold_hastate = true;
    h.start_cluster();

    // Both CSI transfers are outstanding; nothing is confirmed yet.
    assert_eq!(h.pending_hastate.len(), 2);
    let model = &h.engine.model;
    let app = model.find_application("A").unwrap();
    let si = model.find_si(app, "I").unwrap();
    assert_eq!(model.si_curr_active_count(si), 0);
    assert_eq!(model.si_assignment_state(si), AssignmentState::Unassigned);

    // First confirmation: the aggregate must not move yet.
    let first = h.pending_hastate.remove(0);
    h.respond(first, true);
    h.settle();
    assert_eq!(h.engine.model.si_curr_active_count(si), 0);

    // Second confirmation completes the SI.
    let second = h.pending_hastate.remove(0);
    h.respond(second, true);
    h.settle();
    let model = &h.engine.model;
    assert_eq!(model.si_curr_active_count(si), 1);
    assert_eq!(model.si_assignment_state(si), AssignmentState::FullyAssigned);
    assert_eq!(model.cluster.acsm_state, aegis::core::model::types::ClusterAcsmState::Started);
}

#[test]
fn test_no_op_assume_still_defers_the_callback() {
    let mut h = Harness::new(common::single_node_model(), aegis::core::model::NodeId(0));
    h.start_cluster();

    let model = &mut h.engine.model;
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let si = model.find_si(app, "I").unwrap();
    let sia = model.sias_of_si(si)[0];

    // Re-enter the assignment path with nothing to change: every CSI already
    // matches the requested state.
    model.app_mut(app).acsm_state = AppAcsmState::AssigningWorkload;
    model.sg_mut(sg).acsm_state = SgAcsmState::AssigningOnRequest;
    h.engine
        .si_ha_state_assume(sia, AssumedCallback::SgAssignOnRequest)
        .unwrap();

    // The completion is not synchronous, even though no component round-trip
    // was needed.
    assert_eq!(
        h.engine.model.sg(sg).acsm_state,
        SgAcsmState::AssigningOnRequest
    );

    // It arrives on the next reactor tick.
    h.engine.run_until_idle().unwrap();
    assert_eq!(h.engine.model.sg(sg).acsm_state, SgAcsmState::Idle);
    assert_eq!(
        h.engine.model.app(app).acsm_state,
        AppAcsmState::WorkloadAssigned
    );
}

#[test]
fn test_si_activate_reasserts_active() {
    let mut h = Harness::new(common::single_node_model(), aegis::core::model::NodeId(0));
    h.start_cluster();

    let model = &mut h.engine.model;
    let app = model.find_application("A").unwrap();
    let si = model.find_si(app, "I").unwrap();
    let sia = model.sias_of_si(si)[0];

    // Knock the confirmed states back, as a restart would.
    if let Some(a) = model.sia_mut(sia) {
        a.ha_state = None;
    }
    let su = model.sia(sia).unwrap().su;
    let sg = model.su(su).sg;
    for comp in model.comps_of_su(su) {
        for csia in model.csias_of_comp(comp) {
            if let Some(c) = model.csia_mut(csia) {
                c.ha_state = None;
            }
        }
    }
    model.sg_mut(sg).acsm_state = SgAcsmState::AssigningStandBy;

    h.engine
        .si_activate(si, AssumedCallback::SgAssignOnRequest)
        .unwrap();
    h.settle();

    let model = &h.engine.model;
    assert_eq!(model.si_curr_active_count(si), 1);
    assert_eq!(model.sg(sg).acsm_state, SgAcsmState::Idle);
}

#[test]
fn test_failed_transfer_leaves_assignment_unconfirmed() {
    let mut h = Harness::new(common::single_node_model(), aegis::core::model::NodeId(0));
    h.hold_hastate = true;
    h.start_cluster();

    let invocation = h.pending_hastate.remove(0);
    h.respond(invocation, false);
    h.settle();

    let model = &h.engine.model;
    let app = model.find_application("A").unwrap();
    let si = model.find_si(app, "I").unwrap();
    let sia = model.sias_of_si(si)[0];
    let a = model.sia(sia).unwrap();
    assert_eq!(a.ha_state, None);
    assert_eq!(a.requested_ha_state, Some(HaState::Active));
}
