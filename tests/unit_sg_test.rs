// tests/unit_sg_test.rs

mod common;

use aegis::core::AmfEvent;
use aegis::core::model::types::{AssignmentState, HaState, SgAcsmState};
use aegis::core::model::{Model, NodeId};

use common::Harness;

/// `n` nodes, one SU per node, one group with the given preferences, `sis`
/// service instances of one CS type.
fn cluster_model(
    nodes: usize,
    sis: usize,
    pref_active: u32,
    pref_standby: u32,
    max_active: u32,
    max_standby: u32,
) -> Model {
    let mut model = Model::new("Cluster");
    let app = model.new_application("A").unwrap();
    let sg = model.new_sg(app, "G").unwrap();
    {
        let s = model.sg_mut(sg);
        s.pref_active_sus = pref_active;
        s.pref_standby_sus = pref_standby;
        s.max_active_sis_per_su = max_active;
        s.max_standby_sis_per_su = max_standby;
    }
    for i in 1..=nodes {
        let node_name = format!("N{i}");
        model.new_node(&node_name).unwrap();
        let su = model.new_su(sg, &format!("S{i}")).unwrap();
        model.su_mut(su).hosted_by_node = node_name;
        let comp = model.new_component(su, &format!("C{i}")).unwrap();
        model.comp_mut(comp).cs_types = vec!["web".to_string()];
    }
    for i in 1..=sis {
        let si = model.new_si(app, &format!("I{i}")).unwrap();
        model.si_mut(si).protected_by_sg = "G".to_string();
        let csi = model.new_csi(si, &format!("X{i}")).unwrap();
        model.csis[csi.index()].cs_type = "web".to_string();
    }
    model
}

fn states_of(h: &Harness, si_name: &str) -> Vec<(String, Option<HaState>)> {
    common::assignment_states(&h.engine.model, si_name)
}

#[test]
fn test_full_assignment_with_spares() {
    // Three in-service SUs for a 1+1 group: one active, one standby, one
    // spare left alone.
    let mut h = Harness::new(cluster_model(3, 1, 1, 1, 1, 1), NodeId(0));
    h.start_cluster();

    assert_eq!(
        states_of(&h, "I1"),
        vec![
            ("S1".to_string(), Some(HaState::Active)),
            ("S2".to_string(), Some(HaState::Standby)),
        ]
    );
    let model = &h.engine.model;
    let app = model.find_application("A").unwrap();
    let si = model.find_si(app, "I1").unwrap();
    assert_eq!(model.si_assignment_state(si), AssignmentState::FullyAssigned);
}

#[test]
fn test_partial_assignment_drops_sis() {
    // One in-service SU taking at most one active SI cannot protect two SIs.
    let mut h = Harness::new(cluster_model(1, 2, 1, 1, 1, 1), NodeId(0));
    h.start_cluster();

    assert_eq!(
        states_of(&h, "I1"),
        vec![("S1".to_string(), Some(HaState::Active))]
    );
    assert!(states_of(&h, "I2").is_empty());

    let model = &h.engine.model;
    let app = model.find_application("A").unwrap();
    let i2 = model.find_si(app, "I2").unwrap();
    assert_eq!(model.si_assignment_state(i2), AssignmentState::Unassigned);
}

#[test]
fn test_standby_reduction_keeps_actives() {
    // Two SIs over two SUs with capacity two: both SUs are needed for the
    // active side, the standby side is dropped entirely.
    let mut h = Harness::new(cluster_model(2, 2, 2, 1, 1, 2), NodeId(0));
    h.start_cluster();

    assert_eq!(
        states_of(&h, "I1"),
        vec![("S1".to_string(), Some(HaState::Active))]
    );
    assert_eq!(
        states_of(&h, "I2"),
        vec![("S2".to_string(), Some(HaState::Active))]
    );
}

#[test]
fn test_multiple_sis_packed_per_su() {
    // Two SIs fit one active SU when its cap allows, standby on the other.
    let mut h = Harness::new(cluster_model(2, 2, 1, 1, 2, 2), NodeId(0));
    h.start_cluster();

    assert_eq!(
        states_of(&h, "I1"),
        vec![
            ("S1".to_string(), Some(HaState::Active)),
            ("S2".to_string(), Some(HaState::Standby)),
        ]
    );
    assert_eq!(
        states_of(&h, "I2"),
        vec![
            ("S1".to_string(), Some(HaState::Active)),
            ("S2".to_string(), Some(HaState::Standby)),
        ]
    );
}

#[test]
fn test_failover_su_moves_workload_to_standby() {
    let mut h = Harness::new(common::two_node_model(), NodeId(0));
    h.start_cluster();
    assert_eq!(
        states_of(&h, "I"),
        vec![
            ("S1".to_string(), Some(HaState::Active)),
            ("S2".to_string(), Some(HaState::Standby)),
        ]
    );

    let model = &h.engine.model;
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let s1 = model.find_su(sg, "S1").unwrap();
    let node = model.find_node("N1").unwrap();

    h.engine
        .dispatch(AmfEvent::SgFailoverSuReq(sg, s1, node))
        .unwrap();
    h.settle();

    let states = states_of(&h, "I");
    // The standby took over; the repaired unit came back as the standby.
    assert!(states.contains(&("S2".to_string(), Some(HaState::Active))));
    assert!(states.contains(&("S1".to_string(), Some(HaState::Standby))));
    assert_eq!(h.engine.model.su(s1).failover_count, 1);

    // The recovery scope is fully released.
    let sg_ref = h.engine.model.sg(sg);
    assert_eq!(sg_ref.acsm_state, SgAcsmState::Idle);
    assert!(sg_ref.recovery_scope.is_empty());
}

#[test]
fn test_failover_during_recovery_is_deferred_and_recalled() {
    let mut h = Harness::new(common::two_node_model(), NodeId(0));
    h.start_cluster();

    let model = &h.engine.model;
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let s1 = model.find_su(sg, "S1").unwrap();
    let s2 = model.find_su(sg, "S2").unwrap();
    let node = model.find_node("N1").unwrap();

    // First recovery holds the group; park every HA transfer so it stays
    // mid-sequence.
    h.hold_hastate = true;
    h.engine
        .dispatch(AmfEvent::SgFailoverSuReq(sg, s1, node))
        .unwrap();
    h.settle();
    assert_ne!(h.engine.model.sg(sg).acsm_state, SgAcsmState::Idle);

    // A second failover arriving mid-recovery is deferred, not fatal.
    h.engine
        .dispatch(AmfEvent::SgFailoverSuReq(sg, s2, node))
        .unwrap();
    assert_eq!(h.engine.model.sg(sg).deferred_events.len(), 1);

    // Releasing the transfers completes the first recovery and recalls the
    // second, which then also runs to completion.
    h.release_hastate();
    h.settle();

    let model = &h.engine.model;
    assert_eq!(model.sg(sg).acsm_state, SgAcsmState::Idle);
    assert_eq!(model.sg(sg).deferred_events.len(), 0);
    assert!(model.sg(sg).recovery_scope.is_empty());
    // Both units were failed over once.
    assert_eq!(model.su(s1).failover_count, 1);
    assert_eq!(model.su(s2).failover_count, 1);
}

#[test]
fn test_requested_state_reset_on_reassignment() {
    let mut h = Harness::new(common::two_node_model(), NodeId(0));
    h.start_cluster();

    let model = &mut h.engine.model;
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let si = model.find_si(app, "I").unwrap();

    // Leave a stale requested state behind, as a partial failure would.
    let sia = model.sias_of_si(si)[0];
    if let Some(a) = model.sia_mut(sia) {
        a.requested_ha_state = Some(HaState::Quiesced);
    }

    model.app_mut(app).acsm_state = aegis::core::model::types::AppAcsmState::AssigningWorkload;
    h.engine.sg_assign_si_req(sg, 0).unwrap();
    h.settle();

    // The stale request was cleared back to the confirmed state instead of
    // being committed.
    let model = &h.engine.model;
    let a = model.sia(sia).unwrap();
    assert_eq!(a.requested_ha_state, a.ha_state);
    assert_eq!(model.sg(sg).acsm_state, SgAcsmState::Idle);
}

#[test]
fn test_dependent_workload_is_quiesced_before_termination() {
    // Base and Dep are protected by the same group; Dep depends on Base.
    // Both ride the same active SU.
    let mut model = cluster_model(2, 0, 1, 1, 2, 2);
    let app = model.find_application("A").unwrap();
    for name in ["Base", "Dep"] {
        let si = model.new_si(app, name).unwrap();
        model.si_mut(si).protected_by_sg = "G".to_string();
        let csi = model.new_csi(si, &format!("X{name}")).unwrap();
        model.csis[csi.index()].cs_type = "web".to_string();
    }
    let dep = model.find_si(app, "Dep").unwrap();
    model.si_mut(dep).depends_on = vec!["Base".to_string()];

    let mut h = Harness::new(model, NodeId(0));
    h.start_cluster();

    let model = &h.engine.model;
    let sg = model.find_sg(app, "G").unwrap();
    let s1 = model.find_su(sg, "S1").unwrap();
    let node = model.find_node("N1").unwrap();
    assert_eq!(
        states_of(&h, "Dep"),
        vec![
            ("S1".to_string(), Some(HaState::Active)),
            ("S2".to_string(), Some(HaState::Standby)),
        ]
    );

    // Hold the HA transfers so the quiesce step is observable.
    h.hold_hastate = true;
    h.engine
        .dispatch(AmfEvent::SgFailoverSuReq(sg, s1, node))
        .unwrap();
    h.settle();

    let model = &h.engine.model;
    assert_eq!(
        model.sg(sg).acsm_state,
        SgAcsmState::DeactivatingDependantWorkload
    );
    let dep_sia = model
        .sia_of_si_su(dep, s1)
        .expect("dependent assignment still present");
    assert_eq!(
        model.sia(dep_sia).unwrap().requested_ha_state,
        Some(HaState::Quiesced)
    );

    // Once the dependent workload confirms quiesced, the recovery runs to
    // completion and the standby side takes over both instances.
    h.release_hastate();
    h.settle();
    let states = states_of(&h, "Base");
    assert!(states.contains(&("S2".to_string(), Some(HaState::Active))));
    let states = states_of(&h, "Dep");
    assert!(states.contains(&("S2".to_string(), Some(HaState::Active))));
    assert_eq!(h.engine.model.sg(sg).acsm_state, SgAcsmState::Idle);
    assert!(h.engine.model.sg(sg).recovery_scope.is_empty());
}
