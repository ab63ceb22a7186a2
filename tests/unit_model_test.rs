// tests/unit_model_test.rs

mod common;

use aegis::core::model::types::{
    AdminState, HaState, NodeAcsmState, OperationalState, PresenceState, ReadinessState,
    SuRcsmState,
};
use aegis::core::model::Model;

#[test]
fn test_node_defaults() {
    let mut model = Model::new("C");
    let node = model.new_node("N1").unwrap();
    let n = model.node(node);
    assert_eq!(n.admin_state, AdminState::Unlocked);
    assert_eq!(n.op_state, OperationalState::Enabled);
    assert!(n.auto_repair);
    assert_eq!(n.su_failover_prob_ms, -1);
    assert_eq!(n.su_failover_max, u32::MAX);
    assert_eq!(n.acsm_state, NodeAcsmState::IdleLevel0);
    assert_eq!(n.history_state, NodeAcsmState::IdleLevel0);
}

#[test]
fn test_sg_defaults() {
    let mut model = Model::new("C");
    let app = model.new_application("A").unwrap();
    let sg = model.new_sg(app, "G").unwrap();
    let s = model.sg(sg);
    assert_eq!(s.admin_state, AdminState::Unlocked);
    assert_eq!(s.pref_active_sus, 1);
    assert_eq!(s.pref_standby_sus, 1);
    assert_eq!(s.pref_inservice_sus, u32::MAX);
    assert_eq!(s.pref_assigned_sus, u32::MAX);
    assert_eq!(s.comp_restart_prob_ms, -1);
    assert_eq!(s.comp_restart_max, u32::MAX);
    assert_eq!(s.su_restart_prob_ms, -1);
    assert_eq!(s.su_restart_max, u32::MAX);
    assert_eq!(s.auto_adjust_prob_ms, -1);
    assert!(s.auto_repair);
    assert!(s.recovery_scope.is_empty());
}

#[test]
fn test_su_and_si_defaults() {
    let mut model = Model::new("C");
    let app = model.new_application("A").unwrap();
    let sg = model.new_sg(app, "G").unwrap();
    let su = model.new_su(sg, "S").unwrap();
    let s = model.su(su);
    assert_eq!(s.rank, 0);
    assert!(!s.is_external);
    assert!(s.failover);
    assert_eq!(s.admin_state, AdminState::Unlocked);
    assert_eq!(s.op_state, OperationalState::Disabled);
    assert_eq!(s.presence_state, PresenceState::Uninstantiated);
    assert_eq!(s.rcsm_state, SuRcsmState::IdleLevel0);

    let si = model.new_si(app, "I").unwrap();
    let i = model.si(si);
    assert_eq!(i.admin_state, AdminState::Unlocked);
    assert_eq!(i.rank, 0);
    assert_eq!(i.pref_active_assignments, 1);
    assert_eq!(i.pref_standby_assignments, 1);
}

#[test]
fn test_duplicate_sibling_names_are_rejected() {
    let mut model = Model::new("C");
    let app = model.new_application("A").unwrap();
    model.new_sg(app, "G").unwrap();
    assert!(model.new_sg(app, "G").is_err());

    // The same RDN under a different parent is fine.
    let app2 = model.new_application("B").unwrap();
    assert!(model.new_sg(app2, "G").is_ok());
}

#[test]
fn test_dn_construction_and_lookup() {
    let model = common::single_node_model();
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let su = model.find_su(sg, "S").unwrap();
    let comp = model.find_component(su, "C").unwrap();
    let si = model.find_si(app, "I").unwrap();
    let csi = model.find_csi(si, "X").unwrap();

    assert_eq!(model.sg_dn(sg), "safSg=G,safApp=A");
    assert_eq!(model.su_dn(su), "safSu=S,safSg=G,safApp=A");
    assert_eq!(model.comp_dn(comp), "safComp=C,safSu=S,safSg=G,safApp=A");
    assert_eq!(model.si_dn(si), "safSi=I,safApp=A");
    assert_eq!(model.csi_dn(csi), "safCsi=X,safSi=I,safApp=A");

    assert_eq!(model.find_comp_by_dn("safComp=C,safSu=S,safSg=G,safApp=A"), Some(comp));
    assert_eq!(model.find_comp_by_dn("safComp=Z,safSu=S,safSg=G,safApp=A"), None);
    assert_eq!(model.find_su_by_dn(&model.su_dn(su)), Some(su));
    assert_eq!(model.find_csi_by_dn(&model.csi_dn(csi)), Some(csi));
}

#[test]
fn test_create_si_assignment_builds_matching_csi_assignments() {
    let mut model = common::single_node_model();
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let su = model.find_su(sg, "S").unwrap();
    let comp = model.find_component(su, "C").unwrap();
    let si = model.find_si(app, "I").unwrap();

    let sia = model.create_si_assignment(su, si, HaState::Active);
    let csias = model.csias_of_sia(sia);
    assert_eq!(csias.len(), 1);
    let csia = model.csia(csias[0]).unwrap();
    assert_eq!(csia.comp, comp);
    assert_eq!(csia.requested_ha_state, Some(HaState::Active));
    assert_eq!(csia.ha_state, None);

    // The CSI assignment's component belongs to the parent assignment's SU.
    assert_eq!(model.comp(csia.comp).su, model.sia(sia).unwrap().su);

    // One SI assignment per SI and SU pair.
    assert_eq!(model.sia_of_si_su(si, su), Some(sia));
}

#[test]
fn test_delete_csi_assignments_scoped_to_su() {
    let mut model = common::two_node_model();
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let s1 = model.find_su(sg, "S1").unwrap();
    let s2 = model.find_su(sg, "S2").unwrap();
    let si = model.find_si(app, "I").unwrap();
    let csi = model.find_csi(si, "X").unwrap();

    model.create_si_assignment(s1, si, HaState::Active);
    model.create_si_assignment(s2, si, HaState::Standby);
    assert_eq!(model.csias_of_csi(csi).len(), 2);

    model.delete_csi_assignments(csi, s1);
    let remaining = model.csias_of_csi(csi);
    assert_eq!(remaining.len(), 1);
    let left = model.csia(remaining[0]).unwrap();
    assert_eq!(model.comp(left.comp).su, s2);
}

#[test]
fn test_su_readiness_derivation() {
    let mut model = common::single_node_model();
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let su = model.find_su(sg, "S").unwrap();

    assert_eq!(model.su_readiness(su), ReadinessState::OutOfService);

    model.su_mut(su).op_state = OperationalState::Enabled;
    assert_eq!(model.su_readiness(su), ReadinessState::Stopping);

    model.su_mut(su).presence_state = PresenceState::Instantiated;
    assert_eq!(model.su_readiness(su), ReadinessState::InService);

    model.su_mut(su).presence_state = PresenceState::Restarting;
    assert_eq!(model.su_readiness(su), ReadinessState::InService);
}

#[test]
fn test_dependents_of_si() {
    let mut model = Model::new("C");
    let app = model.new_application("A").unwrap();
    let base = model.new_si(app, "Base").unwrap();
    let dep = model.new_si(app, "Dep").unwrap();
    model.si_mut(dep).depends_on = vec!["Base".to_string()];

    assert_eq!(model.dependents_of_si(base), vec![dep]);
    assert!(model.dependents_of_si(dep).is_empty());
}
