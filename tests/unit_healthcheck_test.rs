// tests/unit_healthcheck_test.rs

mod common;

use aegis::core::client::ClientRequest;
use aegis::core::model::types::{HealthcheckInvocation, RecommendedRecovery, SuRcsmState};
use aegis::core::model::NodeId;
use aegis::core::timer::TimerKind;

use common::Harness;

fn model_with_healthcheck() -> aegis::core::model::Model {
    let mut model = common::single_node_model();
    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    let su = model.find_su(sg, "S").unwrap();
    let comp = model.find_component(su, "C").unwrap();
    let hc = model.new_healthcheck(comp, "hc1").unwrap();
    {
        let h = &mut model.healthchecks[hc.index()];
        h.period_ms = 1_000;
        h.max_duration_ms = 500;
    }
    model
}

#[test]
fn test_healthcheck_start_arms_the_period() {
    let mut h = Harness::new(model_with_healthcheck(), NodeId(0));
    h.start_cluster();
    let comp = h.engine.model.find_comp_by_dn("safComp=C,safSu=S,safSg=G,safApp=A").unwrap();

    let before = h.engine.timers.pending();
    h.engine
        .handle_client(ClientRequest::HealthcheckStart {
            comp_dn: h.engine.model.comp_dn(comp),
            key: "hc1".to_string(),
            invocation: HealthcheckInvocation::AmfInvoked,
            recovery: RecommendedRecovery::ComponentRestart,
        })
        .unwrap();

    let model = &h.engine.model;
    let hc = model.find_healthcheck(comp, "hc1").unwrap();
    assert!(model.healthchecks[hc.index()].active);
    assert_eq!(h.engine.timers.pending(), before + 1);
}

#[test]
fn test_unknown_healthcheck_key_is_rejected() {
    let mut h = Harness::new(model_with_healthcheck(), NodeId(0));
    h.start_cluster();
    let comp_dn = "safComp=C,safSu=S,safSg=G,safApp=A".to_string();
    assert!(h
        .engine
        .handle_client(ClientRequest::HealthcheckStart {
            comp_dn,
            key: "nope".to_string(),
            invocation: HealthcheckInvocation::AmfInvoked,
            recovery: RecommendedRecovery::ComponentRestart,
        })
        .is_err());
}

#[test]
fn test_confirm_cancels_duration_and_keeps_period() {
    let mut h = Harness::new(model_with_healthcheck(), NodeId(0));
    h.start_cluster();
    let comp = h.engine.model.find_comp_by_dn("safComp=C,safSu=S,safSg=G,safApp=A").unwrap();
    let dn = h.engine.model.comp_dn(comp);

    h.engine
        .handle_client(ClientRequest::HealthcheckStart {
            comp_dn: dn.clone(),
            key: "hc1".to_string(),
            invocation: HealthcheckInvocation::AmfInvoked,
            recovery: RecommendedRecovery::ComponentRestart,
        })
        .unwrap();

    // The period elapses: a callback goes out and the answer deadline is
    // armed alongside the next period.
    h.engine
        .on_timer(TimerKind::HealthcheckPeriod(comp, "hc1".to_string()))
        .unwrap();
    let callbacks = h.engine.take_callbacks();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].comp, comp);
    let hc = h.engine.model.find_healthcheck(comp, "hc1").unwrap();
    assert!(h.engine.model.healthchecks[hc.index()].duration_timer.is_some());

    // The component answers in time: the deadline is dropped, the period
    // keeps running.
    h.respond(callbacks[0].invocation, true);
    h.settle();
    let model = &h.engine.model;
    assert!(model.healthchecks[hc.index()].duration_timer.is_none());
    assert!(model.healthchecks[hc.index()].period_timer.is_some());
    assert_eq!(model.su(model.comp(comp).su).rcsm_state, SuRcsmState::IdleLevel0);
}

#[test]
fn test_missed_healthcheck_escalates_to_restart() {
    let mut h = Harness::new(model_with_healthcheck(), NodeId(0));
    h.start_cluster();
    let comp = h.engine.model.find_comp_by_dn("safComp=C,safSu=S,safSg=G,safApp=A").unwrap();
    let su = h.engine.model.comp(comp).su;
    let dn = h.engine.model.comp_dn(comp);

    h.engine
        .handle_client(ClientRequest::HealthcheckStart {
            comp_dn: dn,
            key: "hc1".to_string(),
            invocation: HealthcheckInvocation::AmfInvoked,
            recovery: RecommendedRecovery::ComponentRestart,
        })
        .unwrap();
    h.engine
        .on_timer(TimerKind::HealthcheckPeriod(comp, "hc1".to_string()))
        .unwrap();
    let _ = h.engine.take_callbacks();

    // No answer: the deadline fires, the timeout is broadcast, and the
    // restart ladder picks the component up.
    h.engine
        .on_timer(TimerKind::HealthcheckDuration(comp, "hc1".to_string()))
        .unwrap();
    h.settle();

    let model = &h.engine.model;
    assert_eq!(model.comp(comp).restart_count, 1);
    assert_eq!(model.su(su).rcsm_state, SuRcsmState::IdleLevel1);
    // The tracking was disarmed by the failure.
    let hc = model.find_healthcheck(comp, "hc1").unwrap();
    assert!(!model.healthchecks[hc.index()].active);
}
