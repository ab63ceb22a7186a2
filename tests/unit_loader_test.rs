// tests/unit_loader_test.rs

use aegis::core::loader::load_model;
use aegis::core::model::types::{
    CompCategory, HealthcheckInvocation, PresenceState, RecommendedRecovery,
};

const EXAMPLE: &str = r#"
# A minimal two-node cluster.
cluster {
    name: ExampleCluster;
    startup_timeout_ms: 5000;

    node { name: N1; clm_node: node-1; nodeid: 1; }
    node { name: N2; clm_node: node-2; nodeid: 2; su_failover_max: 2; }

    application {
        name: A;
        sg {
            name: G;
            pref_active_sus: 1;
            pref_standby_sus: 1;
            comp_restart_max: 3;
            su {
                name: S1;
                hosted_by_node: N1;
                comp {
                    name: C1;
                    category: sa_aware, local;
                    cs_types: web;
                    instantiate_cmd: /usr/bin/web-server;
                    instantiate_args: --port 8080;
                    instantiate_timeout_ms: 2000;
                    cleanup_cmd: /usr/bin/web-cleanup;
                    recommended_recovery: component_restart;
                    healthcheck {
                        key: hc1;
                        period_ms: 1000;
                        max_duration_ms: 500;
                        invocation: amf_invoked;
                    }
                }
            }
            su {
                name: S2;
                hosted_by_node: N2;
                comp { name: C2; cs_types: web; }
            }
        }
        si {
            name: I;
            protected_by_sg: G;
            depends_on: Base;
            csi {
                name: X;
                cs_type: web;
                attribute { name: port; value: 8080; }
            }
        }
        si { name: Base; protected_by_sg: G; }
    }
}
"#;

#[test]
fn test_load_full_model() {
    let model = load_model(EXAMPLE).unwrap();
    assert_eq!(model.cluster.name, "ExampleCluster");
    assert_eq!(model.cluster.startup_timeout_ms, 5000);
    assert_eq!(model.nodes.len(), 2);
    assert_eq!(model.node(model.find_node("N2").unwrap()).su_failover_max, 2);

    let app = model.find_application("A").unwrap();
    let sg = model.find_sg(app, "G").unwrap();
    assert_eq!(model.sg(sg).comp_restart_max, 3);

    let s1 = model.find_su(sg, "S1").unwrap();
    assert_eq!(model.su(s1).hosted_by_node, "N1");
    assert_eq!(model.su(s1).presence_state, PresenceState::Uninstantiated);

    let c1 = model.find_component(s1, "C1").unwrap();
    let comp = model.comp(c1);
    assert_eq!(comp.category, CompCategory::SA_AWARE | CompCategory::LOCAL);
    assert_eq!(comp.cs_types, vec!["web".to_string()]);
    assert_eq!(comp.instantiate.cmd, "/usr/bin/web-server");
    assert_eq!(comp.instantiate.args, vec!["--port".to_string(), "8080".to_string()]);
    assert_eq!(comp.instantiate.timeout_ms, 2000);
    assert_eq!(comp.recommended_recovery, RecommendedRecovery::ComponentRestart);

    let hc = model.find_healthcheck(c1, "hc1").unwrap();
    let hc = &model.healthchecks[hc.index()];
    assert_eq!(hc.period_ms, 1000);
    assert_eq!(hc.max_duration_ms, 500);
    assert_eq!(hc.invocation, HealthcheckInvocation::AmfInvoked);
    assert!(!hc.active);

    let si = model.find_si(app, "I").unwrap();
    assert_eq!(model.si(si).protected_by_sg, "G");
    assert_eq!(model.si(si).depends_on, vec!["Base".to_string()]);
    let csi = model.find_csi(si, "X").unwrap();
    assert_eq!(model.csi(csi).cs_type, "web");
    assert_eq!(
        model.csi(csi).attributes,
        vec![("port".to_string(), "8080".to_string())]
    );
}

#[test]
fn test_unknown_keys_are_ignored() {
    let input = r#"
cluster {
    name: C;
    flux_capacitance: 42;
    node { name: N1; paint_color: red; }
}
"#;
    let model = load_model(input).unwrap();
    assert_eq!(model.nodes.len(), 1);
}

#[test]
fn test_missing_cluster_section_fails() {
    assert!(load_model("node { name: N1; }").is_err());
}

#[test]
fn test_missing_semicolon_fails() {
    let input = "cluster { name: C\n}";
    assert!(load_model(input).is_err());
}

#[test]
fn test_unbalanced_braces_fail() {
    assert!(load_model("cluster { name: C; ").is_err());
    assert!(load_model("cluster { name: C; } }").is_err());
}

#[test]
fn test_non_integer_value_fails() {
    let input = "cluster { name: C; node { name: N1; nodeid: lots; } }";
    assert!(load_model(input).is_err());
}

#[test]
fn test_oversize_line_fails() {
    let long_value = "x".repeat(600);
    let input = format!("cluster {{ name: C; comment: {long_value}; }}");
    assert!(load_model(&input).is_err());
}

#[test]
fn test_duplicate_node_names_fail() {
    let input = "cluster { name: C; node { name: N1; } node { name: N1; } }";
    assert!(load_model(input).is_err());
}
