// src/core/loader.rs

//! Loads the availability model from its hierarchical text format:
//! `section { key: value; ... subsection { ... } }` with `#` comments.
//! Only entity construction happens here; no state-machine events fire.

use std::str::FromStr;

use tracing::warn;

use crate::core::errors::AegisError;
use crate::core::model::types::{
    CompCategory, HealthcheckInvocation, RecommendedRecovery, RedundancyModel,
};
use crate::core::model::{AppId, CompId, Model, SgId, SiId, SuId};

const MAX_LINE_LEN: usize = 512;

/// One parsed `name { ... }` block.
#[derive(Debug, Clone, Default)]
struct Section {
    name: String,
    pairs: Vec<(String, String)>,
    children: Vec<Section>,
}

impl Section {
    fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    fn children_named(&self, name: &str) -> Vec<&Section> {
        self.children.iter().filter(|c| c.name == name).collect()
    }
}

// --- Tokenizer / parser ---

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, AegisError> {
        for (idx, line) in input.lines().enumerate() {
            if line.len() > MAX_LINE_LEN {
                return Err(AegisError::Config(format!(
                    "line {} exceeds {} characters",
                    idx + 1,
                    MAX_LINE_LEN
                )));
            }
        }
        Ok(Self {
            input,
            pos: 0,
            line: 1,
        })
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// A bare word up to a structural delimiter.
    fn word(&mut self) -> Result<String, AegisError> {
        self.skip_ws_and_comments();
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '{' | '}' | ':' | ';' | '#') {
                break;
            }
            out.push(c);
            self.bump();
        }
        if out.is_empty() {
            return Err(AegisError::Config(format!(
                "expected identifier at line {}",
                self.line
            )));
        }
        Ok(out)
    }

    /// Everything up to the terminating `;`, trimmed. Values may contain
    /// spaces (command lines).
    fn value(&mut self) -> Result<String, AegisError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(';') => return Ok(out.trim().to_string()),
                Some('\n') | None => {
                    return Err(AegisError::Config(format!(
                        "missing ';' at line {}",
                        self.line
                    )));
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), AegisError> {
        self.skip_ws_and_comments();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            other => Err(AegisError::Config(format!(
                "expected '{}' at line {}, found {:?}",
                expected, self.line, other
            ))),
        }
    }

    /// `body := (key ':' value ';' | name '{' body '}')*`
    fn section_body(&mut self, name: String) -> Result<Section, AegisError> {
        let mut section = Section {
            name,
            ..Section::default()
        };
        loop {
            self.skip_ws_and_comments();
            match self.peek() {
                Some('}') | None => return Ok(section),
                _ => {}
            }
            let word = self.word()?;
            self.skip_ws_and_comments();
            match self.peek() {
                Some(':') => {
                    self.bump();
                    let value = self.value()?;
                    section.pairs.push((word, value));
                }
                Some('{') => {
                    self.bump();
                    let child = self.section_body(word)?;
                    self.expect('}')?;
                    section.children.push(child);
                }
                other => {
                    return Err(AegisError::Config(format!(
                        "expected ':' or '{{' after '{}' at line {}, found {:?}",
                        word, self.line, other
                    )));
                }
            }
        }
    }

    fn parse(mut self) -> Result<Vec<Section>, AegisError> {
        let root = self.section_body(String::new())?;
        self.skip_ws_and_comments();
        if self.peek().is_some() {
            return Err(AegisError::Config(format!(
                "unbalanced '}}' at line {}",
                self.line
            )));
        }
        Ok(root.children)
    }
}

// --- Typed value parsing ---

fn parse_u32(section: &Section, key: &str) -> Result<Option<u32>, AegisError> {
    match section.get(key) {
        None => Ok(None),
        Some(v) => v
            .parse::<u32>()
            .map(Some)
            .map_err(|_| AegisError::Config(format!("'{key}' is not an integer: '{v}'"))),
    }
}

fn parse_u64(section: &Section, key: &str) -> Result<Option<u64>, AegisError> {
    match section.get(key) {
        None => Ok(None),
        Some(v) => v
            .parse::<u64>()
            .map(Some)
            .map_err(|_| AegisError::Config(format!("'{key}' is not an integer: '{v}'"))),
    }
}

fn parse_i64(section: &Section, key: &str) -> Result<Option<i64>, AegisError> {
    match section.get(key) {
        None => Ok(None),
        Some(v) => v
            .parse::<i64>()
            .map(Some)
            .map_err(|_| AegisError::Config(format!("'{key}' is not an integer: '{v}'"))),
    }
}

fn parse_bool(section: &Section, key: &str) -> Result<Option<bool>, AegisError> {
    match section.get(key) {
        None => Ok(None),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            _ => Err(AegisError::Config(format!("'{key}' is not a boolean: '{v}'"))),
        },
    }
}

fn parse_enum<T: FromStr>(section: &Section, key: &str) -> Result<Option<T>, AegisError> {
    match section.get(key) {
        None => Ok(None),
        Some(v) => T::from_str(&v.to_ascii_uppercase())
            .map(Some)
            .map_err(|_| AegisError::Config(format!("unknown '{key}' value: '{v}'"))),
    }
}

fn parse_category(value: &str) -> Result<CompCategory, AegisError> {
    let mut category = CompCategory::empty();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        category |= match part.to_ascii_lowercase().as_str() {
            "sa_aware" => CompCategory::SA_AWARE,
            "proxy" => CompCategory::PROXY,
            "proxied" => CompCategory::PROXIED,
            "local" => CompCategory::LOCAL,
            "container" => CompCategory::CONTAINER,
            "contained" => CompCategory::CONTAINED,
            other => {
                return Err(AegisError::Config(format!(
                    "unknown component category '{other}'"
                )));
            }
        };
    }
    Ok(category)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn required<'a>(section: &'a Section, key: &str) -> Result<&'a str, AegisError> {
    section
        .get(key)
        .ok_or_else(|| AegisError::Config(format!("section '{}' missing '{}'", section.name, key)))
}

fn warn_unknown(section: &Section, known_keys: &[&str], known_children: &[&str]) {
    for (key, _) in &section.pairs {
        if !known_keys.contains(&key.as_str()) {
            warn!("Ignoring unknown key '{}' in section '{}'", key, section.name);
        }
    }
    for child in &section.children {
        if !known_children.contains(&child.name.as_str()) {
            warn!(
                "Ignoring unknown section '{}' in section '{}'",
                child.name, section.name
            );
        }
    }
}

// --- Model building ---

/// Parses the model file content into a fully constructed object graph.
pub fn load_model(input: &str) -> Result<Model, AegisError> {
    let sections = Parser::new(input)?.parse()?;
    let cluster = sections
        .iter()
        .find(|s| s.name == "cluster")
        .ok_or_else(|| AegisError::Config("missing 'cluster' section".into()))?;

    warn_unknown(
        cluster,
        &["name", "startup_timeout_ms"],
        &["node", "application"],
    );

    let mut model = Model::new(required(cluster, "name")?);
    if let Some(timeout) = parse_u64(cluster, "startup_timeout_ms")? {
        model.cluster.startup_timeout_ms = timeout;
    }

    for node_section in cluster.children_named("node") {
        build_node(&mut model, node_section)?;
    }
    for app_section in cluster.children_named("application") {
        build_application(&mut model, app_section)?;
    }
    Ok(model)
}

fn build_node(model: &mut Model, section: &Section) -> Result<(), AegisError> {
    warn_unknown(
        section,
        &["name", "clm_node", "nodeid", "auto_repair", "su_failover_prob_ms", "su_failover_max"],
        &[],
    );
    let node = model.new_node(required(section, "name")?)?;
    let n = model.node_mut(node);
    if let Some(clm) = section.get("clm_node") {
        n.clm_name = clm.to_string();
    }
    if let Some(id) = parse_u32(section, "nodeid")? {
        n.node_id = id;
    }
    if let Some(auto) = parse_bool(section, "auto_repair")? {
        n.auto_repair = auto;
    }
    if let Some(prob) = parse_i64(section, "su_failover_prob_ms")? {
        n.su_failover_prob_ms = prob;
    }
    if let Some(max) = parse_u32(section, "su_failover_max")? {
        n.su_failover_max = max;
    }
    Ok(())
}

fn build_application(model: &mut Model, section: &Section) -> Result<(), AegisError> {
    warn_unknown(section, &["name"], &["sg", "si"]);
    let app = model.new_application(required(section, "name")?)?;
    for sg_section in section.children_named("sg") {
        build_sg(model, app, sg_section)?;
    }
    for si_section in section.children_named("si") {
        build_si(model, app, si_section)?;
    }
    Ok(())
}

fn build_sg(model: &mut Model, app: AppId, section: &Section) -> Result<(), AegisError> {
    warn_unknown(
        section,
        &[
            "name",
            "redundancy_model",
            "auto_adjust",
            "auto_adjust_prob_ms",
            "auto_repair",
            "pref_active_sus",
            "pref_standby_sus",
            "pref_inservice_sus",
            "pref_assigned_sus",
            "max_active_sis_per_su",
            "max_standby_sis_per_su",
            "comp_restart_prob_ms",
            "comp_restart_max",
            "su_restart_prob_ms",
            "su_restart_max",
        ],
        &["su"],
    );
    let sg = model.new_sg(app, required(section, "name")?)?;
    {
        let s = model.sg_mut(sg);
        if let Some(v) = parse_enum::<RedundancyModel>(section, "redundancy_model")? {
            s.redundancy_model = v;
        }
        if let Some(v) = parse_bool(section, "auto_adjust")? {
            s.auto_adjust = v;
        }
        if let Some(v) = parse_i64(section, "auto_adjust_prob_ms")? {
            s.auto_adjust_prob_ms = v;
        }
        if let Some(v) = parse_bool(section, "auto_repair")? {
            s.auto_repair = v;
        }
        if let Some(v) = parse_u32(section, "pref_active_sus")? {
            s.pref_active_sus = v;
        }
        if let Some(v) = parse_u32(section, "pref_standby_sus")? {
            s.pref_standby_sus = v;
        }
        if let Some(v) = parse_u32(section, "pref_inservice_sus")? {
            s.pref_inservice_sus = v;
        }
        if let Some(v) = parse_u32(section, "pref_assigned_sus")? {
            s.pref_assigned_sus = v;
        }
        if let Some(v) = parse_u32(section, "max_active_sis_per_su")? {
            s.max_active_sis_per_su = v;
        }
        if let Some(v) = parse_u32(section, "max_standby_sis_per_su")? {
            s.max_standby_sis_per_su = v;
        }
        if let Some(v) = parse_i64(section, "comp_restart_prob_ms")? {
            s.comp_restart_prob_ms = v;
        }
        if let Some(v) = parse_u32(section, "comp_restart_max")? {
            s.comp_restart_max = v;
        }
        if let Some(v) = parse_i64(section, "su_restart_prob_ms")? {
            s.su_restart_prob_ms = v;
        }
        if let Some(v) = parse_u32(section, "su_restart_max")? {
            s.su_restart_max = v;
        }
    }
    for su_section in section.children_named("su") {
        build_su(model, sg, su_section)?;
    }
    Ok(())
}

fn build_su(model: &mut Model, sg: SgId, section: &Section) -> Result<(), AegisError> {
    warn_unknown(
        section,
        &["name", "rank", "hosted_by_node", "is_external", "failover"],
        &["comp"],
    );
    let su = model.new_su(sg, required(section, "name")?)?;
    {
        let s = model.su_mut(su);
        if let Some(v) = parse_u32(section, "rank")? {
            s.rank = v;
        }
        if let Some(v) = section.get("hosted_by_node") {
            s.hosted_by_node = v.to_string();
        }
        if let Some(v) = parse_bool(section, "is_external")? {
            s.is_external = v;
        }
        if let Some(v) = parse_bool(section, "failover")? {
            s.failover = v;
        }
    }
    for comp_section in section.children_named("comp") {
        build_component(model, su, comp_section)?;
    }
    Ok(())
}

fn build_component(model: &mut Model, su: SuId, section: &Section) -> Result<(), AegisError> {
    warn_unknown(
        section,
        &[
            "name",
            "category",
            "capability",
            "cs_types",
            "instantiation_level",
            "max_active_csi",
            "max_standby_csi",
            "instantiate_cmd",
            "instantiate_args",
            "instantiate_timeout_ms",
            "terminate_cmd",
            "terminate_args",
            "terminate_timeout_ms",
            "cleanup_cmd",
            "cleanup_args",
            "cleanup_timeout_ms",
            "recommended_recovery",
            "disable_restart",
        ],
        &["healthcheck"],
    );
    let comp = model.new_component(su, required(section, "name")?)?;
    {
        let c = model.comp_mut(comp);
        if let Some(v) = section.get("category") {
            c.category = parse_category(v)?;
        }
        if let Some(v) = section.get("cs_types") {
            c.cs_types = parse_list(v);
        }
        if let Some(v) = parse_u32(section, "instantiation_level")? {
            c.instantiation_level = v;
        }
        if let Some(v) = parse_u32(section, "max_active_csi")? {
            c.max_active_csi = v;
        }
        if let Some(v) = parse_u32(section, "max_standby_csi")? {
            c.max_standby_csi = v;
        }
        if let Some(v) = section.get("instantiate_cmd") {
            c.instantiate.cmd = v.to_string();
        }
        if let Some(v) = section.get("instantiate_args") {
            c.instantiate.args = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = parse_u64(section, "instantiate_timeout_ms")? {
            c.instantiate.timeout_ms = v;
        }
        if let Some(v) = section.get("terminate_cmd") {
            c.terminate.cmd = v.to_string();
        }
        if let Some(v) = section.get("terminate_args") {
            c.terminate.args = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = parse_u64(section, "terminate_timeout_ms")? {
            c.terminate.timeout_ms = v;
        }
        if let Some(v) = section.get("cleanup_cmd") {
            c.cleanup.cmd = v.to_string();
        }
        if let Some(v) = section.get("cleanup_args") {
            c.cleanup.args = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = parse_u64(section, "cleanup_timeout_ms")? {
            c.cleanup.timeout_ms = v;
        }
        if let Some(v) = parse_enum::<RecommendedRecovery>(section, "recommended_recovery")? {
            c.recommended_recovery = v;
        }
        if let Some(v) = parse_bool(section, "disable_restart")? {
            c.disable_restart = v;
        }
    }
    for hc_section in section.children_named("healthcheck") {
        build_healthcheck(model, comp, hc_section)?;
    }
    Ok(())
}

fn build_healthcheck(model: &mut Model, comp: CompId, section: &Section) -> Result<(), AegisError> {
    warn_unknown(
        section,
        &["key", "period_ms", "max_duration_ms", "invocation", "recommended_recovery"],
        &[],
    );
    let hc = model.new_healthcheck(comp, required(section, "key")?)?;
    let h = &mut model.healthchecks[hc.index()];
    if let Some(v) = parse_u64(section, "period_ms")? {
        h.period_ms = v;
    }
    if let Some(v) = parse_u64(section, "max_duration_ms")? {
        h.max_duration_ms = v;
    }
    if let Some(v) = parse_enum::<HealthcheckInvocation>(section, "invocation")? {
        h.invocation = v;
    }
    if let Some(v) = parse_enum::<RecommendedRecovery>(section, "recommended_recovery")? {
        h.recommended_recovery = v;
    }
    Ok(())
}

fn build_si(model: &mut Model, app: AppId, section: &Section) -> Result<(), AegisError> {
    warn_unknown(
        section,
        &[
            "name",
            "protected_by_sg",
            "rank",
            "pref_active_assignments",
            "pref_standby_assignments",
            "depends_on",
        ],
        &["csi"],
    );
    let si = model.new_si(app, required(section, "name")?)?;
    {
        let s = model.si_mut(si);
        if let Some(v) = section.get("protected_by_sg") {
            s.protected_by_sg = v.to_string();
        }
        if let Some(v) = parse_u32(section, "rank")? {
            s.rank = v;
        }
        if let Some(v) = parse_u32(section, "pref_active_assignments")? {
            s.pref_active_assignments = v;
        }
        if let Some(v) = parse_u32(section, "pref_standby_assignments")? {
            s.pref_standby_assignments = v;
        }
    }
    let depends: Vec<String> = section
        .get_all("depends_on")
        .into_iter()
        .flat_map(parse_list)
        .collect();
    model.si_mut(si).depends_on = depends;

    for csi_section in section.children_named("csi") {
        build_csi(model, si, csi_section)?;
    }
    Ok(())
}

fn build_csi(model: &mut Model, si: SiId, section: &Section) -> Result<(), AegisError> {
    warn_unknown(section, &["name", "cs_type", "depends_on"], &["attribute"]);
    let csi = model.new_csi(si, required(section, "name")?)?;
    {
        let c = &mut model.csis[csi.index()];
        if let Some(v) = section.get("cs_type") {
            c.cs_type = v.to_string();
        }
        c.dependencies = section
            .get_all("depends_on")
            .into_iter()
            .flat_map(parse_list)
            .collect();
    }
    for attr in section.children_named("attribute") {
        let name = required(attr, "name")?.to_string();
        let value = attr.get("value").unwrap_or_default().to_string();
        model.csis[csi.index()].attributes.push((name, value));
    }
    Ok(())
}
