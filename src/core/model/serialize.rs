// src/core/model/serialize.rs

//! Length-prefixed little-endian field-by-field codec for the object model.
//!
//! Used for cross-node model sync. Round-trip guarantee: deserializing a
//! serialized entity yields a semantically equal entity, with transient state
//! (timer handles, library sessions, pending continuations) zeroed.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::errors::AegisError;
use crate::core::model::entities::{
    Application, ClcCommand, Cluster, Component, Csi, Healthcheck, Node, ServiceGroup,
    ServiceInstance, ServiceUnit,
};
use crate::core::model::types::{
    AdminState, AppAcsmState, ClusterAcsmState, CompCapabilityModel, CompCategory, HaState,
    HealthcheckInvocation, NodeAcsmState, OperationalState, PresenceState, RecommendedRecovery,
    RedundancyModel, SgAcsmState, SuRcsmState,
};
use crate::core::model::{AppId, CompId, SgId, SiId, SuId};

// --- Wire primitives ---

pub fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u16_le(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

pub fn get_str(buf: &mut Bytes) -> Result<String, AegisError> {
    if buf.remaining() < 2 {
        return Err(AegisError::IncompleteData);
    }
    let len = buf.get_u16_le() as usize;
    if buf.remaining() < len {
        return Err(AegisError::IncompleteData);
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| AegisError::IncompleteData)
}

pub fn put_str_vec(buf: &mut BytesMut, items: &[String]) {
    buf.put_u16_le(items.len() as u16);
    for item in items {
        put_str(buf, item);
    }
}

pub fn get_str_vec(buf: &mut Bytes) -> Result<Vec<String>, AegisError> {
    if buf.remaining() < 2 {
        return Err(AegisError::IncompleteData);
    }
    let count = buf.get_u16_le() as usize;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(get_str(buf)?);
    }
    Ok(items)
}

pub fn get_u8(buf: &mut Bytes) -> Result<u8, AegisError> {
    if buf.remaining() < 1 {
        return Err(AegisError::IncompleteData);
    }
    Ok(buf.get_u8())
}

pub fn get_u16(buf: &mut Bytes) -> Result<u16, AegisError> {
    if buf.remaining() < 2 {
        return Err(AegisError::IncompleteData);
    }
    Ok(buf.get_u16_le())
}

pub fn get_u32(buf: &mut Bytes) -> Result<u32, AegisError> {
    if buf.remaining() < 4 {
        return Err(AegisError::IncompleteData);
    }
    Ok(buf.get_u32_le())
}

pub fn get_u64(buf: &mut Bytes) -> Result<u64, AegisError> {
    if buf.remaining() < 8 {
        return Err(AegisError::IncompleteData);
    }
    Ok(buf.get_u64_le())
}

pub fn get_i64(buf: &mut Bytes) -> Result<i64, AegisError> {
    if buf.remaining() < 8 {
        return Err(AegisError::IncompleteData);
    }
    Ok(buf.get_i64_le())
}

pub fn get_i32(buf: &mut Bytes) -> Result<i32, AegisError> {
    if buf.remaining() < 4 {
        return Err(AegisError::IncompleteData);
    }
    Ok(buf.get_i32_le())
}

pub fn put_bool(buf: &mut BytesMut, v: bool) {
    buf.put_u8(u8::from(v));
}

pub fn get_bool(buf: &mut Bytes) -> Result<bool, AegisError> {
    Ok(get_u8(buf)? != 0)
}

pub fn put_opt_ha(buf: &mut BytesMut, ha: Option<HaState>) {
    buf.put_u8(ha.map_or(0, |h| h as u8));
}

pub fn get_opt_ha(buf: &mut Bytes) -> Result<Option<HaState>, AegisError> {
    let raw = get_u8(buf)?;
    if raw == 0 {
        return Ok(None);
    }
    HaState::from_repr(raw)
        .map(Some)
        .ok_or(AegisError::IncompleteData)
}

pub fn put_opt_str(buf: &mut BytesMut, s: Option<&str>) {
    match s {
        Some(s) => {
            buf.put_u8(1);
            put_str(buf, s);
        }
        None => buf.put_u8(0),
    }
}

pub fn get_opt_str(buf: &mut Bytes) -> Result<Option<String>, AegisError> {
    if get_u8(buf)? == 0 {
        Ok(None)
    } else {
        Ok(Some(get_str(buf)?))
    }
}

macro_rules! read_enum {
    ($buf:expr, $t:ty) => {
        <$t>::from_repr(get_u8($buf)?).ok_or(AegisError::IncompleteData)?
    };
}

fn put_clc(buf: &mut BytesMut, clc: &ClcCommand) {
    put_str(buf, &clc.cmd);
    put_str_vec(buf, &clc.args);
    buf.put_u64_le(clc.timeout_ms);
}

fn get_clc(buf: &mut Bytes) -> Result<ClcCommand, AegisError> {
    Ok(ClcCommand {
        cmd: get_str(buf)?,
        args: get_str_vec(buf)?,
        timeout_ms: get_u64(buf)?,
    })
}

// --- Per-entity codec ---

pub fn serialize_cluster(cluster: &Cluster) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_str(&mut buf, &cluster.name);
    buf.put_u64_le(cluster.startup_timeout_ms);
    buf.put_u8(cluster.admin_state as u8);
    buf.put_u8(cluster.acsm_state as u8);
    buf.to_vec()
}

pub fn deserialize_cluster(buf: &mut Bytes) -> Result<Cluster, AegisError> {
    let name = get_str(buf)?;
    let mut cluster = Cluster::new(&name);
    cluster.startup_timeout_ms = get_u64(buf)?;
    cluster.admin_state = read_enum!(buf, AdminState);
    cluster.acsm_state = read_enum!(buf, ClusterAcsmState);
    Ok(cluster)
}

pub fn serialize_node(node: &Node) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_str(&mut buf, &node.name);
    put_str(&mut buf, &node.clm_name);
    buf.put_u32_le(node.node_id);
    buf.put_u8(node.admin_state as u8);
    buf.put_u8(node.op_state as u8);
    buf.put_u8(node.acsm_state as u8);
    buf.put_u8(node.history_state as u8);
    put_bool(&mut buf, node.auto_repair);
    buf.put_i64_le(node.su_failover_prob_ms);
    buf.put_u32_le(node.su_failover_max);
    buf.to_vec()
}

pub fn deserialize_node(buf: &mut Bytes) -> Result<Node, AegisError> {
    let name = get_str(buf)?;
    let mut node = Node::new(&name);
    node.clm_name = get_str(buf)?;
    node.node_id = get_u32(buf)?;
    node.admin_state = read_enum!(buf, AdminState);
    node.op_state = read_enum!(buf, OperationalState);
    node.acsm_state = read_enum!(buf, NodeAcsmState);
    node.history_state = read_enum!(buf, NodeAcsmState);
    node.auto_repair = get_bool(buf)?;
    node.su_failover_prob_ms = get_i64(buf)?;
    node.su_failover_max = get_u32(buf)?;
    Ok(node)
}

pub fn serialize_application(app: &Application) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_str(&mut buf, &app.name);
    buf.put_u8(app.admin_state as u8);
    buf.put_u8(app.acsm_state as u8);
    buf.to_vec()
}

pub fn deserialize_application(buf: &mut Bytes) -> Result<Application, AegisError> {
    let name = get_str(buf)?;
    let mut app = Application::new(&name);
    app.admin_state = read_enum!(buf, AdminState);
    app.acsm_state = read_enum!(buf, AppAcsmState);
    Ok(app)
}

pub fn serialize_sg(sg: &ServiceGroup) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_str(&mut buf, &sg.name);
    buf.put_u8(sg.redundancy_model as u8);
    put_bool(&mut buf, sg.auto_adjust);
    buf.put_u32_le(sg.pref_active_sus);
    buf.put_u32_le(sg.pref_standby_sus);
    buf.put_u32_le(sg.pref_inservice_sus);
    buf.put_u32_le(sg.pref_assigned_sus);
    buf.put_u32_le(sg.max_active_sis_per_su);
    buf.put_u32_le(sg.max_standby_sis_per_su);
    buf.put_i64_le(sg.comp_restart_prob_ms);
    buf.put_u32_le(sg.comp_restart_max);
    buf.put_i64_le(sg.su_restart_prob_ms);
    buf.put_u32_le(sg.su_restart_max);
    buf.put_i64_le(sg.auto_adjust_prob_ms);
    put_bool(&mut buf, sg.auto_repair);
    buf.put_u8(sg.admin_state as u8);
    buf.put_u8(sg.acsm_state as u8);
    buf.to_vec()
}

pub fn deserialize_sg(app: AppId, buf: &mut Bytes) -> Result<ServiceGroup, AegisError> {
    let name = get_str(buf)?;
    let mut sg = ServiceGroup::new(app, &name);
    sg.redundancy_model = read_enum!(buf, RedundancyModel);
    sg.auto_adjust = get_bool(buf)?;
    sg.pref_active_sus = get_u32(buf)?;
    sg.pref_standby_sus = get_u32(buf)?;
    sg.pref_inservice_sus = get_u32(buf)?;
    sg.pref_assigned_sus = get_u32(buf)?;
    sg.max_active_sis_per_su = get_u32(buf)?;
    sg.max_standby_sis_per_su = get_u32(buf)?;
    sg.comp_restart_prob_ms = get_i64(buf)?;
    sg.comp_restart_max = get_u32(buf)?;
    sg.su_restart_prob_ms = get_i64(buf)?;
    sg.su_restart_max = get_u32(buf)?;
    sg.auto_adjust_prob_ms = get_i64(buf)?;
    sg.auto_repair = get_bool(buf)?;
    sg.admin_state = read_enum!(buf, AdminState);
    sg.acsm_state = read_enum!(buf, SgAcsmState);
    Ok(sg)
}

pub fn serialize_su(su: &ServiceUnit) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_str(&mut buf, &su.name);
    buf.put_u32_le(su.rank);
    put_bool(&mut buf, su.is_external);
    put_bool(&mut buf, su.failover);
    buf.put_u8(su.admin_state as u8);
    buf.put_u8(su.op_state as u8);
    buf.put_u8(su.presence_state as u8);
    put_str(&mut buf, &su.hosted_by_node);
    buf.put_u32_le(su.restart_count);
    buf.put_u8(su.rcsm_state as u8);
    buf.put_u8(su.escalation_history_state as u8);
    buf.put_u32_le(su.failover_count);
    buf.put_u32_le(su.current_instantiation_level);
    buf.to_vec()
}

pub fn deserialize_su(sg: SgId, buf: &mut Bytes) -> Result<ServiceUnit, AegisError> {
    let name = get_str(buf)?;
    let mut su = ServiceUnit::new(sg, &name);
    su.rank = get_u32(buf)?;
    su.is_external = get_bool(buf)?;
    su.failover = get_bool(buf)?;
    su.admin_state = read_enum!(buf, AdminState);
    su.op_state = read_enum!(buf, OperationalState);
    su.presence_state = read_enum!(buf, PresenceState);
    su.hosted_by_node = get_str(buf)?;
    su.restart_count = get_u32(buf)?;
    su.rcsm_state = read_enum!(buf, SuRcsmState);
    su.escalation_history_state = read_enum!(buf, SuRcsmState);
    su.failover_count = get_u32(buf)?;
    su.current_instantiation_level = get_u32(buf)?;
    Ok(su)
}

pub fn serialize_component(comp: &Component) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_str(&mut buf, &comp.name);
    buf.put_u16_le(comp.category.bits());
    buf.put_u8(comp.capability as u8);
    put_str_vec(&mut buf, &comp.cs_types);
    buf.put_u32_le(comp.max_active_csi);
    buf.put_u32_le(comp.max_standby_csi);
    buf.put_u32_le(comp.instantiation_level);
    put_clc(&mut buf, &comp.instantiate);
    put_clc(&mut buf, &comp.terminate);
    put_clc(&mut buf, &comp.cleanup);
    buf.put_u8(comp.recommended_recovery as u8);
    put_bool(&mut buf, comp.disable_restart);
    buf.put_u8(comp.op_state as u8);
    buf.put_u8(comp.presence_state as u8);
    buf.put_u32_le(comp.restart_count);
    put_opt_str(&mut buf, comp.proxy_name.as_deref());
    put_bool(&mut buf, comp.error_suspected);
    buf.to_vec()
}

pub fn deserialize_component(su: SuId, buf: &mut Bytes) -> Result<Component, AegisError> {
    let name = get_str(buf)?;
    let mut comp = Component::new(su, &name);
    comp.category =
        CompCategory::from_bits(get_u16(buf)?).ok_or(AegisError::IncompleteData)?;
    comp.capability = read_enum!(buf, CompCapabilityModel);
    comp.cs_types = get_str_vec(buf)?;
    comp.max_active_csi = get_u32(buf)?;
    comp.max_standby_csi = get_u32(buf)?;
    comp.instantiation_level = get_u32(buf)?;
    comp.instantiate = get_clc(buf)?;
    comp.terminate = get_clc(buf)?;
    comp.cleanup = get_clc(buf)?;
    comp.recommended_recovery = read_enum!(buf, RecommendedRecovery);
    comp.disable_restart = get_bool(buf)?;
    comp.op_state = read_enum!(buf, OperationalState);
    comp.presence_state = read_enum!(buf, PresenceState);
    comp.restart_count = get_u32(buf)?;
    comp.proxy_name = get_opt_str(buf)?;
    comp.error_suspected = get_bool(buf)?;
    Ok(comp)
}

pub fn serialize_healthcheck(hc: &Healthcheck) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_str(&mut buf, &hc.key);
    buf.put_u64_le(hc.max_duration_ms);
    buf.put_u64_le(hc.period_ms);
    buf.put_u8(hc.invocation as u8);
    buf.put_u8(hc.recommended_recovery as u8);
    put_bool(&mut buf, hc.active);
    buf.to_vec()
}

pub fn deserialize_healthcheck(comp: CompId, buf: &mut Bytes) -> Result<Healthcheck, AegisError> {
    let key = get_str(buf)?;
    let mut hc = Healthcheck::new(comp, &key);
    hc.max_duration_ms = get_u64(buf)?;
    hc.period_ms = get_u64(buf)?;
    hc.invocation = read_enum!(buf, HealthcheckInvocation);
    hc.recommended_recovery = read_enum!(buf, RecommendedRecovery);
    hc.active = get_bool(buf)?;
    Ok(hc)
}

pub fn serialize_si(si: &ServiceInstance) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_str(&mut buf, &si.name);
    put_str(&mut buf, &si.protected_by_sg);
    buf.put_u32_le(si.rank);
    buf.put_u32_le(si.pref_active_assignments);
    buf.put_u32_le(si.pref_standby_assignments);
    buf.put_u8(si.admin_state as u8);
    put_str_vec(&mut buf, &si.depends_on);
    buf.to_vec()
}

pub fn deserialize_si(app: AppId, buf: &mut Bytes) -> Result<ServiceInstance, AegisError> {
    let name = get_str(buf)?;
    let mut si = ServiceInstance::new(app, &name);
    si.protected_by_sg = get_str(buf)?;
    si.rank = get_u32(buf)?;
    si.pref_active_assignments = get_u32(buf)?;
    si.pref_standby_assignments = get_u32(buf)?;
    si.admin_state = read_enum!(buf, AdminState);
    si.depends_on = get_str_vec(buf)?;
    Ok(si)
}

pub fn serialize_csi(csi: &Csi) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_str(&mut buf, &csi.name);
    put_str(&mut buf, &csi.cs_type);
    put_str_vec(&mut buf, &csi.dependencies);
    buf.to_vec()
}

pub fn deserialize_csi(si: SiId, buf: &mut Bytes) -> Result<Csi, AegisError> {
    let name = get_str(buf)?;
    let mut csi = Csi::new(si, &name);
    csi.cs_type = get_str(buf)?;
    csi.dependencies = get_str_vec(buf)?;
    Ok(csi)
}
