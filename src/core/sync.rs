// src/core/sync.rs

//! Cross-node model synchronization.
//!
//! A joining node receives the whole object graph as a stream of typed
//! chunks, one per entity, in a fixed parent-before-child order:
//! Cluster → Node* → (Application → (SG → SU* → (Comp → Healthcheck*)*)* →
//! (SI → SIAssignment* → (CSI → CSIAssignment* → CSIAttribute*)*)*)*.
//! The receiver keeps a cursor per nesting level, so chunks only need to
//! carry parent references where the parent is not the cursor (assignments).

use bytes::{BufMut, Bytes, BytesMut};
use strum_macros::FromRepr;
use tracing::debug;

use crate::core::errors::AegisError;
use crate::core::model::serialize::{
    deserialize_application, deserialize_cluster, deserialize_component, deserialize_csi,
    deserialize_healthcheck, deserialize_node, deserialize_sg, deserialize_si, deserialize_su,
    get_opt_ha, get_str, put_opt_ha, put_str, serialize_application, serialize_cluster,
    serialize_component, serialize_csi, serialize_healthcheck, serialize_node, serialize_sg,
    serialize_si, serialize_su,
};
use crate::core::model::{AppId, CompId, CsiId, Model, SgId, SiId, SuId};

/// Entity type of one sync chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum SyncObjectKind {
    Cluster = 1,
    Node = 2,
    Application = 3,
    ServiceGroup = 4,
    ServiceUnit = 5,
    Component = 6,
    Healthcheck = 7,
    ServiceInstance = 8,
    SiAssignment = 9,
    Csi = 10,
    CsiAssignment = 11,
    CsiAttribute = 12,
}

/// One serialized entity in the sync stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncChunk {
    pub kind: SyncObjectKind,
    pub payload: Vec<u8>,
}

/// Serializes the whole model in sync order.
pub fn snapshot(model: &Model) -> Vec<SyncChunk> {
    let mut chunks = Vec::new();
    let chunk = |kind, payload| SyncChunk { kind, payload };

    chunks.push(chunk(SyncObjectKind::Cluster, serialize_cluster(&model.cluster)));
    for node in &model.nodes {
        chunks.push(chunk(SyncObjectKind::Node, serialize_node(node)));
    }

    for app_id in model.apps() {
        chunks.push(chunk(
            SyncObjectKind::Application,
            serialize_application(model.app(app_id)),
        ));

        for sg_id in model.sgs_of_app(app_id) {
            chunks.push(chunk(SyncObjectKind::ServiceGroup, serialize_sg(model.sg(sg_id))));
            for su_id in model.sus_of_sg(sg_id) {
                chunks.push(chunk(SyncObjectKind::ServiceUnit, serialize_su(model.su(su_id))));
                for comp_id in model.comps_of_su(su_id) {
                    chunks.push(chunk(
                        SyncObjectKind::Component,
                        serialize_component(model.comp(comp_id)),
                    ));
                    for hc_id in model.healthchecks_of_comp(comp_id) {
                        chunks.push(chunk(
                            SyncObjectKind::Healthcheck,
                            serialize_healthcheck(&model.healthchecks[hc_id.index()]),
                        ));
                    }
                }
            }
        }

        for si_id in model.sis_of_app(app_id) {
            chunks.push(chunk(SyncObjectKind::ServiceInstance, serialize_si(model.si(si_id))));

            for sia_id in model.sias_of_si(si_id) {
                let sia = model.sia(sia_id).expect("enumerated assignment exists");
                let mut buf = BytesMut::new();
                put_str(&mut buf, &model.su_dn(sia.su));
                put_opt_ha(&mut buf, sia.ha_state);
                put_opt_ha(&mut buf, sia.requested_ha_state);
                chunks.push(chunk(SyncObjectKind::SiAssignment, buf.to_vec()));
            }

            for csi_id in model.csis_of_si(si_id) {
                chunks.push(chunk(SyncObjectKind::Csi, serialize_csi(model.csi(csi_id))));

                for csia_id in model.csias_of_csi(csi_id) {
                    let csia = model.csia(csia_id).expect("enumerated assignment exists");
                    let mut buf = BytesMut::new();
                    put_str(&mut buf, &model.comp_dn(csia.comp));
                    put_opt_ha(&mut buf, csia.ha_state);
                    put_opt_ha(&mut buf, csia.requested_ha_state);
                    chunks.push(chunk(SyncObjectKind::CsiAssignment, buf.to_vec()));
                }

                for (name, value) in &model.csi(csi_id).attributes {
                    let mut buf = BytesMut::new();
                    put_str(&mut buf, name);
                    put_str(&mut buf, value);
                    chunks.push(chunk(SyncObjectKind::CsiAttribute, buf.to_vec()));
                }
            }
        }
    }

    chunks
}

/// Rebuilds a model from a chunk stream. Chunks must arrive in snapshot
/// order; the cursor of each nesting level is the most recent parent chunk.
#[derive(Debug, Default)]
pub struct SyncReceiver {
    model: Option<Model>,
    app: Option<AppId>,
    sg: Option<SgId>,
    su: Option<SuId>,
    comp: Option<CompId>,
    si: Option<SiId>,
    csi: Option<CsiId>,
    chunks: usize,
}

impl SyncReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    fn model_mut(&mut self) -> Result<&mut Model, AegisError> {
        self.model
            .as_mut()
            .ok_or_else(|| AegisError::InvalidState("sync chunk before cluster chunk".into()))
    }

    fn cursor<T: Copy>(slot: Option<T>, what: &str) -> Result<T, AegisError> {
        slot.ok_or_else(|| AegisError::InvalidState(format!("sync chunk without {what} cursor")))
    }

    /// Consumes one chunk.
    pub fn apply(&mut self, chunk: &SyncChunk) -> Result<(), AegisError> {
        let mut buf = Bytes::copy_from_slice(&chunk.payload);
        self.chunks += 1;

        match chunk.kind {
            SyncObjectKind::Cluster => {
                let cluster = deserialize_cluster(&mut buf)?;
                let mut model = Model::new(&cluster.name);
                model.cluster = cluster;
                self.model = Some(model);
            }
            SyncObjectKind::Node => {
                let node = deserialize_node(&mut buf)?;
                self.model_mut()?.nodes.push(node);
            }
            SyncObjectKind::Application => {
                let app = deserialize_application(&mut buf)?;
                let model = self.model_mut()?;
                model.apps.push(app);
                self.app = Some(AppId((model.apps.len() - 1) as u32));
            }
            SyncObjectKind::ServiceGroup => {
                let app = Self::cursor(self.app, "application")?;
                let sg = deserialize_sg(app, &mut buf)?;
                let model = self.model_mut()?;
                model.sgs.push(sg);
                self.sg = Some(SgId((model.sgs.len() - 1) as u32));
            }
            SyncObjectKind::ServiceUnit => {
                let sg = Self::cursor(self.sg, "service group")?;
                let su = deserialize_su(sg, &mut buf)?;
                let model = self.model_mut()?;
                model.sus.push(su);
                self.su = Some(SuId((model.sus.len() - 1) as u32));
            }
            SyncObjectKind::Component => {
                let su = Self::cursor(self.su, "service unit")?;
                let comp = deserialize_component(su, &mut buf)?;
                let model = self.model_mut()?;
                model.comps.push(comp);
                self.comp = Some(CompId((model.comps.len() - 1) as u32));
            }
            SyncObjectKind::Healthcheck => {
                let comp = Self::cursor(self.comp, "component")?;
                let hc = deserialize_healthcheck(comp, &mut buf)?;
                self.model_mut()?.healthchecks.push(hc);
            }
            SyncObjectKind::ServiceInstance => {
                let app = Self::cursor(self.app, "application")?;
                let si = deserialize_si(app, &mut buf)?;
                let model = self.model_mut()?;
                model.sis.push(si);
                self.si = Some(SiId((model.sis.len() - 1) as u32));
            }
            SyncObjectKind::SiAssignment => {
                let si = Self::cursor(self.si, "service instance")?;
                let su_dn = get_str(&mut buf)?;
                let ha = get_opt_ha(&mut buf)?;
                let requested = get_opt_ha(&mut buf)?;
                let model = self.model_mut()?;
                let su = model
                    .find_su_by_dn(&su_dn)
                    .ok_or_else(|| AegisError::NotFound(su_dn.clone()))?;
                model.sias.insert(crate::core::model::SiAssignment {
                    si,
                    su,
                    ha_state: ha,
                    requested_ha_state: requested,
                    pending_callback: None,
                });
            }
            SyncObjectKind::Csi => {
                let si = Self::cursor(self.si, "service instance")?;
                let csi = deserialize_csi(si, &mut buf)?;
                let model = self.model_mut()?;
                model.csis.push(csi);
                self.csi = Some(CsiId((model.csis.len() - 1) as u32));
            }
            SyncObjectKind::CsiAssignment => {
                let csi = Self::cursor(self.csi, "CSI")?;
                let comp_dn = get_str(&mut buf)?;
                let ha = get_opt_ha(&mut buf)?;
                let requested = get_opt_ha(&mut buf)?;
                let model = self.model_mut()?;
                let comp = model
                    .find_comp_by_dn(&comp_dn)
                    .ok_or_else(|| AegisError::NotFound(comp_dn.clone()))?;
                let si = model.csi(csi).si;
                let su = model.comp(comp).su;
                let sia = model
                    .sia_of_si_su(si, su)
                    .ok_or_else(|| AegisError::NotFound(format!("SI assignment for {comp_dn}")))?;
                model.csias.insert(crate::core::model::CsiAssignment {
                    csi,
                    comp,
                    si_assignment: sia,
                    ha_state: ha,
                    requested_ha_state: requested,
                });
            }
            SyncObjectKind::CsiAttribute => {
                let csi = Self::cursor(self.csi, "CSI")?;
                let name = get_str(&mut buf)?;
                let value = get_str(&mut buf)?;
                self.model_mut()?
                    .csis[csi.index()]
                    .attributes
                    .push((name, value));
            }
        }
        Ok(())
    }

    /// Finishes the sync and hands over the rebuilt model.
    pub fn finish(self) -> Result<Model, AegisError> {
        debug!("Sync complete after {} chunks", self.chunks);
        self.model
            .ok_or_else(|| AegisError::InvalidState("sync finished without cluster chunk".into()))
    }
}

/// Encodes a snapshot as the payload framing used inside SYNC_DATA messages.
pub fn encode_chunk(chunk: &SyncChunk) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(chunk.kind as u8);
    buf.put_u32_le(chunk.payload.len() as u32);
    buf.put_slice(&chunk.payload);
    buf.to_vec()
}
