// src/core/model/mod.rs

//! The availability object model: arenas, typed indices, DN handling and the
//! derived-state queries the state machines are written against.

pub mod entities;
pub mod serialize;
pub mod types;

use tracing::warn;

use crate::core::errors::AegisError;
pub use entities::{
    Application, ClcCommand, Cluster, Component, Csi, CsiAssignment, Healthcheck, Node,
    RecoveryScope, ServiceGroup, ServiceInstance, ServiceUnit, SiAssignment,
};
use types::{AssignmentState, HaState, OperationalState, PresenceState, ReadinessState};

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

entity_id!(
    /// Index of a node in `Model::nodes`.
    NodeId
);
entity_id!(
    /// Index of an application in `Model::apps`.
    AppId
);
entity_id!(
    /// Index of a service group in `Model::sgs`.
    SgId
);
entity_id!(
    /// Index of a service unit in `Model::sus`.
    SuId
);
entity_id!(
    /// Index of a component in `Model::comps`.
    CompId
);
entity_id!(
    /// Index of a healthcheck in `Model::healthchecks`.
    HcId
);
entity_id!(
    /// Index of a service instance in `Model::sis`.
    SiId
);
entity_id!(
    /// Index of a CSI in `Model::csis`.
    CsiId
);
entity_id!(
    /// Slot of an SI assignment in `Model::sias`.
    SiaId
);
entity_id!(
    /// Slot of a CSI assignment in `Model::csias`.
    CsiaId
);

/// Slot arena for entities with a dynamic lifetime (assignments). Slots are
/// reused; ids stay stable for the lifetime of the occupant.
#[derive(Debug, Clone, Default)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn insert(&mut self, value: T) -> u32 {
        if let Some(idx) = self.slots.iter().position(Option::is_none) {
            self.slots[idx] = Some(value);
            idx as u32
        } else {
            self.slots.push(Some(value));
            (self.slots.len() - 1) as u32
        }
    }

    pub fn remove(&mut self, id: u32) -> Option<T> {
        self.slots.get_mut(id as usize).and_then(Option::take)
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.slots.get_mut(id as usize).and_then(Option::as_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (i as u32, v)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The whole object graph. A single exclusively-owned tree; every handler
/// receives `&mut Model` through the engine, so no interior mutability or
/// locking is needed.
#[derive(Debug, Clone)]
pub struct Model {
    pub cluster: Cluster,
    pub nodes: Vec<Node>,
    pub apps: Vec<Application>,
    pub sgs: Vec<ServiceGroup>,
    pub sus: Vec<ServiceUnit>,
    pub comps: Vec<Component>,
    pub healthchecks: Vec<Healthcheck>,
    pub sis: Vec<ServiceInstance>,
    pub csis: Vec<Csi>,
    pub sias: Arena<SiAssignment>,
    pub csias: Arena<CsiAssignment>,
}

impl Model {
    pub fn new(cluster_name: &str) -> Self {
        Self {
            cluster: Cluster::new(cluster_name),
            nodes: Vec::new(),
            apps: Vec::new(),
            sgs: Vec::new(),
            sus: Vec::new(),
            comps: Vec::new(),
            healthchecks: Vec::new(),
            sis: Vec::new(),
            csis: Vec::new(),
            sias: Arena::new(),
            csias: Arena::new(),
        }
    }

    // --- Constructors: attach a defaulted entity to its parent ---

    pub fn new_node(&mut self, name: &str) -> Result<NodeId, AegisError> {
        if self.find_node(name).is_some() {
            return Err(AegisError::DuplicateName(name.to_string()));
        }
        self.nodes.push(Node::new(name));
        Ok(NodeId((self.nodes.len() - 1) as u32))
    }

    pub fn new_application(&mut self, name: &str) -> Result<AppId, AegisError> {
        if self.find_application(name).is_some() {
            return Err(AegisError::DuplicateName(name.to_string()));
        }
        self.apps.push(Application::new(name));
        Ok(AppId((self.apps.len() - 1) as u32))
    }

    pub fn new_sg(&mut self, app: AppId, name: &str) -> Result<SgId, AegisError> {
        if self.find_sg(app, name).is_some() {
            return Err(AegisError::DuplicateName(name.to_string()));
        }
        self.sgs.push(ServiceGroup::new(app, name));
        Ok(SgId((self.sgs.len() - 1) as u32))
    }

    pub fn new_su(&mut self, sg: SgId, name: &str) -> Result<SuId, AegisError> {
        if self.find_su(sg, name).is_some() {
            return Err(AegisError::DuplicateName(name.to_string()));
        }
        self.sus.push(ServiceUnit::new(sg, name));
        Ok(SuId((self.sus.len() - 1) as u32))
    }

    pub fn new_component(&mut self, su: SuId, name: &str) -> Result<CompId, AegisError> {
        if self.find_component(su, name).is_some() {
            return Err(AegisError::DuplicateName(name.to_string()));
        }
        self.comps.push(Component::new(su, name));
        Ok(CompId((self.comps.len() - 1) as u32))
    }

    pub fn new_healthcheck(&mut self, comp: CompId, key: &str) -> Result<HcId, AegisError> {
        if self.find_healthcheck(comp, key).is_some() {
            return Err(AegisError::DuplicateName(key.to_string()));
        }
        self.healthchecks.push(Healthcheck::new(comp, key));
        Ok(HcId((self.healthchecks.len() - 1) as u32))
    }

    pub fn new_si(&mut self, app: AppId, name: &str) -> Result<SiId, AegisError> {
        if self.find_si(app, name).is_some() {
            return Err(AegisError::DuplicateName(name.to_string()));
        }
        self.sis.push(ServiceInstance::new(app, name));
        Ok(SiId((self.sis.len() - 1) as u32))
    }

    pub fn new_csi(&mut self, si: SiId, name: &str) -> Result<CsiId, AegisError> {
        if self.find_csi(si, name).is_some() {
            return Err(AegisError::DuplicateName(name.to_string()));
        }
        self.csis.push(Csi::new(si, name));
        Ok(CsiId((self.csis.len() - 1) as u32))
    }

    // --- Plain accessors ---

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn app(&self, id: AppId) -> &Application {
        &self.apps[id.index()]
    }

    pub fn app_mut(&mut self, id: AppId) -> &mut Application {
        &mut self.apps[id.index()]
    }

    pub fn sg(&self, id: SgId) -> &ServiceGroup {
        &self.sgs[id.index()]
    }

    pub fn sg_mut(&mut self, id: SgId) -> &mut ServiceGroup {
        &mut self.sgs[id.index()]
    }

    pub fn su(&self, id: SuId) -> &ServiceUnit {
        &self.sus[id.index()]
    }

    pub fn su_mut(&mut self, id: SuId) -> &mut ServiceUnit {
        &mut self.sus[id.index()]
    }

    pub fn comp(&self, id: CompId) -> &Component {
        &self.comps[id.index()]
    }

    pub fn comp_mut(&mut self, id: CompId) -> &mut Component {
        &mut self.comps[id.index()]
    }

    pub fn si(&self, id: SiId) -> &ServiceInstance {
        &self.sis[id.index()]
    }

    pub fn si_mut(&mut self, id: SiId) -> &mut ServiceInstance {
        &mut self.sis[id.index()]
    }

    pub fn csi(&self, id: CsiId) -> &Csi {
        &self.csis[id.index()]
    }

    pub fn sia(&self, id: SiaId) -> Option<&SiAssignment> {
        self.sias.get(id.0)
    }

    pub fn sia_mut(&mut self, id: SiaId) -> Option<&mut SiAssignment> {
        self.sias.get_mut(id.0)
    }

    pub fn csia(&self, id: CsiaId) -> Option<&CsiAssignment> {
        self.csias.get(id.0)
    }

    pub fn csia_mut(&mut self, id: CsiaId) -> Option<&mut CsiAssignment> {
        self.csias.get_mut(id.0)
    }

    // --- Name lookup (linear search by RDN, "not found" as None) ---

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name == name)
            .map(|i| NodeId(i as u32))
    }

    pub fn find_node_by_nodeid(&self, node_id: u32) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.node_id == node_id)
            .map(|i| NodeId(i as u32))
    }

    pub fn find_node_by_clm_name(&self, clm_name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.clm_name == clm_name)
            .map(|i| NodeId(i as u32))
    }

    pub fn find_application(&self, name: &str) -> Option<AppId> {
        self.apps
            .iter()
            .position(|a| a.name == name)
            .map(|i| AppId(i as u32))
    }

    pub fn find_sg(&self, app: AppId, name: &str) -> Option<SgId> {
        self.sgs
            .iter()
            .position(|s| s.app == app && s.name == name)
            .map(|i| SgId(i as u32))
    }

    pub fn find_su(&self, sg: SgId, name: &str) -> Option<SuId> {
        self.sus
            .iter()
            .position(|s| s.sg == sg && s.name == name)
            .map(|i| SuId(i as u32))
    }

    pub fn find_component(&self, su: SuId, name: &str) -> Option<CompId> {
        self.comps
            .iter()
            .position(|c| c.su == su && c.name == name)
            .map(|i| CompId(i as u32))
    }

    pub fn find_healthcheck(&self, comp: CompId, key: &str) -> Option<HcId> {
        self.healthchecks
            .iter()
            .position(|h| h.comp == comp && h.key == key)
            .map(|i| HcId(i as u32))
    }

    pub fn find_si(&self, app: AppId, name: &str) -> Option<SiId> {
        self.sis
            .iter()
            .position(|s| s.app == app && s.name == name)
            .map(|i| SiId(i as u32))
    }

    pub fn find_csi(&self, si: SiId, name: &str) -> Option<CsiId> {
        self.csis
            .iter()
            .position(|c| c.si == si && c.name == name)
            .map(|i| CsiId(i as u32))
    }

    // --- Distinguished names ---

    pub fn node_dn(&self, id: NodeId) -> String {
        format!("safAmfNode={}", self.node(id).name)
    }

    pub fn app_dn(&self, id: AppId) -> String {
        format!("safApp={}", self.app(id).name)
    }

    pub fn sg_dn(&self, id: SgId) -> String {
        let sg = self.sg(id);
        format!("safSg={},safApp={}", sg.name, self.app(sg.app).name)
    }

    pub fn su_dn(&self, id: SuId) -> String {
        let su = self.su(id);
        format!("safSu={},{}", su.name, self.sg_dn(su.sg))
    }

    pub fn comp_dn(&self, id: CompId) -> String {
        let comp = self.comp(id);
        format!("safComp={},{}", comp.name, self.su_dn(comp.su))
    }

    pub fn si_dn(&self, id: SiId) -> String {
        let si = self.si(id);
        format!("safSi={},safApp={}", si.name, self.app(si.app).name)
    }

    pub fn csi_dn(&self, id: CsiId) -> String {
        let csi = self.csi(id);
        format!("safCsi={},{}", csi.name, self.si_dn(csi.si))
    }

    pub fn find_comp_by_dn(&self, dn: &str) -> Option<CompId> {
        (0..self.comps.len())
            .map(|i| CompId(i as u32))
            .find(|&id| self.comp_dn(id) == dn)
    }

    pub fn find_su_by_dn(&self, dn: &str) -> Option<SuId> {
        (0..self.sus.len())
            .map(|i| SuId(i as u32))
            .find(|&id| self.su_dn(id) == dn)
    }

    pub fn find_si_by_dn(&self, dn: &str) -> Option<SiId> {
        (0..self.sis.len())
            .map(|i| SiId(i as u32))
            .find(|&id| self.si_dn(id) == dn)
    }

    pub fn find_csi_by_dn(&self, dn: &str) -> Option<CsiId> {
        (0..self.csis.len())
            .map(|i| CsiId(i as u32))
            .find(|&id| self.csi_dn(id) == dn)
    }

    // --- Owned-child enumeration ---

    pub fn apps(&self) -> Vec<AppId> {
        (0..self.apps.len()).map(|i| AppId(i as u32)).collect()
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        (0..self.nodes.len()).map(|i| NodeId(i as u32)).collect()
    }

    pub fn all_sgs(&self) -> Vec<SgId> {
        (0..self.sgs.len()).map(|i| SgId(i as u32)).collect()
    }

    pub fn sgs_of_app(&self, app: AppId) -> Vec<SgId> {
        (0..self.sgs.len())
            .map(|i| SgId(i as u32))
            .filter(|&id| self.sg(id).app == app)
            .collect()
    }

    pub fn sus_of_sg(&self, sg: SgId) -> Vec<SuId> {
        (0..self.sus.len())
            .map(|i| SuId(i as u32))
            .filter(|&id| self.su(id).sg == sg)
            .collect()
    }

    pub fn comps_of_su(&self, su: SuId) -> Vec<CompId> {
        (0..self.comps.len())
            .map(|i| CompId(i as u32))
            .filter(|&id| self.comp(id).su == su)
            .collect()
    }

    pub fn healthchecks_of_comp(&self, comp: CompId) -> Vec<HcId> {
        (0..self.healthchecks.len())
            .map(|i| HcId(i as u32))
            .filter(|&id| self.healthchecks[id.index()].comp == comp)
            .collect()
    }

    pub fn sis_of_app(&self, app: AppId) -> Vec<SiId> {
        (0..self.sis.len())
            .map(|i| SiId(i as u32))
            .filter(|&id| self.si(id).app == app)
            .collect()
    }

    pub fn all_sis(&self) -> Vec<SiId> {
        (0..self.sis.len()).map(|i| SiId(i as u32)).collect()
    }

    /// The service instances protected by a service group: same application,
    /// `protected_by_sg` naming the group.
    pub fn sis_protected_by(&self, sg: SgId) -> Vec<SiId> {
        let sg_ref = self.sg(sg);
        (0..self.sis.len())
            .map(|i| SiId(i as u32))
            .filter(|&id| {
                let si = self.si(id);
                si.app == sg_ref.app && si.protected_by_sg == sg_ref.name
            })
            .collect()
    }

    pub fn csis_of_si(&self, si: SiId) -> Vec<CsiId> {
        (0..self.csis.len())
            .map(|i| CsiId(i as u32))
            .filter(|&id| self.csi(id).si == si)
            .collect()
    }

    /// Service instances that name `si` in their dependency list.
    pub fn dependents_of_si(&self, si: SiId) -> Vec<SiId> {
        let name = self.si(si).name.clone();
        (0..self.sis.len())
            .map(|i| SiId(i as u32))
            .filter(|&id| id != si && self.si(id).depends_on.iter().any(|d| d == &name))
            .collect()
    }

    // --- Assignment enumeration ---

    pub fn sias_of_si(&self, si: SiId) -> Vec<SiaId> {
        self.sias
            .iter()
            .filter(|(_, a)| a.si == si)
            .map(|(id, _)| SiaId(id))
            .collect()
    }

    pub fn sias_of_su(&self, su: SuId) -> Vec<SiaId> {
        self.sias
            .iter()
            .filter(|(_, a)| a.su == su)
            .map(|(id, _)| SiaId(id))
            .collect()
    }

    pub fn sia_of_si_su(&self, si: SiId, su: SuId) -> Option<SiaId> {
        self.sias
            .iter()
            .find(|(_, a)| a.si == si && a.su == su)
            .map(|(id, _)| SiaId(id))
    }

    pub fn csias_of_csi(&self, csi: CsiId) -> Vec<CsiaId> {
        self.csias
            .iter()
            .filter(|(_, a)| a.csi == csi)
            .map(|(id, _)| CsiaId(id))
            .collect()
    }

    pub fn csias_of_comp(&self, comp: CompId) -> Vec<CsiaId> {
        self.csias
            .iter()
            .filter(|(_, a)| a.comp == comp)
            .map(|(id, _)| CsiaId(id))
            .collect()
    }

    pub fn csias_of_sia(&self, sia: SiaId) -> Vec<CsiaId> {
        self.csias
            .iter()
            .filter(|(_, a)| a.si_assignment == sia)
            .map(|(id, _)| CsiaId(id))
            .collect()
    }

    // --- Derived counters and states ---

    pub fn si_curr_active_count(&self, si: SiId) -> u32 {
        self.sias
            .iter()
            .filter(|(_, a)| a.si == si && a.ha_state == Some(HaState::Active))
            .count() as u32
    }

    pub fn si_curr_standby_count(&self, si: SiId) -> u32 {
        self.sias
            .iter()
            .filter(|(_, a)| a.si == si && a.ha_state == Some(HaState::Standby))
            .count() as u32
    }

    pub fn si_req_active_count(&self, si: SiId) -> u32 {
        self.sias
            .iter()
            .filter(|(_, a)| a.si == si && a.requested_ha_state == Some(HaState::Active))
            .count() as u32
    }

    pub fn si_req_standby_count(&self, si: SiId) -> u32 {
        self.sias
            .iter()
            .filter(|(_, a)| a.si == si && a.requested_ha_state == Some(HaState::Standby))
            .count() as u32
    }

    pub fn si_assignment_state(&self, si: SiId) -> AssignmentState {
        let si_ref = self.si(si);
        let active = self.si_curr_active_count(si);
        let standby = self.si_curr_standby_count(si);
        if active == si_ref.pref_active_assignments && standby == si_ref.pref_standby_assignments {
            AssignmentState::FullyAssigned
        } else if active == 0 {
            AssignmentState::Unassigned
        } else {
            AssignmentState::PartiallyAssigned
        }
    }

    pub fn su_curr_active_si_count(&self, su: SuId) -> u32 {
        self.sias
            .iter()
            .filter(|(_, a)| a.su == su && a.ha_state == Some(HaState::Active))
            .count() as u32
    }

    pub fn su_curr_standby_si_count(&self, su: SuId) -> u32 {
        self.sias
            .iter()
            .filter(|(_, a)| a.su == su && a.ha_state == Some(HaState::Standby))
            .count() as u32
    }

    /// Runtime-derived readiness of a service unit.
    pub fn su_readiness(&self, su: SuId) -> ReadinessState {
        let su_ref = self.su(su);
        if su_ref.op_state == OperationalState::Enabled {
            if matches!(
                su_ref.presence_state,
                PresenceState::Instantiated | PresenceState::Restarting
            ) {
                ReadinessState::InService
            } else {
                ReadinessState::Stopping
            }
        } else {
            ReadinessState::OutOfService
        }
    }

    /// The node hosting a service unit, resolved by name. Hosting is part of
    /// the static configuration, so failure to resolve is a model defect.
    pub fn node_of_su(&self, su: SuId) -> Result<NodeId, AegisError> {
        let name = &self.su(su).hosted_by_node;
        self.find_node(name)
            .ok_or_else(|| AegisError::NotFound(format!("hosting node '{name}'")))
    }

    /// Whether a service unit is hosted on the given node.
    pub fn su_hosted_on(&self, su: SuId, node: NodeId) -> bool {
        self.su(su).hosted_by_node == self.node(node).name
    }

    /// Service groups that host at least one service unit on `node`.
    pub fn sgs_with_su_on_node(&self, node: NodeId) -> Vec<SgId> {
        self.all_sgs()
            .into_iter()
            .filter(|&sg| {
                self.sus_of_sg(sg)
                    .into_iter()
                    .any(|su| self.su_hosted_on(su, node))
            })
            .collect()
    }

    /// Creates an SI assignment together with the CSI assignments of every
    /// component in the service unit whose CS-type set matches.
    pub fn create_si_assignment(
        &mut self,
        su: SuId,
        si: SiId,
        ha_state: HaState,
    ) -> SiaId {
        let sia = SiaId(self.sias.insert(SiAssignment {
            si,
            su,
            ha_state: None,
            requested_ha_state: Some(ha_state),
            pending_callback: None,
        }));

        for comp in self.comps_of_su(su) {
            let cs_types = self.comp(comp).cs_types.clone();
            if cs_types.is_empty() {
                warn!("No CS types configured for component '{}'", self.comp_dn(comp));
                continue;
            }
            for cs_type in &cs_types {
                let mut assignments = 0;
                for csi in self.csis_of_si(si) {
                    if &self.csi(csi).cs_type == cs_type {
                        self.csias.insert(CsiAssignment {
                            csi,
                            comp,
                            si_assignment: sia,
                            ha_state: None,
                            requested_ha_state: Some(ha_state),
                        });
                        assignments += 1;
                    }
                }
                if assignments == 0 {
                    warn!("No CSIs of type '{}' configured for '{}'", cs_type, self.si_dn(si));
                }
            }
        }
        sia
    }

    /// Unlinks and destroys every CSI assignment of `csi` whose component
    /// belongs to `su`.
    pub fn delete_csi_assignments(&mut self, csi: CsiId, su: SuId) {
        let doomed: Vec<u32> = self
            .csias
            .iter()
            .filter(|(_, a)| a.csi == csi && self.comp(a.comp).su == su)
            .map(|(id, _)| id)
            .collect();
        for id in doomed {
            self.csias.remove(id);
        }
    }

    /// Removes one SI assignment slot.
    pub fn delete_si_assignment(&mut self, sia: SiaId) {
        self.sias.remove(sia.0);
    }
}
