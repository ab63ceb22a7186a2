// src/core/model/entities.rs

//! The entity structs of the availability model.
//!
//! Entities are stored in per-type arenas (see `model::Model`) and refer to
//! each other through typed indices, never through pointers. Parent links are
//! indices; child sets are recovered by scanning the owning arena, which is
//! cheap at model scale and keeps ownership trivially single-rooted.

use super::{AppId, CompId, CsiId, NodeId, SgId, SiaId, SuId};
use crate::core::events::{AppDeferredEvent, DeferredFifo, SgDeferredEvent, SuDeferredEvent};
use crate::core::model::types::{
    AdminState, AppAcsmState, ClusterAcsmState, CompCapabilityModel, CompCategory,
    CompLifecycleClass, HaState, HealthcheckInvocation, NodeAcsmState, OperationalState,
    PresenceState, RecommendedRecovery, RecoveryType, RedundancyModel, SgAcsmState, SuRcsmState,
};
use crate::core::timer::TimerHandle;

/// The singleton root of the model. Lives for the whole process (there is
/// exactly one per engine, created at configuration load).
#[derive(Debug, Clone)]
pub struct Cluster {
    pub name: String,
    /// Milliseconds granted to initial application start before workload is
    /// assigned regardless.
    pub startup_timeout_ms: u64,
    pub admin_state: AdminState,
    pub acsm_state: ClusterAcsmState,
    /// Transient, zeroed on deserialize.
    pub startup_timer: Option<TimerHandle>,
}

impl Cluster {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            startup_timeout_ms: 10_000,
            admin_state: AdminState::Unlocked,
            acsm_state: ClusterAcsmState::Uninstantiated,
            startup_timer: None,
        }
    }
}

/// One cluster node.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    /// Name of the hosting membership-layer node.
    pub clm_name: String,
    /// Membership node id; zeroed while the node is out of the cluster.
    pub node_id: u32,
    pub admin_state: AdminState,
    pub op_state: OperationalState,
    pub acsm_state: NodeAcsmState,
    pub history_state: NodeAcsmState,
    pub auto_repair: bool,
    /// Milliseconds; negative means not configured.
    pub su_failover_prob_ms: i64,
    /// SU failovers tolerated before the whole node is failed over.
    pub su_failover_max: u32,
}

impl Node {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            clm_name: name.to_string(),
            node_id: 0,
            admin_state: AdminState::Unlocked,
            op_state: OperationalState::Enabled,
            acsm_state: NodeAcsmState::IdleLevel0,
            history_state: NodeAcsmState::IdleLevel0,
            auto_repair: true,
            su_failover_prob_ms: -1,
            su_failover_max: u32::MAX,
        }
    }
}

/// An application: a set of service groups plus the service instances they
/// protect.
#[derive(Debug, Clone)]
pub struct Application {
    pub name: String,
    pub admin_state: AdminState,
    pub acsm_state: AppAcsmState,
    /// The node a node-scoped start/assign was issued for; `None` during
    /// cluster-wide operations.
    pub node_to_start: Option<NodeId>,
    pub deferred_events: DeferredFifo<AppDeferredEvent>,
}

impl Application {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            admin_state: AdminState::Unlocked,
            acsm_state: AppAcsmState::Uninstantiated,
            node_to_start: None,
            deferred_events: DeferredFifo::default(),
        }
    }
}

/// The set of service units and service instances a recovery action is
/// currently operating on. Reset by replacement with the default value when
/// the owning service group returns to idle.
#[derive(Debug, Clone, Default)]
pub struct RecoveryScope {
    pub recovery_type: Option<RecoveryType>,
    pub sus: Vec<SuId>,
    pub sis: Vec<super::SiId>,
    pub comp: Option<CompId>,
    pub node: Option<NodeId>,
}

impl RecoveryScope {
    pub fn is_empty(&self) -> bool {
        self.recovery_type.is_none() && self.sus.is_empty() && self.sis.is_empty()
    }
}

/// A service group: the redundancy unit that spreads service instances over
/// its member service units.
#[derive(Debug, Clone)]
pub struct ServiceGroup {
    pub name: String,
    pub app: AppId,
    pub redundancy_model: RedundancyModel,
    pub auto_adjust: bool,
    pub pref_active_sus: u32,
    pub pref_standby_sus: u32,
    pub pref_inservice_sus: u32,
    pub pref_assigned_sus: u32,
    pub max_active_sis_per_su: u32,
    pub max_standby_sis_per_su: u32,
    pub comp_restart_prob_ms: i64,
    pub comp_restart_max: u32,
    pub su_restart_prob_ms: i64,
    pub su_restart_max: u32,
    pub auto_adjust_prob_ms: i64,
    pub auto_repair: bool,
    pub admin_state: AdminState,
    pub acsm_state: SgAcsmState,
    pub recovery_scope: RecoveryScope,
    pub node_to_start: Option<NodeId>,
    pub deferred_events: DeferredFifo<SgDeferredEvent>,
}

impl ServiceGroup {
    pub fn new(app: AppId, name: &str) -> Self {
        Self {
            name: name.to_string(),
            app,
            redundancy_model: RedundancyModel::NPlusM,
            auto_adjust: false,
            pref_active_sus: 1,
            pref_standby_sus: 1,
            pref_inservice_sus: u32::MAX,
            pref_assigned_sus: u32::MAX,
            max_active_sis_per_su: 1,
            max_standby_sis_per_su: 1,
            comp_restart_prob_ms: -1,
            comp_restart_max: u32::MAX,
            su_restart_prob_ms: -1,
            su_restart_max: u32::MAX,
            auto_adjust_prob_ms: -1,
            auto_repair: true,
            admin_state: AdminState::Unlocked,
            acsm_state: SgAcsmState::Idle,
            recovery_scope: RecoveryScope::default(),
            node_to_start: None,
            deferred_events: DeferredFifo::default(),
        }
    }
}

/// A service unit: the components that are instantiated, assigned and failed
/// over as one unit on one node.
#[derive(Debug, Clone)]
pub struct ServiceUnit {
    pub name: String,
    pub sg: SgId,
    pub rank: u32,
    pub is_external: bool,
    /// Whether component failovers may be escalated to an SU failover.
    pub failover: bool,
    pub admin_state: AdminState,
    pub op_state: OperationalState,
    pub presence_state: PresenceState,
    /// Name of the hosting node (resolved against the node arena on demand).
    pub hosted_by_node: String,
    pub restart_count: u32,
    pub rcsm_state: SuRcsmState,
    pub escalation_history_state: SuRcsmState,
    pub failover_count: u32,
    pub current_instantiation_level: u32,
    pub deferred_events: DeferredFifo<SuDeferredEvent>,
}

impl ServiceUnit {
    pub fn new(sg: SgId, name: &str) -> Self {
        Self {
            name: name.to_string(),
            sg,
            rank: 0,
            is_external: false,
            failover: true,
            admin_state: AdminState::Unlocked,
            op_state: OperationalState::Disabled,
            presence_state: PresenceState::Uninstantiated,
            hosted_by_node: String::new(),
            restart_count: 0,
            rcsm_state: SuRcsmState::IdleLevel0,
            escalation_history_state: SuRcsmState::IdleLevel0,
            failover_count: 0,
            current_instantiation_level: 0,
            deferred_events: DeferredFifo::default(),
        }
    }
}

/// One life-cycle command of a component (instantiate, terminate or cleanup).
#[derive(Debug, Clone, Default)]
pub struct ClcCommand {
    pub cmd: String,
    pub args: Vec<String>,
    pub timeout_ms: u64,
}

/// A component: one supervised process (or proxied resource).
#[derive(Debug, Clone)]
pub struct Component {
    pub name: String,
    pub su: SuId,
    pub category: CompCategory,
    pub capability: CompCapabilityModel,
    /// CS types this component can be assigned workload of.
    pub cs_types: Vec<String>,
    pub max_active_csi: u32,
    pub max_standby_csi: u32,
    pub instantiation_level: u32,
    pub instantiate: ClcCommand,
    pub terminate: ClcCommand,
    pub cleanup: ClcCommand,
    pub recommended_recovery: RecommendedRecovery,
    pub disable_restart: bool,
    pub op_state: OperationalState,
    pub presence_state: PresenceState,
    pub restart_count: u32,
    /// DN of the proxy currently fronting this component, if proxied.
    pub proxy_name: Option<String>,
    pub error_suspected: bool,
    /// Whether a library session is currently registered for this component.
    pub registered: bool,
    /// Transient timer handles, zeroed on deserialize.
    pub instantiate_timer: Option<TimerHandle>,
    pub cleanup_timer: Option<TimerHandle>,
}

impl Component {
    pub fn new(su: SuId, name: &str) -> Self {
        Self {
            name: name.to_string(),
            su,
            category: CompCategory::default(),
            capability: CompCapabilityModel::default(),
            cs_types: Vec::new(),
            max_active_csi: 1,
            max_standby_csi: 1,
            instantiation_level: 1,
            instantiate: ClcCommand {
                timeout_ms: 10_000,
                ..ClcCommand::default()
            },
            terminate: ClcCommand {
                timeout_ms: 10_000,
                ..ClcCommand::default()
            },
            cleanup: ClcCommand {
                timeout_ms: 10_000,
                ..ClcCommand::default()
            },
            recommended_recovery: RecommendedRecovery::NoRecommendation,
            disable_restart: false,
            op_state: OperationalState::Disabled,
            presence_state: PresenceState::Uninstantiated,
            restart_count: 0,
            proxy_name: None,
            error_suspected: false,
            registered: false,
            instantiate_timer: None,
            cleanup_timer: None,
        }
    }

    /// Lifecycle class derived from the category bits.
    pub fn lifecycle_class(&self) -> CompLifecycleClass {
        if self.category.contains(CompCategory::SA_AWARE) {
            CompLifecycleClass::SaAware
        } else if self.category.contains(CompCategory::PROXIED) {
            if self.capability == CompCapabilityModel::NonPreInstantiable {
                CompLifecycleClass::ProxiedNonPreInstantiable
            } else {
                CompLifecycleClass::ProxiedPreInstantiable
            }
        } else {
            CompLifecycleClass::NonProxiedNonSaAware
        }
    }

    /// Only sa-aware components have an IPC callback path.
    pub fn is_sa_aware(&self) -> bool {
        self.category.contains(CompCategory::SA_AWARE)
    }
}

/// One configured healthcheck of a component.
#[derive(Debug, Clone)]
pub struct Healthcheck {
    pub comp: CompId,
    pub key: String,
    pub max_duration_ms: u64,
    pub period_ms: u64,
    pub invocation: HealthcheckInvocation,
    pub recommended_recovery: RecommendedRecovery,
    pub active: bool,
    /// Transient timer handles, zeroed on deserialize.
    pub period_timer: Option<TimerHandle>,
    pub duration_timer: Option<TimerHandle>,
}

impl Healthcheck {
    pub fn new(comp: CompId, key: &str) -> Self {
        Self {
            comp,
            key: key.to_string(),
            max_duration_ms: 1_000,
            period_ms: 5_000,
            invocation: HealthcheckInvocation::AmfInvoked,
            recommended_recovery: RecommendedRecovery::ComponentRestart,
            active: false,
            period_timer: None,
            duration_timer: None,
        }
    }
}

/// A service instance: one unit of workload, protected by a service group.
#[derive(Debug, Clone)]
pub struct ServiceInstance {
    pub name: String,
    pub app: AppId,
    /// Name of the protecting service group within the same application.
    pub protected_by_sg: String,
    pub rank: u32,
    pub pref_active_assignments: u32,
    pub pref_standby_assignments: u32,
    pub admin_state: AdminState,
    /// Names of the service instances this one depends on.
    pub depends_on: Vec<String>,
}

impl ServiceInstance {
    pub fn new(app: AppId, name: &str) -> Self {
        Self {
            name: name.to_string(),
            app,
            protected_by_sg: String::new(),
            rank: 0,
            pref_active_assignments: 1,
            pref_standby_assignments: 1,
            admin_state: AdminState::Unlocked,
            depends_on: Vec::new(),
        }
    }
}

/// A component service instance: the component-granular share of an SI.
#[derive(Debug, Clone)]
pub struct Csi {
    pub name: String,
    pub si: super::SiId,
    pub cs_type: String,
    pub dependencies: Vec<String>,
    pub attributes: Vec<(String, String)>,
}

impl Csi {
    pub fn new(si: super::SiId, name: &str) -> Self {
        Self {
            name: name.to_string(),
            si,
            cs_type: String::new(),
            dependencies: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

/// Assignment of a service instance to a service unit, in a requested HA role.
/// `ha_state` is the confirmed aggregate; `None` while unconfirmed.
#[derive(Debug, Clone)]
pub struct SiAssignment {
    pub si: super::SiId,
    pub su: SuId,
    pub ha_state: Option<HaState>,
    pub requested_ha_state: Option<HaState>,
    /// The one pending completion continuation. Fired exactly once.
    pub pending_callback: Option<crate::core::model::types::AssumedCallback>,
}

/// Assignment of one CSI to one component, always under a parent SI
/// assignment whose service unit owns the component.
#[derive(Debug, Clone)]
pub struct CsiAssignment {
    pub csi: CsiId,
    pub comp: CompId,
    pub si_assignment: SiaId,
    pub ha_state: Option<HaState>,
    pub requested_ha_state: Option<HaState>,
}
