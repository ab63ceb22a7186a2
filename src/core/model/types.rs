// src/core/model/types.rs

//! State enumerations and small value types shared by the whole object model.
//!
//! Every state enum derives `Display`/`EnumString` so the admin tool and the
//! log output speak the same vocabulary, and `FromRepr` so the wire codec can
//! round-trip states as single bytes.

use bitflags::bitflags;
use strum_macros::{Display, EnumString, FromRepr};

/// Administrative state of an entity. Only `Unlocked` entities take part in
/// workload assignment; lock/unlock administration itself is not handled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum AdminState {
    #[default]
    Unlocked = 1,
    Locked = 2,
    LockedInstantiation = 3,
    ShuttingDown = 4,
}

/// Operational state, aggregated bottom-up from components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum OperationalState {
    Enabled = 1,
    Disabled = 2,
}

/// Readiness state. Runtime-derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadinessState {
    OutOfService,
    InService,
    Stopping,
}

/// Life-cycle (presence) state of a component or service unit.
///
/// The declaration order matters: `Ord` is derived and "worse" states compare
/// greater, which is what the worst-of aggregation over a service unit relies
/// on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Display, EnumString, FromRepr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum PresenceState {
    #[default]
    Uninstantiated = 1,
    Instantiating = 2,
    Instantiated = 3,
    Terminating = 4,
    Restarting = 5,
    InstantiationFailed = 6,
    TerminationFailed = 7,
}

/// High-availability role of one assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum HaState {
    Active = 1,
    Standby = 2,
    Quiesced = 3,
    Quiescing = 4,
}

/// Aggregate assignment state of a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentState {
    Unassigned,
    FullyAssigned,
    PartiallyAssigned,
}

/// Recovery action recommended by an error reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum RecommendedRecovery {
    #[default]
    NoRecommendation = 1,
    ComponentRestart = 2,
    ComponentFailover = 3,
    NodeSwitchover = 4,
    NodeFailover = 5,
    NodeFailfast = 6,
    ClusterReset = 7,
}

bitflags! {
    /// Category bits of a component, combined freely in configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CompCategory: u16 {
        const SA_AWARE      = 1 << 0;
        const PROXY         = 1 << 1;
        const PROXIED       = 1 << 2;
        const LOCAL         = 1 << 3;
        const CONTAINER     = 1 << 4;
        const CONTAINED     = 1 << 5;
    }
}

impl Default for CompCategory {
    fn default() -> Self {
        CompCategory::SA_AWARE | CompCategory::LOCAL
    }
}

/// Derived lifecycle class of a component, computed from its category bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CompLifecycleClass {
    SaAware,
    ProxiedPreInstantiable,
    ProxiedNonPreInstantiable,
    NonProxiedNonSaAware,
}

/// Capability model of a component, bounding how many CSI assignments of each
/// role it can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum CompCapabilityModel {
    XActiveAndYStandby = 1,
    XActiveOrYStandby = 2,
    #[default]
    OneActiveOrYStandby = 3,
    OneActiveOrOneStandby = 4,
    XActive = 5,
    OneActive = 6,
    NonPreInstantiable = 7,
}

/// How a healthcheck is driven: periodically invoked by the framework, or
/// confirmed spontaneously by the component itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum HealthcheckInvocation {
    #[default]
    AmfInvoked = 1,
    ComponentInvoked = 2,
}

/// Redundancy model of a service group. Only N+M is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum RedundancyModel {
    #[default]
    NPlusM = 1,
}

// --- Per-entity control state machines ---

/// Availability control states of the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ClusterAcsmState {
    #[default]
    Uninstantiated = 1,
    StartingComponents = 2,
    StartingWorkload = 3,
    Started = 4,
}

/// Availability control states of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum AppAcsmState {
    #[default]
    Uninstantiated = 1,
    StartingSgs = 2,
    Started = 3,
    AssigningWorkload = 4,
    WorkloadAssigned = 5,
}

/// Availability control states of a service group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, FromRepr)]
#[repr(u8)]
pub enum SgAcsmState {
    #[default]
    Idle = 0,
    DeactivatingDependantWorkload = 1,
    TerminatingSuspected = 2,
    ActivatingStandby = 3,
    AssigningStandbyToSpare = 4,
    ReparingSu = 5,
    AssigningOnRequest = 6,
    InstantiatingServiceUnits = 7,
    AssigningActiveworkload = 8,
    AssigningAutoAdjust = 9,
    AssigningStandBy = 10,
    WaitingAfterOperationFailed = 11,
    RemovingStandbyAssignments = 12,
    RemovingAssignment = 13,
}

/// Restart control states of a service unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum SuRcsmState {
    #[default]
    IdleLevel0 = 0,
    IdleLevel1 = 1,
    IdleLevel2 = 2,
    RestartCompDeactivating = 3,
    RestartCompRestarting = 4,
    RestartCompSetting = 5,
    RestartCompActivating = 6,
    RestartSuDeactivating = 7,
    RestartSuTerminating = 8,
    RestartSuInstantiating = 9,
    RestartSuSetting = 10,
}

impl SuRcsmState {
    /// True for the transient states of an in-progress restart recovery.
    pub fn is_restarting(self) -> bool {
        !matches!(
            self,
            SuRcsmState::IdleLevel0 | SuRcsmState::IdleLevel1 | SuRcsmState::IdleLevel2
        )
    }
}

/// Availability control states of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum NodeAcsmState {
    RepairNeeded = 1,
    #[default]
    IdleLevel0 = 2,
    IdleLevel2 = 3,
    IdleLevel3 = 4,
    FailingGracefullyFailingOver = 5,
    FailingGracefullyRebootingNode = 6,
    LeavingSpontaneouslyFailingOver = 7,
    LeavingSpontaneouslyWaitingForNodeToJoin = 8,
    JoiningStartingApplications = 9,
    JoiningAssigningWorkload = 10,
}

impl NodeAcsmState {
    /// True for the stable escalation-idle states.
    pub fn is_idle(self) -> bool {
        matches!(
            self,
            NodeAcsmState::IdleLevel0 | NodeAcsmState::IdleLevel2 | NodeAcsmState::IdleLevel3
        )
    }
}

/// A component-reported state change, propagated to its service unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Presence(PresenceState),
    Operational(OperationalState),
}

/// Kind of recovery a service group is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "PascalCase")]
pub enum RecoveryType {
    FailoverSu,
    FailoverNode,
}

/// Identifies the continuation to run once a requested SI HA state has been
/// confirmed by every involved component. Replaces the callback pointers of a
/// classical implementation so that pending work survives serialization-free
/// in the single-threaded engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssumedCallback {
    /// `assign_si` commit path of the owning service group.
    SgAssignOnRequest,
    /// A standby assignment promoted during recovery was confirmed.
    SgStandbyActivated,
    /// A dependent SI finished quiescing during recovery.
    SgDependentDeactivated,
    /// A service unit re-asserted its assignments after a restart.
    SuHaStateAssumed,
}
