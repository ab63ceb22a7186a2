// src/core/client.rs

//! The library-side component interface: requests arriving over local IPC
//! from application components, routed to the owning entity by DN lookup.
//!
//! State-bearing requests (register, error report, responses) are multicast
//! so every node applies them in the same total order; purely local concerns
//! (healthcheck scheduling, state queries) are handled in place.

use crate::core::engine::{ClientResponse, Engine};
use crate::core::errors::AegisError;
use crate::core::model::types::{HealthcheckInvocation, RecommendedRecovery};
use crate::core::transport::ClusterMessage;

/// Requests a component library session may issue.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    Register {
        comp_dn: String,
        proxy_dn: Option<String>,
    },
    Unregister {
        comp_dn: String,
    },
    HealthcheckStart {
        comp_dn: String,
        key: String,
        invocation: HealthcheckInvocation,
        recovery: RecommendedRecovery,
    },
    HealthcheckStop {
        comp_dn: String,
        key: String,
    },
    HealthcheckConfirm {
        comp_dn: String,
        key: String,
        healthy: bool,
    },
    HaStateGet {
        comp_dn: String,
        csi_dn: String,
    },
    ErrorReport {
        comp_dn: String,
        recovery: RecommendedRecovery,
    },
    Response {
        invocation: u64,
        ok: bool,
    },
}

impl Engine {
    /// Routes one library request.
    pub fn handle_client(&mut self, req: ClientRequest) -> Result<ClientResponse, AegisError> {
        match req {
            ClientRequest::Register { comp_dn, proxy_dn } => {
                // Verified locally, applied cluster-wide.
                self.comp_by_dn(&comp_dn)?;
                self.mcast(ClusterMessage::ComponentRegister { comp_dn, proxy_dn });
                Ok(ClientResponse::Ok)
            }
            ClientRequest::Unregister { comp_dn } => {
                self.comp_unregister(&comp_dn)?;
                Ok(ClientResponse::Ok)
            }
            ClientRequest::HealthcheckStart {
                comp_dn,
                key,
                invocation,
                recovery,
            } => {
                let comp = self.comp_by_dn(&comp_dn)?;
                self.comp_healthcheck_start(comp, &key, invocation, recovery)?;
                Ok(ClientResponse::Ok)
            }
            ClientRequest::HealthcheckStop { comp_dn, key } => {
                let comp = self.comp_by_dn(&comp_dn)?;
                self.comp_healthcheck_stop(comp, &key)?;
                Ok(ClientResponse::Ok)
            }
            ClientRequest::HealthcheckConfirm {
                comp_dn,
                key,
                healthy,
            } => {
                let comp = self.comp_by_dn(&comp_dn)?;
                self.comp_healthcheck_confirm(comp, &key, healthy)?;
                Ok(ClientResponse::Ok)
            }
            ClientRequest::HaStateGet { comp_dn, csi_dn } => {
                let comp = self.comp_by_dn(&comp_dn)?;
                let csi = self
                    .model
                    .find_csi_by_dn(&csi_dn)
                    .ok_or_else(|| AegisError::NotFound(csi_dn.clone()))?;
                let state = self
                    .model
                    .csias_of_csi(csi)
                    .into_iter()
                    .filter_map(|id| self.model.csia(id))
                    .find(|a| a.comp == comp)
                    .and_then(|a| a.ha_state);
                Ok(ClientResponse::HaState(state))
            }
            ClientRequest::ErrorReport { comp_dn, recovery } => {
                self.comp_by_dn(&comp_dn)?;
                self.mcast(ClusterMessage::ComponentErrorReport { comp_dn, recovery });
                Ok(ClientResponse::Ok)
            }
            ClientRequest::Response { invocation, ok } => {
                self.mcast(ClusterMessage::Response { invocation, ok });
                Ok(ClientResponse::Ok)
            }
        }
    }
}
