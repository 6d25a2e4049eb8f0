//! Job builder: resolves a request into the servers and ISPs of a run.

use rand::seq::SliceRandom;

use crate::config::MeasurementConfig;
use crate::error_handling::{DatabaseError, MeasurementError};
use crate::models::Server;
use crate::provider::Provider;
use crate::storage::Store;

use super::Request;

/// Servers to probe and ISPs to lease clients from.
#[derive(Debug, Clone)]
pub struct Plan {
    pub servers: Vec<Server>,
    /// In the order they are visited.
    pub isps: Vec<String>,
}

pub(crate) async fn build_plan(
    store: &dyn Store,
    provider: &dyn Provider,
    config: &MeasurementConfig,
    request: &Request,
) -> Result<Plan, MeasurementError> {
    if !request.server_ids.is_empty() && !request.server_names.is_empty() {
        return Err(MeasurementError::AmbiguousServerSelection);
    }

    let servers = resolve_servers(store, provider, config, request).await?;
    log::info!("Resolved {} servers to measure", servers.len());

    let isps = match &request.isp {
        Some(isp) => vec![isp.clone()],
        None => {
            let mut isps = provider
                .list_isps(&request.country, request.network_type)
                .await?;
            isps.shuffle(&mut rand::rng());
            isps
        }
    };
    if isps.is_empty() {
        return Err(MeasurementError::NoIsps {
            country: request.country.clone(),
        });
    }
    log::info!(
        "Measuring {} ISPs in {} ({})",
        isps.len(),
        request.country,
        request.network_type
    );

    Ok(Plan { servers, isps })
}

async fn resolve_servers(
    store: &dyn Store,
    provider: &dyn Provider,
    config: &MeasurementConfig,
    request: &Request,
) -> Result<Vec<Server>, MeasurementError> {
    let explicit = if !request.server_ids.is_empty() {
        Some(store.get_servers_by_ids(&request.server_ids).await)
    } else if !request.server_names.is_empty() {
        Some(store.get_servers_by_names(&request.server_names).await)
    } else {
        None
    };

    match explicit {
        Some(Ok(servers)) if servers.is_empty() => Err(MeasurementError::ServersNotFound(
            "selection matched no servers".to_string(),
        )),
        Some(Ok(servers)) => Ok(servers),
        Some(Err(DatabaseError::NotFound(missing))) => {
            Err(MeasurementError::ServersNotFound(missing))
        }
        Some(Err(e)) if e.is_not_found() => Err(MeasurementError::ServersNotFound(e.to_string())),
        Some(Err(e)) => Err(e.into()),
        None => {
            let provider_name = provider.name();
            let servers = store
                .get_working_servers(provider_name, config.allowed_ports(provider_name))
                .await?;
            if servers.is_empty() {
                return Err(MeasurementError::NoServers {
                    provider: provider_name.to_string(),
                });
            }
            Ok(servers)
        }
    }
}
