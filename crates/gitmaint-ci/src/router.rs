//! Builds a [`CiRouter`] from repository configuration.

use std::sync::Arc;

use gitmaint_core::{CiProvider, CiRouter, CiRouting, CiSettings, MaintainError, Result};
use tracing::{info, warn};

use crate::azure::AzureProvider;
use crate::transport::CiTransport;
use crate::travis::TravisProvider;

/// Instantiate the backend called `name`; `none` yields no provider.
fn backend(
    name: &str,
    settings: &CiSettings,
    project: &str,
    transport: &Arc<dyn CiTransport>,
) -> Result<Option<Arc<dyn CiProvider>>> {
    let provider: Arc<dyn CiProvider> = match name {
        "none" => return Ok(None),
        "travis" => Arc::new(TravisProvider::new(
            settings.travis_url.clone(),
            settings.validation_slug.clone(),
            settings.stable_slug.clone(),
            transport.clone(),
        )),
        "azure" => Arc::new(AzureProvider::new(
            settings.azure_url.clone(),
            project,
            settings.azure_valid_org.clone(),
            settings.azure_stable_org.clone(),
            transport.clone(),
        )),
        other => {
            return Err(MaintainError::Config(format!("unknown CI backend '{other}'")));
        }
    };
    Ok(Some(provider))
}

/// Router for `routing`, using `settings` for endpoints and identities.
///
/// A legacy backend needs a threshold; lines below it use the legacy
/// backend, everything else the current one.
pub fn build_router(
    routing: &CiRouting,
    settings: &CiSettings,
    project: &str,
    transport: Arc<dyn CiTransport>,
) -> Result<CiRouter> {
    let Some(current) = backend(&routing.backend, settings, project, &transport)? else {
        if routing.legacy_backend.is_some() {
            warn!("legacy CI backend ignored: no current backend configured");
        }
        info!("CI disabled");
        return Ok(CiRouter::disabled());
    };
    let mut router = CiRouter::new(current);

    if let Some(name) = &routing.legacy_backend {
        let threshold = routing.threshold.ok_or_else(|| {
            MaintainError::Config("maintain.ci-legacy requires maintain.ci-threshold".to_string())
        })?;
        if let Some(legacy) = backend(name, settings, project, &transport)? {
            router = router.with_legacy(threshold, legacy);
        }
    }
    Ok(router)
}
