//! Per-run cache of raw CI responses.

use std::collections::HashMap;
use std::sync::Mutex;

use gitmaint_core::CiError;
use tracing::debug;

use crate::transport::CiTransport;

/// Raw response bodies keyed by logical query label.
///
/// Several branches usually share one "list everything" response, so a run
/// only pays for each distinct query once.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, String>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached body for `label`, fetching `url` on a miss.
    pub async fn get_or_fetch(
        &self,
        transport: &dyn CiTransport,
        label: &str,
        url: &str,
    ) -> Result<String, CiError> {
        let cached = self.lock().get(label).cloned();
        if let Some(body) = cached {
            return Ok(body);
        }
        debug!(%label, %url, "cache miss");
        let body = transport.get(url).await?;
        self.lock().insert(label.to_string(), body.clone());
        Ok(body)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
