use std::fmt;

use regdesk_common::{Error, Result, SECRET_PLACEHOLDER};
use ring::constant_time::verify_slices_are_equal;
use tracing::warn;

/// Header carrying the key for protected endpoints.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Guards read access to stored registrations.
///
/// With no key configured every request is refused.
#[derive(Clone, Default)]
pub struct ApiKeyGuard {
    key: Option<String>,
}

impl ApiKeyGuard {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    pub fn check(&self, provided: Option<&str>) -> Result<()> {
        let Some(expected) = &self.key else {
            warn!("registrations requested but no api key is configured");
            return Err(Error::Unauthorized("api key not configured".into()));
        };
        let Some(provided) = provided else {
            return Err(Error::Unauthorized("missing api key".into()));
        };
        verify_slices_are_equal(expected.as_bytes(), provided.as_bytes())
            .map_err(|_| Error::Unauthorized("invalid api key".into()))
    }
}

impl fmt::Debug for ApiKeyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyGuard")
            .field("key", &self.key.as_ref().map(|_| SECRET_PLACEHOLDER))
            .finish()
    }
}
