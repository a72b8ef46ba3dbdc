use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::domain::PermitRecord;
use crate::config::{PermitConfig, PermitProviderKind};

/// Source of truth for Trakheesi permit validity.
#[async_trait]
pub trait PermitProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn lookup(&self, trakheesi: &str, now: DateTime<Utc>) -> PermitRecord;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MockPermitProvider;

#[async_trait]
impl PermitProvider for MockPermitProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn lookup(&self, trakheesi: &str, now: DateTime<Utc>) -> PermitRecord {
        PermitRecord::compute(trakheesi, now)
    }
}

/// Dubai Land Department registry adapter.
#[derive(Debug, Clone)]
pub struct DldPermitProvider {
    base_url: Option<String>,
    api_key: Option<String>,
}

impl DldPermitProvider {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        Self { base_url, api_key }
    }

    fn configured(&self) -> bool {
        self.base_url.is_some() && self.api_key.is_some()
    }
}

#[async_trait]
impl PermitProvider for DldPermitProvider {
    fn name(&self) -> &'static str {
        "dld"
    }

    async fn lookup(&self, trakheesi: &str, now: DateTime<Utc>) -> PermitRecord {
        // TODO: call the Trakheesi registry once DLD publishes the verification contract.
        debug!(configured = self.configured(), "permits.dld_fallback");
        PermitRecord::compute(trakheesi, now)
    }
}

pub fn provider_for(config: &PermitConfig) -> Arc<dyn PermitProvider> {
    match config.provider {
        PermitProviderKind::Dld => Arc::new(DldPermitProvider::new(
            config.trakheesi_api_base.clone(),
            config.trakheesi_api_key.clone(),
        )),
        PermitProviderKind::Mock => Arc::new(MockPermitProvider),
    }
}
