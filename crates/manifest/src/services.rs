//! Service handles shared by manifest stages and tasks.

use std::sync::Arc;

use clouddriver::{
    ArtifactFetcher, ClouddriverClient, ClouddriverError, Front50Client, Front50Service,
    KatoService, OortService, ServiceConfig,
};
use pipeline::DynamicConfig;

use crate::evaluator::ManifestEvaluator;

/// Everything a manifest stage needs to talk to the outside world.
#[derive(Clone)]
pub struct ManifestServices {
    pub kato: Arc<dyn KatoService>,
    pub oort: Arc<dyn OortService>,
    pub front50: Arc<dyn Front50Service>,
    pub config: Arc<dyn DynamicConfig>,
}

impl ManifestServices {
    pub fn new(
        kato: Arc<dyn KatoService>,
        oort: Arc<dyn OortService>,
        front50: Arc<dyn Front50Service>,
        config: Arc<dyn DynamicConfig>,
    ) -> Self {
        Self {
            kato,
            oort,
            front50,
            config,
        }
    }

    /// HTTP-backed services for the given endpoints.
    pub fn from_config(
        services: &ServiceConfig,
        config: Arc<dyn DynamicConfig>,
    ) -> Result<Self, ClouddriverError> {
        let clouddriver = Arc::new(ClouddriverClient::new(services)?);
        let front50 = Arc::new(Front50Client::new(services)?);
        Ok(Self::new(clouddriver.clone(), clouddriver, front50, config))
    }

    pub fn evaluator(&self) -> ManifestEvaluator {
        ManifestEvaluator::new(ArtifactFetcher::new(Arc::clone(&self.oort)))
    }
}
