//! Service catalog: which plan each service offers and its default quota.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use yarnbroker_id::{PlanId, ServiceId};

/// One service and its single plan.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEntry {
    pub service_id: ServiceId,
    pub plan_id: PlanId,
    /// Queue quota used when a create request does not name one.
    pub default_quota_gb: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Catalog {
    services: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(services: Vec<CatalogEntry>) -> Self {
        Self { services }
    }

    /// The catalog used when no catalog file is configured.
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(vec![CatalogEntry {
            service_id: ServiceId::parse("yarn")?,
            plan_id: PlanId::parse("yarn-shared")?,
            default_quota_gb: 10.0,
        }]))
    }

    /// Parses `{"services": [{"service_id": .., "plan_id": .., "default_quota_gb": ..}]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(json).context("invalid catalog json")?;
        if let Some(bad) = catalog
            .services
            .iter()
            .find(|s| !(s.default_quota_gb.is_finite() && s.default_quota_gb > 0.0))
        {
            anyhow::bail!(
                "service {} has invalid default_quota_gb {}",
                bad.service_id,
                bad.default_quota_gb
            );
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn service(&self, service_id: &ServiceId) -> Option<&CatalogEntry> {
        self.services.iter().find(|s| &s.service_id == service_id)
    }

    /// Returns the entry only if `plan_id` is the plan `service_id` offers.
    pub fn plan(&self, service_id: &ServiceId, plan_id: &PlanId) -> Option<&CatalogEntry> {
        self.service(service_id).filter(|s| &s.plan_id == plan_id)
    }

    pub fn services(&self) -> &[CatalogEntry] {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_plan_lookup() {
        let catalog = Catalog::builtin().unwrap();
        let yarn = ServiceId::parse("yarn").unwrap();
        assert!(catalog
            .plan(&yarn, &PlanId::parse("yarn-shared").unwrap())
            .is_some());
        assert!(catalog
            .plan(&yarn, &PlanId::parse("other").unwrap())
            .is_none());
        assert!(catalog
            .plan(
                &ServiceId::parse("hbase").unwrap(),
                &PlanId::parse("yarn-shared").unwrap()
            )
            .is_none());
    }

    #[test]
    fn test_from_json() {
        let catalog = Catalog::from_json(
            r#"{"services": [
                {"service_id": "yarn", "plan_id": "small", "default_quota_gb": 4},
                {"service_id": "spark", "plan_id": "large", "default_quota_gb": 64.5}
            ]}"#,
        )
        .unwrap();
        assert_eq!(catalog.services().len(), 2);
        let spark = catalog.service(&ServiceId::parse("spark").unwrap()).unwrap();
        assert_eq!(spark.default_quota_gb, 64.5);
    }

    #[test]
    fn test_from_json_rejects_bad_quota() {
        let err = Catalog::from_json(
            r#"{"services": [{"service_id": "yarn", "plan_id": "p", "default_quota_gb": 0}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("default_quota_gb"));
    }

    #[test]
    fn test_from_json_rejects_bad_ids() {
        assert!(Catalog::from_json(
            r#"{"services": [{"service_id": "", "plan_id": "p", "default_quota_gb": 1}]}"#,
        )
        .is_err());
    }
}
