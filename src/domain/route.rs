//! Webhook routing table.
//!
//! Maps a pushed (repository, ref) pair to the service that should be
//! rebuilt. The table is loaded from configuration and handed to the server
//! at construction.

use serde::{Deserialize, Serialize};

/// A single routing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Repository full name, e.g. `Transerve-PwC/municipal-services`
    pub repository: String,

    /// Git ref as sent in push payloads, e.g. `refs/heads/feature/rp`
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// Source module directory under the repositories root
    pub module: String,

    /// Service name passed to the lifecycle scripts
    pub service: String,

    #[serde(default = "default_true")]
    pub git_pull: bool,

    #[serde(default = "default_true")]
    pub build: bool,
}

fn default_true() -> bool {
    true
}

/// Ordered list of routes; first match wins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Find the route for a repository and ref
    pub fn find(&self, repository: &str, git_ref: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.repository == repository && r.git_ref == git_ref)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RoutingTable {
        let yaml = r#"
- repository: Transerve-PwC/municipal-services
  ref: refs/heads/feature/estate-services
  module: municipal-services-es
  service: estate-services
- repository: Transerve-PwC/mdms-data
  ref: refs/heads/feature/est-services
  module: core-services
  service: egov-mdms-service
  git_pull: false
  build: false
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_find_exact_match() {
        let table = table();
        let route = table
            .find("Transerve-PwC/mdms-data", "refs/heads/feature/est-services")
            .unwrap();
        assert_eq!(route.service, "egov-mdms-service");
        assert!(!route.git_pull);
        assert!(!route.build);
    }

    #[test]
    fn test_flags_default_to_true() {
        let table = table();
        let route = table
            .find(
                "Transerve-PwC/municipal-services",
                "refs/heads/feature/estate-services",
            )
            .unwrap();
        assert!(route.git_pull);
        assert!(route.build);
    }

    #[test]
    fn test_unknown_ref_or_repo() {
        let table = table();
        assert!(table
            .find("Transerve-PwC/mdms-data", "refs/heads/main")
            .is_none());
        assert!(table
            .find("someone/else", "refs/heads/feature/est-services")
            .is_none());
        assert_eq!(table.len(), 2);
    }
}
