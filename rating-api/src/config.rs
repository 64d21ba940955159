use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Empty {0}")]
    EmptyField(&'static str),

    #[error("Duplicate collection id: {0}")]
    DuplicateCollection(String),

    #[error("Timeout cannot be 0")]
    InvalidTimeout,
}

/// Whether re-rating a repository counts as a new rating in the site-wide totals.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CountingPolicy {
    /// Every accepted submission adds one rating and its full value to the totals.
    #[default]
    EverySubmission,
    /// Only first-time ratings are counted; a re-rating adjusts the star sum by the difference.
    NewRatingsOnly,
}

/// Rating API configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the public rating endpoint
    #[serde(default = "Listener::default_api")]
    pub listener: Listener,
    /// Listener for health and readiness probes
    #[serde(default = "Listener::default_admin")]
    pub admin_listener: Listener,
    pub session_provider: SessionProviderConfig,
    /// Request timeout for the session provider and document store clients
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub github: GitHubConfig,
    pub document_store: DocumentStoreConfig,
    #[serde(default)]
    pub counting_policy: CountingPolicy,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.session_provider.project_id.is_empty() {
            return Err(ValidationError::EmptyField("session provider project id"));
        }
        if self.request_timeout_secs == 0 || self.github.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        match &self.document_store {
            DocumentStoreConfig::Appwrite(appwrite) => appwrite.validate(),
            DocumentStoreConfig::Memory => Ok(()),
        }
    }

    /// Applies the `APPWRITE_*` environment overrides using `lookup` to read variables.
    ///
    /// Overrides only apply to an Appwrite document store.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let DocumentStoreConfig::Appwrite(appwrite) = &mut self.document_store else {
            return;
        };

        let targets = [
            ("APPWRITE_DATABASE_ID", &mut appwrite.database_id),
            ("APPWRITE_API_KEY", &mut appwrite.api_key),
            (
                "APPWRITE_COLLECTION_APP_ID",
                &mut appwrite.collections.app_totals,
            ),
            (
                "APPWRITE_COLLECTION_RATINGS_ID",
                &mut appwrite.collections.ratings,
            ),
            (
                "APPWRITE_COLLECTION_REPOS_ID",
                &mut appwrite.collections.repos,
            ),
        ];

        for (key, target) in targets {
            if let Some(value) = lookup(key) {
                tracing::debug!(key, "Applying environment override");
                *target = value;
            }
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    fn default_api() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }

    fn default_admin() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3001,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SessionProviderConfig {
    /// Base URL of the account API, e.g. `https://cloud.appwrite.io/v1`
    pub endpoint: Url,
    pub project_id: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: Url,
    pub user_agent: String,
    /// Applies to code host requests only.
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            api_url: Url::parse("https://api.github.com").expect("static URL is valid"),
            user_agent: "reporate".into(),
            timeout_secs: 10,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum DocumentStoreConfig {
    Appwrite(AppwriteConfig),
    /// Keeps everything in process memory. Data is lost on restart.
    Memory,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AppwriteConfig {
    pub endpoint: Url,
    pub project_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub database_id: String,
    #[serde(default)]
    pub collections: CollectionIds,
}

impl AppwriteConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("project id", &self.project_id),
            ("api key", &self.api_key),
            ("database id", &self.database_id),
            ("app totals collection id", &self.collections.app_totals),
            ("ratings collection id", &self.collections.ratings),
            ("repos collection id", &self.collections.repos),
        ];
        for (name, value) in required {
            if value.is_empty() {
                return Err(ValidationError::EmptyField(name));
            }
        }

        let mut seen = HashSet::new();
        for id in [
            &self.collections.app_totals,
            &self.collections.ratings,
            &self.collections.repos,
        ] {
            if !seen.insert(id) {
                return Err(ValidationError::DuplicateCollection(id.clone()));
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CollectionIds {
    #[serde(default)]
    pub app_totals: String,
    #[serde(default)]
    pub ratings: String,
    #[serde(default)]
    pub repos: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const YAML: &str = r#"
listener:
    host: "0.0.0.0"
    port: 8080
session_provider:
    endpoint: "https://cloud.appwrite.io/v1"
    project_id: proj
request_timeout_secs: 5
github:
    timeout_secs: 30
document_store:
    type: appwrite
    endpoint: "https://cloud.appwrite.io/v1"
    project_id: proj
    api_key: key
    database_id: db
    collections:
        app_totals: app
        ratings: ratings
        repos: repos
counting_policy: new_ratings_only
"#;

    #[test]
    fn test_parse_valid_config() {
        let config: Config = serde_yaml::from_str(YAML).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.admin_listener.port, 3001);
        assert_eq!(config.github.api_url.as_str(), "https://api.github.com/");
        assert_eq!(config.counting_policy, CountingPolicy::NewRatingsOnly);
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.github.timeout_secs, 30);

        let DocumentStoreConfig::Appwrite(appwrite) = &config.document_store else {
            panic!("expected appwrite store");
        };
        assert_eq!(appwrite.collections.ratings, "ratings");
    }

    #[test]
    fn test_memory_store_and_defaults() {
        let config: Config = serde_yaml::from_str(
            r#"
session_provider: {endpoint: "http://localhost/v1", project_id: proj}
document_store: {type: memory}
"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.document_store, DocumentStoreConfig::Memory);
        assert_eq!(config.counting_policy, CountingPolicy::EverySubmission);
        assert_eq!(config.listener.port, 3000);
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn test_env_overrides() {
        let mut config: Config = serde_yaml::from_str(YAML).unwrap();
        let env = HashMap::from([
            ("APPWRITE_DATABASE_ID", "prod-db"),
            ("APPWRITE_COLLECTION_REPOS_ID", "prod-repos"),
        ]);
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        let DocumentStoreConfig::Appwrite(appwrite) = &config.document_store else {
            panic!("expected appwrite store");
        };
        assert_eq!(appwrite.database_id, "prod-db");
        assert_eq!(appwrite.collections.repos, "prod-repos");
        assert_eq!(appwrite.collections.ratings, "ratings");
    }

    #[test]
    fn test_validation_errors() {
        let base: Config = serde_yaml::from_str(YAML).unwrap();

        let mut config = base.clone();
        config.admin_listener.port = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));

        let mut config = base.clone();
        config.apply_env_overrides(|key| (key == "APPWRITE_DATABASE_ID").then(String::new));
        assert_eq!(
            config.validate(),
            Err(ValidationError::EmptyField("database id"))
        );

        let mut config = base.clone();
        config.apply_env_overrides(|key| {
            (key == "APPWRITE_COLLECTION_REPOS_ID").then(|| "ratings".to_string())
        });
        assert_eq!(
            config.validate(),
            Err(ValidationError::DuplicateCollection("ratings".into()))
        );

        let mut config = base.clone();
        config.github.timeout_secs = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidTimeout));

        let mut config = base;
        config.request_timeout_secs = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidTimeout));
    }

    #[test]
    fn test_deserialization_errors() {
        // Unknown store type
        assert!(
            serde_yaml::from_str::<Config>(
                r#"
session_provider: {endpoint: "http://localhost/v1", project_id: proj}
document_store: {type: postgres}
"#
            )
            .is_err()
        );

        // Invalid endpoint URL
        assert!(
            serde_yaml::from_str::<Config>(
                r#"
session_provider: {endpoint: "not a url", project_id: proj}
document_store: {type: memory}
"#
            )
            .is_err()
        );

        assert!(serde_yaml::from_str::<CountingPolicy>("sometimes").is_err());
    }
}
