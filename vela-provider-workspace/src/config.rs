//! Provider configuration
//!
//! Settings come from an optional TOML file and the `HW_*` environment
//! variables. Environment values win over file values; explicit overrides
//! from the host (CLI flags) win over both.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use vela_core::resource::{Resource, Value};

/// Default cloud domain used to build service endpoints
pub const DEFAULT_CLOUD: &str = "myhuaweicloud.com";
/// Default number of retries for throttled and busy requests
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Fixed interval between attempts on HTTP 409
pub const DEFAULT_CONFLICT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be set (environment variable {env})")]
    Missing {
        field: &'static str,
        env: &'static str,
    },

    #[error("invalid value '{value}' for {field}")]
    InvalidValue { field: &'static str, value: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// On-disk form of the configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    region: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
    security_token: Option<String>,
    project_id: Option<String>,
    project_ids: HashMap<String, String>,
    enterprise_project_id: Option<String>,
    cloud: Option<String>,
    endpoints: HashMap<String, String>,
    max_retries: Option<u32>,
    poll_interval_ms: Option<u64>,
    conflict_retry_interval_secs: Option<u64>,
}

/// Resolved provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub security_token: Option<String>,
    /// Project ID used for the provider region
    pub project_id: Option<String>,
    /// Project IDs for other regions
    pub project_ids: HashMap<String, String>,
    pub enterprise_project_id: Option<String>,
    pub cloud: String,
    /// Endpoint overrides keyed by service name ("workspace", "appstream", "iam")
    pub endpoints: HashMap<String, String>,
    pub max_retries: u32,
    /// Replaces every wait delay and poll interval when set
    pub poll_interval: Option<Duration>,
    pub conflict_retry_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            security_token: None,
            project_id: None,
            project_ids: HashMap::new(),
            enterprise_project_id: None,
            cloud: DEFAULT_CLOUD.to_string(),
            endpoints: HashMap::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            poll_interval: None,
            conflict_retry_interval: DEFAULT_CONFLICT_RETRY_INTERVAL,
        }
    }
}

impl ProviderConfig {
    /// Build configuration from the process environment only
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::load(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from a TOML file, then apply the environment
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::load(Some(path.as_ref()))?;
        config.validate()?;
        Ok(config)
    }

    /// File (when given) plus environment, without validation, so a host
    /// can apply its own overrides first
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;

        let defaults = Self::default();
        Ok(Self {
            region: file.region.unwrap_or_default(),
            access_key: file.access_key.unwrap_or_default(),
            secret_key: file.secret_key.unwrap_or_default(),
            security_token: file.security_token,
            project_id: file.project_id,
            project_ids: file.project_ids,
            enterprise_project_id: file.enterprise_project_id,
            cloud: file.cloud.unwrap_or(defaults.cloud),
            endpoints: file.endpoints,
            max_retries: file.max_retries.unwrap_or(defaults.max_retries),
            poll_interval: file.poll_interval_ms.map(Duration::from_millis),
            conflict_retry_interval: file
                .conflict_retry_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.conflict_retry_interval),
        })
    }

    /// Overlay values found through `lookup` (normally `std::env::var`)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("HW_REGION_NAME") {
            self.region = v;
        }
        if let Some(v) = get("HW_ACCESS_KEY") {
            self.access_key = v;
        }
        if let Some(v) = get("HW_SECRET_KEY") {
            self.secret_key = v;
        }
        if let Some(v) = get("HW_SECURITY_TOKEN") {
            self.security_token = Some(v);
        }
        if let Some(v) = get("HW_PROJECT_ID") {
            self.project_id = Some(v);
        }
        if let Some(v) = get("HW_ENTERPRISE_PROJECT_ID") {
            self.enterprise_project_id = Some(v);
        }
        if let Some(v) = get("HW_CLOUD") {
            self.cloud = v;
        }
        if let Some(v) = get("HW_MAX_RETRIES") {
            self.max_retries = v.parse().map_err(|_| ConfigError::InvalidValue {
                field: "max_retries",
                value: v.clone(),
            })?;
        }
        for (service, key) in [
            ("workspace", "HW_WORKSPACE_ENDPOINT"),
            ("appstream", "HW_APPSTREAM_ENDPOINT"),
            ("iam", "HW_IAM_ENDPOINT"),
        ] {
            if let Some(v) = get(key) {
                self.endpoints.insert(service.to_string(), v);
            }
        }
        Ok(())
    }

    /// Check that the values needed to sign requests are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.is_empty() {
            return Err(ConfigError::Missing {
                field: "region",
                env: "HW_REGION_NAME",
            });
        }
        if self.access_key.is_empty() {
            return Err(ConfigError::Missing {
                field: "access_key",
                env: "HW_ACCESS_KEY",
            });
        }
        if self.secret_key.is_empty() {
            return Err(ConfigError::Missing {
                field: "secret_key",
                env: "HW_SECRET_KEY",
            });
        }
        Ok(())
    }

    /// Service endpoint for a region, always ending in `/`
    pub fn endpoint(&self, service: &str, region: &str) -> String {
        let base = match self.endpoints.get(service) {
            Some(custom) => custom.clone(),
            None => format!("https://{}.{}.{}/", service, region, self.cloud),
        };
        if base.ends_with('/') {
            base
        } else {
            format!("{}/", base)
        }
    }

    /// Configured project ID for a region, if any
    pub fn project_id_for(&self, region: &str) -> Option<&str> {
        if let Some(id) = self.project_ids.get(region) {
            return Some(id);
        }
        if region == self.region {
            return self.project_id.as_deref();
        }
        None
    }

    /// The resource's `region` attribute wins over the provider region
    pub fn region_for<'a>(&'a self, resource: &'a Resource) -> &'a str {
        match resource.attributes.get("region") {
            Some(Value::String(region)) if !region.is_empty() => region,
            _ => &self.region,
        }
    }

    /// The resource's `enterprise_project_id` wins over the provider default
    pub fn enterprise_project_for(&self, resource: &Resource) -> Option<String> {
        match resource.attributes.get("enterprise_project_id") {
            Some(Value::String(eps)) if !eps.is_empty() => Some(eps.clone()),
            _ => self.enterprise_project_id.clone(),
        }
    }

    /// Scale a nominal wait duration by the poll override
    pub fn wait_duration(&self, nominal: Duration) -> Duration {
        self.poll_interval.unwrap_or(nominal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_values_fill_config() {
        let mut config = ProviderConfig::default();
        config
            .apply_env(env(&[
                ("HW_REGION_NAME", "cn-north-4"),
                ("HW_ACCESS_KEY", "AK"),
                ("HW_SECRET_KEY", "SK"),
                ("HW_MAX_RETRIES", "2"),
                ("HW_WORKSPACE_ENDPOINT", "http://127.0.0.1:8080"),
            ]))
            .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.max_retries, 2);
        assert_eq!(
            config.endpoint("workspace", "cn-north-4"),
            "http://127.0.0.1:8080/"
        );
        assert_eq!(
            config.endpoint("appstream", "cn-north-4"),
            "https://appstream.cn-north-4.myhuaweicloud.com/"
        );
    }

    #[test]
    fn invalid_max_retries_is_rejected() {
        let mut config = ProviderConfig::default();
        let err = config
            .apply_env(env(&[("HW_MAX_RETRIES", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "max_retries", .. }));
    }

    #[test]
    fn missing_credentials_name_the_variable() {
        let config = ProviderConfig {
            region: "cn-north-4".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("HW_ACCESS_KEY"));
    }

    #[test]
    fn file_values_are_overridden_by_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
region = "cn-north-4"
access_key = "file-ak"
secret_key = "file-sk"
cloud = "example.com"
max_retries = 1
poll_interval_ms = 5

[project_ids]
cn-east-3 = "p-east"
"#
        )
        .unwrap();

        let mut config = ProviderConfig::load_file(file.path()).unwrap();
        config
            .apply_env(env(&[("HW_ACCESS_KEY", "env-ak")]))
            .unwrap();

        assert_eq!(config.access_key, "env-ak");
        assert_eq!(config.secret_key, "file-sk");
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.poll_interval, Some(Duration::from_millis(5)));
        assert_eq!(config.project_id_for("cn-east-3"), Some("p-east"));
        assert_eq!(
            config.endpoint("workspace", "cn-east-3"),
            "https://workspace.cn-east-3.example.com/"
        );
    }

    #[test]
    fn resource_region_and_enterprise_project_win() {
        let config = ProviderConfig {
            region: "cn-north-4".to_string(),
            enterprise_project_id: Some("0".to_string()),
            ..Default::default()
        };
        let plain = Resource::new("workspace_desktop", "a");
        assert_eq!(config.region_for(&plain), "cn-north-4");
        assert_eq!(config.enterprise_project_for(&plain).as_deref(), Some("0"));

        let custom = Resource::new("workspace_desktop", "b")
            .with_attribute("region", Value::String("cn-east-3".into()))
            .with_attribute("enterprise_project_id", Value::String("eps-1".into()));
        assert_eq!(config.region_for(&custom), "cn-east-3");
        assert_eq!(
            config.enterprise_project_for(&custom).as_deref(),
            Some("eps-1")
        );
    }
}
