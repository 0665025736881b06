//! Workspace Provider implementation
//!
//! This module resolves the endpoint and project for each call, validates
//! attributes against the schemas and dispatches to the per-type handlers.

use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use reqwest::Client;
use tokio::sync::Mutex;
use vela_core::provider::{ErrorKind, ProviderError, ProviderResult};
use vela_core::resource::{Resource, ResourceId, State, Value};
use vela_core::schema::TypeError;

use crate::client::{ServiceClient, api_error};
use crate::config::ProviderConfig;
use crate::schemas::{
    self, Service, WorkspaceSchemaConfig, app_image_server, app_server, app_server_groups,
    app_servers, desktop, desktop_pool, desktop_pool_associated_desktops, desktop_power_action,
    service,
};
use crate::signer::Credentials;
use crate::utils::{search_array, search_str};
use crate::{data_sources, resources};

/// Everything a handler needs for one call: the config, a client bound to
/// the service endpoint and project, and the region the call runs in.
pub struct HandlerContext<'a> {
    pub config: &'a ProviderConfig,
    pub client: ServiceClient,
    pub region: String,
}

/// Get the schema config for a resource type
fn get_schema_config(id: &ResourceId) -> ProviderResult<WorkspaceSchemaConfig> {
    schemas::get_schema_config(&id.resource_type).ok_or_else(|| {
        ProviderError::validation(format!("Unknown resource type: {}", id.resource_type))
            .for_resource(id.clone())
    })
}

/// Attach the resource ID unless the error already names one
fn for_resource(err: ProviderError, id: &ResourceId) -> ProviderError {
    if err.resource_id.is_some() {
        err
    } else {
        err.for_resource(id.clone())
    }
}

fn validation_error(errors: Vec<TypeError>) -> ProviderError {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    ProviderError::validation(messages.join("; "))
}

/// Huawei Cloud Workspace Provider
pub struct WorkspaceProvider {
    config: ProviderConfig,
    http: Client,
    /// Project IDs looked up through IAM, by region
    project_ids: Mutex<HashMap<String, String>>,
}

impl WorkspaceProvider {
    /// Create a new provider from a validated config
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        config.validate().map_err(|e| {
            ProviderError::new(e.to_string())
                .with_kind(ErrorKind::Config)
                .with_cause(e)
        })?;
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| {
                ProviderError::new(format!("failed to build HTTP client: {}", e))
                    .with_kind(ErrorKind::Config)
                    .with_cause(e)
            })?;
        Ok(Self {
            config,
            http,
            project_ids: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            access_key: self.config.access_key.clone(),
            secret_key: self.config.secret_key.clone(),
            security_token: self.config.security_token.clone(),
        }
    }

    fn service_client(&self, endpoint: String, project_id: &str) -> ServiceClient {
        ServiceClient::new(
            self.http.clone(),
            endpoint,
            project_id,
            self.credentials(),
            self.config.max_retries,
        )
        .with_backoff_base(self.config.wait_duration(Duration::from_secs(1)))
    }

    // =========================================================================
    // Context Resolution
    // =========================================================================

    /// Project ID for a region: configured first, then looked up through IAM
    pub async fn project_id(&self, region: &str) -> ProviderResult<String> {
        if let Some(id) = self.config.project_id_for(region) {
            return Ok(id.to_string());
        }

        let mut cache = self.project_ids.lock().await;
        if let Some(id) = cache.get(region) {
            return Ok(id.clone());
        }

        let iam = self.service_client(self.config.endpoint("iam", region), "");
        let body = iam
            .get(&format!("v3/projects?name={}", urlencoding::encode(region)))
            .await
            .map_err(|e| api_error(format!("error querying project of region {}", region), e))?;
        let project_id = search_array("projects", &body)
            .iter()
            .find(|p| search_str("name", p, "") == region)
            .map(|p| search_str("id", p, ""))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ProviderError::new(format!(
                    "no project found for region {}, set HW_PROJECT_ID",
                    region
                ))
                .with_kind(ErrorKind::Config)
            })?;

        debug!("resolved project {} for region {}", project_id, region);
        cache.insert(region.to_string(), project_id.clone());
        Ok(project_id)
    }

    /// Build the handler context for a service in a region
    pub async fn context(&self, service: Service, region: &str) -> ProviderResult<HandlerContext<'_>> {
        let project_id = self.project_id(region).await?;
        let endpoint = self.config.endpoint(service.endpoint_name(), region);
        Ok(HandlerContext {
            config: &self.config,
            client: self.service_client(endpoint, &project_id),
            region: region.to_string(),
        })
    }

    /// Region recorded in attributes, else the provider region
    fn region_of(&self, attributes: Option<&HashMap<String, Value>>) -> String {
        match attributes.and_then(|a| a.get("region")) {
            Some(Value::String(region)) if !region.is_empty() => region.clone(),
            _ => self.config.region.clone(),
        }
    }

    /// Apply defaults and validate desired attributes
    fn prepare(&self, schema_config: &WorkspaceSchemaConfig, resource: &Resource) -> ProviderResult<Resource> {
        let mut resource = resource.clone();
        schema_config.schema.apply_defaults(&mut resource.attributes);
        schema_config
            .schema
            .validate(&resource.attributes)
            .map_err(|errors| validation_error(errors).for_resource(resource.id.clone()))?;
        Ok(resource)
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Read a resource by its remote identifier
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        prior: Option<&State>,
    ) -> ProviderResult<State> {
        let schema_config = get_schema_config(id)?;
        let region = self.region_of(prior.map(|s| &s.attributes));
        let ctx = self.context(schema_config.service, &region).await?;

        let result = match schema_config.type_name {
            service::TYPE_NAME => resources::service::read(&ctx, id, identifier, prior).await,
            desktop::TYPE_NAME => resources::desktop::read(&ctx, id, identifier, prior).await,
            desktop_pool::TYPE_NAME => {
                resources::desktop_pool::read(&ctx, id, identifier, prior).await
            }
            app_server::TYPE_NAME => resources::app_server::read(&ctx, id, identifier, prior).await,
            app_image_server::TYPE_NAME => {
                resources::app_image_server::read(&ctx, id, identifier, prior).await
            }
            desktop_power_action::TYPE_NAME => {
                resources::desktop_power_action::read(&ctx, id, identifier, prior)
            }
            other => Err(ProviderError::validation(format!(
                "{} is a data source and cannot be read by ID",
                other
            ))),
        };
        result.map_err(|e| for_resource(e, id))
    }

    /// Create a resource
    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let schema_config = get_schema_config(&resource.id)?;
        let resource = self.prepare(&schema_config, resource)?;
        let region = self.config.region_for(&resource).to_string();
        let ctx = self.context(schema_config.service, &region).await?;

        let result = match schema_config.type_name {
            service::TYPE_NAME => resources::service::create(&ctx, &resource).await,
            desktop::TYPE_NAME => resources::desktop::create(&ctx, &resource).await,
            desktop_pool::TYPE_NAME => resources::desktop_pool::create(&ctx, &resource).await,
            app_server::TYPE_NAME => resources::app_server::create(&ctx, &resource).await,
            app_image_server::TYPE_NAME => {
                resources::app_image_server::create(&ctx, &resource).await
            }
            desktop_power_action::TYPE_NAME => {
                resources::desktop_power_action::create(&ctx, &resource).await
            }
            other => Err(ProviderError::validation(format!(
                "{} is a data source and cannot be created",
                other
            ))),
        };
        result.map_err(|e| for_resource(e, &resource.id))
    }

    /// Update a resource in place
    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let schema_config = get_schema_config(id)?;
        let to = self.prepare(&schema_config, to)?;
        let region = self.config.region_for(&to).to_string();
        let ctx = self.context(schema_config.service, &region).await?;

        let result = match schema_config.type_name {
            service::TYPE_NAME => resources::service::update(&ctx, id, identifier, from, &to).await,
            desktop::TYPE_NAME => resources::desktop::update(&ctx, id, identifier, from, &to).await,
            desktop_pool::TYPE_NAME => {
                resources::desktop_pool::update(&ctx, id, identifier, from, &to).await
            }
            app_server::TYPE_NAME => {
                resources::app_server::update(&ctx, id, identifier, from, &to).await
            }
            app_image_server::TYPE_NAME => {
                resources::app_image_server::update(&ctx, id, identifier, from, &to).await
            }
            other => Err(ProviderError::validation(format!(
                "Update not supported for {}, delete and recreate",
                other
            ))),
        };
        result.map_err(|e| for_resource(e, id))
    }

    /// Delete a resource
    pub async fn delete_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        prior: &State,
    ) -> ProviderResult<()> {
        let schema_config = get_schema_config(id)?;
        let region = self.region_of(Some(&prior.attributes));
        let ctx = self.context(schema_config.service, &region).await?;

        let result = match schema_config.type_name {
            service::TYPE_NAME => resources::service::delete(&ctx, id, identifier, prior).await,
            desktop::TYPE_NAME => resources::desktop::delete(&ctx, id, identifier, prior).await,
            desktop_pool::TYPE_NAME => {
                resources::desktop_pool::delete(&ctx, id, identifier, prior).await
            }
            app_server::TYPE_NAME => {
                resources::app_server::delete(&ctx, id, identifier, prior).await
            }
            app_image_server::TYPE_NAME => {
                resources::app_image_server::delete(&ctx, id, identifier, prior).await
            }
            desktop_power_action::TYPE_NAME => {
                resources::desktop_power_action::delete(id, identifier);
                Ok(())
            }
            other => Err(ProviderError::validation(format!(
                "{} is a data source and cannot be deleted",
                other
            ))),
        };
        result.map_err(|e| for_resource(e, id))
    }

    /// Import an existing remote object
    pub async fn import_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let schema_config = get_schema_config(id)?;
        if schema_config.type_name == service::TYPE_NAME {
            let ctx = self.context(schema_config.service, &self.config.region).await?;
            return resources::service::import(&ctx, id, identifier)
                .await
                .map_err(|e| for_resource(e, id));
        }
        self.read_resource(id, identifier, None).await
    }

    /// Run a data source query
    pub async fn query_data_source(&self, resource: &Resource) -> ProviderResult<State> {
        let schema_config = get_schema_config(&resource.id)?;
        let resource = self.prepare(&schema_config, resource)?;
        let region = self.config.region_for(&resource).to_string();
        let ctx = self.context(schema_config.service, &region).await?;

        let result = match schema_config.type_name {
            app_servers::TYPE_NAME => data_sources::app_servers::read(&ctx, &resource).await,
            app_server_groups::TYPE_NAME => {
                data_sources::app_server_groups::read(&ctx, &resource).await
            }
            desktop_pool_associated_desktops::TYPE_NAME => {
                data_sources::desktop_pool_associated_desktops::read(&ctx, &resource).await
            }
            other => Err(ProviderError::validation(format!(
                "{} is a resource, not a data source",
                other
            ))),
        };
        result.map_err(|e| for_resource(e, &resource.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> WorkspaceProvider {
        WorkspaceProvider::new(ProviderConfig {
            region: "cn-north-4".to_string(),
            access_key: "AK".to_string(),
            secret_key: "SK".to_string(),
            project_id: Some("p-north".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn missing_credentials_are_a_config_error() {
        let err = WorkspaceProvider::new(ProviderConfig {
            region: "cn-north-4".to_string(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert_eq!(err.kind, ErrorKind::Config);
    }

    #[test]
    fn region_attribute_wins() {
        let provider = provider();
        let mut attrs = HashMap::new();
        assert_eq!(provider.region_of(Some(&attrs)), "cn-north-4");
        attrs.insert("region".to_string(), Value::String("ap-southeast-1".into()));
        assert_eq!(provider.region_of(Some(&attrs)), "ap-southeast-1");
        assert_eq!(provider.region_of(None), "cn-north-4");
    }

    #[tokio::test]
    async fn configured_project_skips_iam() {
        let provider = provider();
        assert_eq!(provider.project_id("cn-north-4").await.unwrap(), "p-north");
    }

    #[tokio::test]
    async fn unknown_type_is_rejected() {
        let provider = provider();
        let id = ResourceId::new("workspace_unknown", "x");
        let err = provider.read_resource(&id, "abc", None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn validation_runs_before_any_call() {
        let provider = provider();
        let resource = Resource::new(desktop_power_action::TYPE_NAME, "restart")
            .with_attribute("op_type", Value::String("reboot".into()));
        let err = provider.create_resource(&resource).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("desktop_ids"));
    }

    #[tokio::test]
    async fn data_sources_cannot_be_created() {
        let provider = provider();
        let resource = Resource::new(app_servers::TYPE_NAME, "all").with_read_only(true);
        let err = provider.create_resource(&resource).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
