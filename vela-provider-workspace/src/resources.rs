//! Resource type definitions and shared handler helpers
//!
//! This module defines:
//! - Resource type definitions (implementing the ResourceType trait)
//! - Helpers every resource handler uses to shape its state

pub mod app_image_server;
pub mod app_server;
pub mod desktop;
pub mod desktop_pool;
pub mod desktop_power_action;
pub mod service;

use serde_json::{Map, Value as JsonValue};
use vela_core::provider::{ProviderError, ProviderResult, ResourceType};
use vela_core::resource::{ResourceId, State};
use vela_core::schema::ResourceSchema;

use crate::schemas;
use crate::utils::{json_to_attrs, search_str};

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $module:ident) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                schemas::$module::TYPE_NAME
            }
            fn schema(&self) -> ResourceSchema {
                schemas::$module::config().schema
            }
        }
    };
}

define_resource_type!(AppServersType, app_servers);
define_resource_type!(AppServerGroupsType, app_server_groups);
define_resource_type!(DesktopPoolAssociatedDesktopsType, desktop_pool_associated_desktops);
define_resource_type!(ServiceType, service);
define_resource_type!(DesktopType, desktop);
define_resource_type!(DesktopPoolType, desktop_pool);
define_resource_type!(AppServerType, app_server);
define_resource_type!(AppImageServerType, app_image_server);
define_resource_type!(DesktopPowerActionType, desktop_power_action);

/// Returns all resource and data source types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(AppServersType),
        Box::new(AppServerGroupsType),
        Box::new(DesktopPoolAssociatedDesktopsType),
        Box::new(ServiceType),
        Box::new(DesktopType),
        Box::new(DesktopPoolType),
        Box::new(AppServerType),
        Box::new(AppImageServerType),
        Box::new(DesktopPowerActionType),
    ]
}

// =============================================================================
// Handler Helpers
// =============================================================================

/// Whether any of `keys` differs between prior and desired attributes
pub(crate) fn has_change(old: &JsonValue, new: &JsonValue, keys: &[&str]) -> bool {
    keys.iter().any(|key| old.get(*key) != new.get(*key))
}

/// `job_id` from an asynchronous API response
pub(crate) fn job_id_of(body: &JsonValue) -> ProviderResult<String> {
    let job_id = search_str("job_id", body, "");
    if job_id.is_empty() {
        return Err(ProviderError::new("unable to find job ID from API response"));
    }
    Ok(job_id)
}

/// Build a state from flattened attributes, recording the region
pub(crate) fn state_from(
    id: &ResourceId,
    identifier: &str,
    region: &str,
    mut attributes: Map<String, JsonValue>,
) -> State {
    attributes.insert("region".to_string(), JsonValue::String(region.to_string()));
    State::existing(id.clone(), json_to_attrs(&JsonValue::Object(attributes)))
        .with_identifier(identifier)
}

/// Copy `keys` from the prior attributes when the service does not return them
pub(crate) fn carry_over(attributes: &mut Map<String, JsonValue>, prior: &JsonValue, keys: &[&str]) {
    for key in keys {
        if let Some(value) = prior.get(*key)
            && !attributes.contains_key(*key)
        {
            attributes.insert(key.to_string(), value.clone());
        }
    }
}
