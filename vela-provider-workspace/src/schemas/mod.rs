//! Workspace resource and data source schema definitions

pub mod app_image_server;
pub mod app_server;
pub mod app_server_groups;
pub mod app_servers;
pub mod desktop;
pub mod desktop_pool;
pub mod desktop_pool_associated_desktops;
pub mod desktop_power_action;
pub mod service;

use vela_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

/// Remote service a handler talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Virtual desktops (`workspace.{region}.{cloud}`)
    Workspace,
    /// APP streaming (`appstream.{region}.{cloud}`)
    AppStream,
}

impl Service {
    pub fn endpoint_name(self) -> &'static str {
        match self {
            Service::Workspace => "workspace",
            Service::AppStream => "appstream",
        }
    }
}

/// Schema plus the metadata the provider needs to dispatch a type
pub struct WorkspaceSchemaConfig {
    /// Type name (e.g., "workspace_desktop")
    pub type_name: &'static str,
    pub service: Service,
    /// The resource schema with attribute definitions
    pub schema: ResourceSchema,
}

/// All schema configs known to this provider
pub fn configs() -> Vec<WorkspaceSchemaConfig> {
    vec![
        app_servers::config(),
        app_server_groups::config(),
        desktop_pool_associated_desktops::config(),
        service::config(),
        desktop::config(),
        desktop_pool::config(),
        app_server::config(),
        app_image_server::config(),
        desktop_power_action::config(),
    ]
}

/// Find the schema config for a type name
pub fn get_schema_config(type_name: &str) -> Option<WorkspaceSchemaConfig> {
    configs().into_iter().find(|c| c.type_name == type_name)
}

/// Returns all Workspace schemas
pub fn all_schemas() -> Vec<ResourceSchema> {
    configs().into_iter().map(|c| c.schema).collect()
}

// =============================================================================
// Shorthands shared by the schema files
// =============================================================================

pub(crate) fn required(name: &str, ty: AttributeType) -> AttributeSchema {
    AttributeSchema::new(name, ty).required()
}

pub(crate) fn optional(name: &str, ty: AttributeType) -> AttributeSchema {
    AttributeSchema::new(name, ty)
}

pub(crate) fn computed(name: &str, ty: AttributeType) -> AttributeSchema {
    AttributeSchema::new(name, ty).computed()
}

/// Optional attribute the service fills in when unset
pub(crate) fn optional_computed(name: &str, ty: AttributeType) -> AttributeSchema {
    AttributeSchema::new(name, ty).computed().optional()
}

/// Computed string fields, for wide read-only blocks
pub(crate) fn computed_strings(names: &[&str]) -> Vec<AttributeSchema> {
    names
        .iter()
        .map(|name| computed(name, AttributeType::String))
        .collect()
}

pub(crate) fn string_map() -> AttributeType {
    AttributeType::Map(Box::new(AttributeType::String))
}

pub(crate) fn region() -> AttributeSchema {
    optional_computed("region", AttributeType::String)
        .force_new()
        .with_description("Region of the resource; defaults to the provider region")
}

/// `[{key, value}]` list as returned by the APP service
pub(crate) fn tag_list() -> AttributeType {
    AttributeType::block_list(computed_strings(&["key", "value"]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_are_unique() {
        let mut names: Vec<&str> = configs().iter().map(|c| c.type_name).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn schema_type_matches_config_type() {
        for config in configs() {
            assert_eq!(config.schema.resource_type, config.type_name);
        }
    }

    #[test]
    fn every_type_has_a_region_attribute() {
        for schema in all_schemas() {
            assert!(
                schema.attributes.contains_key("region"),
                "{} lacks region",
                schema.resource_type
            );
        }
    }
}
