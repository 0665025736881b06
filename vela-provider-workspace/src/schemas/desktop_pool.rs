//! workspace_desktop_pool resource schema

use vela_core::schema::{AttributeType, ResourceSchema, types};

use super::{
    Service, WorkspaceSchemaConfig, computed, computed_strings, optional, optional_computed,
    region, required, string_map,
};

pub const TYPE_NAME: &str = "workspace_desktop_pool";

fn volume_block() -> AttributeType {
    AttributeType::block_list(vec![
        required("type", AttributeType::String),
        required("size", types::positive_int()),
        computed("id", AttributeType::String),
    ])
}

fn authorized_object_block() -> AttributeType {
    AttributeType::block_list(vec![
        required("object_id", AttributeType::String),
        required("object_type", AttributeType::String),
        required("object_name", AttributeType::String),
        required("user_group", AttributeType::String),
    ])
}

fn autoscale_policy_block() -> AttributeType {
    AttributeType::block_list(vec![
        optional("autoscale_type", AttributeType::String),
        optional("max_auto_created", AttributeType::Int),
        optional("min_idle", AttributeType::Int),
        optional("once_auto_created", AttributeType::Int),
    ])
}

pub fn config() -> WorkspaceSchemaConfig {
    WorkspaceSchemaConfig {
        type_name: TYPE_NAME,
        service: Service::Workspace,
        schema: ResourceSchema::new(TYPE_NAME)
            .with_description("A pool of identically configured Workspace desktops")
            .attribute(region())
            .attribute(required("name", AttributeType::String))
            .attribute(required("type", AttributeType::String).force_new())
            .attribute(required("size", types::positive_int()).force_new())
            .attribute(required("product_id", AttributeType::String))
            .attribute(required("image_type", AttributeType::String).force_new())
            .attribute(required("image_id", AttributeType::String).force_new())
            .attribute(required("root_volume", volume_block()).force_new())
            .attribute(required("subnet_ids", AttributeType::string_list()).force_new())
            .attribute(optional("vpc_id", AttributeType::String).force_new())
            .attribute(
                optional(
                    "security_groups",
                    AttributeType::block_list(vec![required("id", AttributeType::String)]),
                )
                .force_new(),
            )
            .attribute(optional("data_volumes", volume_block()))
            .attribute(optional("authorized_objects", authorized_object_block()))
            .attribute(optional("availability_zone", AttributeType::String))
            .attribute(optional("disconnected_retention_period", AttributeType::Int))
            .attribute(optional("enable_autoscale", AttributeType::Bool))
            .attribute(optional("autoscale_policy", autoscale_policy_block()))
            .attribute(optional("desktop_name_policy_id", AttributeType::String))
            .attribute(optional("ou_name", AttributeType::String))
            .attribute(optional_computed("enterprise_project_id", AttributeType::String).force_new())
            .attribute(optional("description", AttributeType::String))
            .attribute(optional("tags", string_map()))
            .attribute(optional("in_maintenance_mode", AttributeType::Bool))
            .attribute(computed("status", AttributeType::String))
            .attribute(computed("created_time", AttributeType::String))
            .attribute(computed("desktop_used", AttributeType::Int))
            .attribute(computed(
                "product",
                AttributeType::block_list(computed_strings(&[
                    "flavor_id",
                    "type",
                    "cpu",
                    "memory",
                    "descriptions",
                    "charging_mode",
                ])),
            ))
            .attribute(computed("image_name", AttributeType::String))
            .attribute(computed("image_os_type", AttributeType::String))
            .attribute(computed("image_os_version", AttributeType::String))
            .attribute(computed("image_os_platform", AttributeType::String))
            .attribute(
                computed(
                    "data_volumes_order",
                    AttributeType::block_list(vec![
                        computed("size", AttributeType::Int),
                        computed("type", AttributeType::String),
                    ]),
                )
                .with_description("Configured data volume order, used to reorder data_volumes"),
            ),
    }
}
