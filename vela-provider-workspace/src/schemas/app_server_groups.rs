//! workspace_app_server_groups data source schema

use vela_core::schema::{AttributeType, ResourceSchema};

use super::app_servers::product_info_block;
use super::{
    Service, WorkspaceSchemaConfig, computed, computed_strings, optional, region, tag_list,
};

pub const TYPE_NAME: &str = "workspace_app_server_groups";

fn scaling_policy_block() -> AttributeType {
    AttributeType::block_list(vec![
        computed("enable", AttributeType::Bool),
        computed("max_scaling_amount", AttributeType::Int),
        computed("single_expansion_count", AttributeType::Int),
        computed(
            "scaling_policy_by_session",
            AttributeType::block_list(vec![
                computed("session_usage_threshold", AttributeType::Int),
                computed("shrink_after_session_idle_minutes", AttributeType::Int),
            ]),
        ),
    ])
}

fn server_group_block() -> AttributeType {
    let mut fields = computed_strings(&[
        "id",
        "name",
        "description",
        "image_id",
        "os_type",
        "product_id",
        "subnet_id",
        "system_disk_type",
        "extra_session_type",
        "app_type",
        "create_time",
        "update_time",
        "storage_mount_policy",
        "enterprise_project_id",
        "site_type",
        "site_id",
        "image_name",
        "subnet_name",
        "ou_name",
    ]);
    fields.extend([
        computed("system_disk_size", AttributeType::Int),
        computed("is_vdi", AttributeType::Bool),
        computed("extra_session_size", AttributeType::Int),
        computed("primary_server_group_ids", AttributeType::string_list()),
        computed("secondary_server_group_ids", AttributeType::string_list()),
        computed("server_group_status", AttributeType::Bool),
        computed("app_server_flavor_count", AttributeType::Int),
        computed("app_server_count", AttributeType::Int),
        computed("app_group_count", AttributeType::Int),
        computed("product_info", product_info_block()),
        computed("scaling_policy", scaling_policy_block()),
        computed("tags", tag_list()),
    ]);
    AttributeType::block_list(fields)
}

pub fn config() -> WorkspaceSchemaConfig {
    WorkspaceSchemaConfig {
        type_name: TYPE_NAME,
        service: Service::AppStream,
        schema: ResourceSchema::new(TYPE_NAME)
            .with_description("Lists APP server groups, optionally filtered")
            .as_data_source()
            .attribute(region())
            .attribute(optional("server_group_name", AttributeType::String))
            .attribute(optional("server_group_id", AttributeType::String))
            .attribute(
                optional("app_type", AttributeType::String)
                    .with_description("The type of application group"),
            )
            .attribute(optional("enterprise_project_id", AttributeType::String))
            .attribute(
                optional("is_secondary_server_group", AttributeType::String)
                    .with_description("Whether it is a secondary server group (\"true\" or \"false\")"),
            )
            .attribute(
                optional("tags", AttributeType::String)
                    .with_description("The tag value to filter server groups"),
            )
            .attribute(computed("server_groups", server_group_block())),
    }
}
