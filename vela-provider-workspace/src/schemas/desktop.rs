//! workspace_desktop resource schema

use vela_core::schema::{AttributeType, ResourceSchema, types};

use super::{
    Service, WorkspaceSchemaConfig, computed, optional, optional_computed, region, required,
    string_map,
};

pub const TYPE_NAME: &str = "workspace_desktop";

fn enum_of(values: &[&str]) -> AttributeType {
    AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
}

/// Volume block shared by `root_volume` and `data_volume`
pub(crate) fn volume_block() -> AttributeType {
    AttributeType::block_list(vec![
        required("type", AttributeType::String),
        required("size", types::positive_int()),
        optional_computed("iops", AttributeType::Int),
        optional_computed("throughput", AttributeType::Int),
        optional_computed("kms_id", AttributeType::String),
        computed("id", AttributeType::String),
        computed("name", AttributeType::String),
        computed("device", AttributeType::String),
        computed("created_at", AttributeType::String),
    ])
}

pub fn config() -> WorkspaceSchemaConfig {
    WorkspaceSchemaConfig {
        type_name: TYPE_NAME,
        service: Service::Workspace,
        schema: ResourceSchema::new(TYPE_NAME)
            .with_description("A dedicated Workspace desktop assigned to one user")
            .attribute(region())
            .attribute(required("flavor_id", AttributeType::String))
            .attribute(required("image_type", enum_of(&["market", "gold", "private"])))
            .attribute(required("image_id", AttributeType::String))
            .attribute(required("vpc_id", AttributeType::String).force_new())
            .attribute(required("user_name", AttributeType::String).force_new())
            .attribute(required("user_email", AttributeType::String).force_new())
            .attribute(
                required(
                    "user_group",
                    enum_of(&["sudo", "default", "administrators", "users"]),
                )
                .force_new(),
            )
            .attribute(required("root_volume", volume_block()))
            .attribute(optional_computed("data_volume", volume_block()))
            .attribute(optional_computed("availability_zone", AttributeType::String).force_new())
            .attribute(optional_computed("security_groups", AttributeType::string_list()).force_new())
            .attribute(optional_computed(
                "nic",
                AttributeType::block_list(vec![required("network_id", AttributeType::String)]),
            ))
            .attribute(
                optional_computed("name", AttributeType::String)
                    .force_new()
                    .with_description("Computer name of the desktop"),
            )
            .attribute(optional("email_notification", AttributeType::Bool).force_new())
            .attribute(optional("tags", string_map()))
            .attribute(optional_computed("enterprise_project_id", AttributeType::String))
            .attribute(
                optional("delete_user", AttributeType::Bool)
                    .with_description("Delete the desktop user together with the desktop"),
            )
            .attribute(
                optional_computed("power_action", AttributeType::String)
                    .with_description("os-start, os-stop, reboot or os-hibernate"),
            )
            .attribute(optional("power_action_type", AttributeType::String))
            .attribute(computed("status", AttributeType::String)),
    }
}
