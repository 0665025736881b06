//! workspace_app_server resource schema

use vela_core::resource::Value;
use vela_core::schema::{AttributeType, ResourceSchema, types};

use super::{Service, WorkspaceSchemaConfig, optional, optional_computed, region, required};

pub const TYPE_NAME: &str = "workspace_app_server";

pub fn config() -> WorkspaceSchemaConfig {
    WorkspaceSchemaConfig {
        type_name: TYPE_NAME,
        service: Service::AppStream,
        schema: ResourceSchema::new(TYPE_NAME)
            .with_description("An APP streaming server in a server group")
            .attribute(region())
            .attribute(required("server_group_id", AttributeType::String).force_new())
            .attribute(optional_computed("name", AttributeType::String))
            .attribute(required("type", AttributeType::String).force_new())
            .attribute(required("flavor_id", AttributeType::String).force_new())
            .attribute(
                required(
                    "root_volume",
                    AttributeType::block_list(vec![
                        required("type", AttributeType::String),
                        required("size", types::positive_int()),
                    ]),
                )
                .force_new(),
            )
            .attribute(required("vpc_id", AttributeType::String).force_new())
            .attribute(required("subnet_id", AttributeType::String).force_new())
            .attribute(optional_computed("os_type", AttributeType::String).force_new())
            .attribute(optional_computed("availability_zone", AttributeType::String).force_new())
            .attribute(optional("description", AttributeType::String))
            .attribute(optional("maintain_status", AttributeType::Bool))
            .attribute(optional("ou_name", AttributeType::String))
            .attribute(
                optional("update_access_agent", AttributeType::Bool)
                    .with_default(Value::Bool(true)),
            )
            .attribute(
                optional(
                    "scheduler_hints",
                    AttributeType::block_list(vec![
                        optional("dedicated_host_id", AttributeType::String),
                        optional("tenancy", AttributeType::String),
                    ]),
                )
                .force_new(),
            )
            .attribute(
                optional_computed(
                    "charging_mode",
                    AttributeType::Enum(vec!["postPaid".to_string(), "prePaid".to_string()]),
                )
                .force_new()
                .with_description("Only postPaid servers can be created"),
            ),
    }
}
