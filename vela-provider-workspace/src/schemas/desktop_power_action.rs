//! workspace_desktop_power_action resource schema

use vela_core::resource::Value;
use vela_core::schema::{AttributeType, ResourceSchema};

use super::{Service, WorkspaceSchemaConfig, optional, region, required};

pub const TYPE_NAME: &str = "workspace_desktop_power_action";

pub fn config() -> WorkspaceSchemaConfig {
    WorkspaceSchemaConfig {
        type_name: TYPE_NAME,
        service: Service::Workspace,
        schema: ResourceSchema::new(TYPE_NAME)
            .with_description("Runs a power operation on desktops; deleting it does nothing remotely")
            .attribute(region())
            .attribute(
                required("desktop_ids", AttributeType::string_list())
                    .force_new()
                    .with_description("Desktops to operate on"),
            )
            .attribute(
                required(
                    "op_type",
                    AttributeType::Enum(
                        ["os-start", "os-stop", "reboot", "os-hibernate"]
                            .iter()
                            .map(|s| s.to_string())
                            .collect(),
                    ),
                )
                .force_new(),
            )
            .attribute(
                optional("type", AttributeType::Enum(vec!["SOFT".to_string(), "HARD".to_string()]))
                    .force_new(),
            )
            .attribute(
                optional("max_retries", AttributeType::Int)
                    .force_new()
                    .with_default(Value::Int(0))
                    .with_description("Retries while the desktops are busy (HTTP 409)"),
            ),
    }
}
