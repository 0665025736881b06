//! workspace_app_image_server resource schema

use vela_core::schema::{AttributeType, ResourceSchema, types};

use super::{
    Service, WorkspaceSchemaConfig, computed, optional, optional_computed, region, required,
    string_map,
};

pub const TYPE_NAME: &str = "workspace_app_image_server";

pub fn config() -> WorkspaceSchemaConfig {
    WorkspaceSchemaConfig {
        type_name: TYPE_NAME,
        service: Service::AppStream,
        schema: ResourceSchema::new(TYPE_NAME)
            .with_description("An APP image server used to build server group images")
            .attribute(region())
            .attribute(required("name", AttributeType::String))
            .attribute(required("flavor_id", AttributeType::String).force_new())
            .attribute(required("vpc_id", AttributeType::String).force_new())
            .attribute(required("subnet_id", AttributeType::String).force_new())
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
            .attribute(
                required(
                    "authorize_accounts",
                    AttributeType::block_list(vec![
                        required("account", AttributeType::String),
                        required("type", AttributeType::String),
                        optional("domain", AttributeType::String),
                    ]),
                )
                .force_new(),
            )
            .attribute(required("image_id", AttributeType::String).force_new())
            .attribute(required("image_type", AttributeType::String).force_new())
            .attribute(optional_computed("spec_code", AttributeType::String).force_new())
            .attribute(optional("image_source_product_id", AttributeType::String).force_new())
            .attribute(optional("is_vdi", AttributeType::Bool).force_new())
            .attribute(optional("availability_zone", AttributeType::String).force_new())
            .attribute(optional("description", AttributeType::String))
            .attribute(optional("ou_name", AttributeType::String).force_new())
            .attribute(optional("extra_session_type", AttributeType::String).force_new())
            .attribute(optional("extra_session_size", AttributeType::Int).force_new())
            .attribute(
                optional(
                    "route_policy",
                    AttributeType::block_list(vec![
                        optional("max_session", AttributeType::Int),
                        optional("cpu_threshold", AttributeType::Int),
                        optional("mem_threshold", AttributeType::Int),
                    ]),
                )
                .force_new(),
            )
            .attribute(optional("tags", string_map()).force_new())
            .attribute(optional_computed("enterprise_project_id", AttributeType::String).force_new())
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
                optional("is_delete_associated_resources", AttributeType::Bool)
                    .with_description("Also delete the image and servers built from this server"),
            )
            .attribute(optional("attach_apps", AttributeType::string_list()).force_new())
            .attribute(computed("created_at", AttributeType::String)),
    }
}
