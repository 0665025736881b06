//! workspace_service resource schema

use vela_core::resource::Value;
use vela_core::schema::{AttributeType, ResourceSchema, types};

use super::{
    Service, WorkspaceSchemaConfig, computed, computed_strings, optional, optional_computed,
    region, required,
};

pub const TYPE_NAME: &str = "workspace_service";

/// Local authentication (the default)
pub const AUTH_TYPE_LITE_AS: &str = "LITE_AS";
/// Windows AD authentication
pub const AUTH_TYPE_LOCAL_AD: &str = "LOCAL_AD";

fn ad_domain_block() -> AttributeType {
    AttributeType::block_list(vec![
        required("name", AttributeType::String),
        required("admin_account", AttributeType::String),
        required("password", AttributeType::String).sensitive(),
        required("active_domain_ip", AttributeType::String),
        required("active_domain_name", AttributeType::String),
        optional("standby_domain_ip", AttributeType::String),
        optional("standby_domain_name", AttributeType::String),
        optional("active_dns_ip", AttributeType::String),
        optional("standby_dns_ip", AttributeType::String),
        optional_computed("delete_computer_object", AttributeType::Bool),
    ])
}

fn otp_config_block() -> AttributeType {
    AttributeType::block_list(vec![
        required("enable", AttributeType::Bool),
        required("receive_mode", AttributeType::String),
        optional("auth_url", AttributeType::String),
        optional("app_id", AttributeType::String),
        optional("app_secret", AttributeType::String).sensitive(),
        optional("auth_server_access_mode", AttributeType::String),
        optional("cert_content", AttributeType::String),
        optional("rule", AttributeType::String),
        optional("rule_type", AttributeType::String),
    ])
}

fn security_group_block() -> AttributeType {
    AttributeType::block_list(computed_strings(&["id", "name"]))
}

pub fn config() -> WorkspaceSchemaConfig {
    WorkspaceSchemaConfig {
        type_name: TYPE_NAME,
        service: Service::Workspace,
        schema: ResourceSchema::new(TYPE_NAME)
            .with_description("Registers the Workspace service in a project")
            .attribute(region())
            .attribute(required("vpc_id", AttributeType::String).force_new())
            .attribute(
                required("network_ids", AttributeType::string_list())
                    .with_description("Subnet IDs of the service"),
            )
            .attribute(required(
                "access_mode",
                AttributeType::Enum(vec![
                    "INTERNET".to_string(),
                    "DEDICATED".to_string(),
                    "BOTH".to_string(),
                ]),
            ))
            .attribute(
                optional(
                    "auth_type",
                    AttributeType::Enum(vec![
                        AUTH_TYPE_LITE_AS.to_string(),
                        AUTH_TYPE_LOCAL_AD.to_string(),
                    ]),
                )
                .force_new()
                .with_default(Value::String(AUTH_TYPE_LITE_AS.to_string())),
            )
            .attribute(
                optional_computed("ad_domain", ad_domain_block())
                    .with_description("AD domain configuration, required for LOCAL_AD"),
            )
            .attribute(optional_computed("enterprise_id", AttributeType::String))
            .attribute(optional_computed("internet_access_port", types::port()))
            .attribute(optional_computed("dedicated_subnets", AttributeType::string_list()))
            .attribute(optional_computed("management_subnet_cidr", types::cidr()).force_new())
            .attribute(
                optional("lock_enabled", AttributeType::Bool)
                    .with_description("Set to true to unlock a locked service"),
            )
            .attribute(optional("otp_config_info", otp_config_block()))
            .attribute(computed("internet_access_address", AttributeType::String))
            .attribute(computed("infrastructure_security_group", security_group_block()))
            .attribute(computed("desktop_security_group", security_group_block()))
            .attribute(computed("status", AttributeType::String))
            .attribute(computed("is_locked", AttributeType::Int))
            .attribute(computed("lock_time", AttributeType::String))
            .attribute(computed("lock_reason", AttributeType::String)),
    }
}
