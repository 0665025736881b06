//! workspace_desktop_pool_associated_desktops data source schema

use vela_core::schema::{AttributeType, ResourceSchema};

use super::{
    Service, WorkspaceSchemaConfig, computed, computed_strings, region, required, string_map,
};

pub const TYPE_NAME: &str = "workspace_desktop_pool_associated_desktops";

fn volume_block() -> AttributeType {
    let mut fields = computed_strings(&[
        "type",
        "device",
        "id",
        "volume_id",
        "bill_resource_id",
        "create_time",
        "display_name",
        "resource_spec_code",
    ]);
    fields.push(computed("size", AttributeType::Int));
    AttributeType::block_list(fields)
}

fn product_block() -> AttributeType {
    let mut fields = computed_strings(&[
        "product_id",
        "flavor_id",
        "type",
        "cpu",
        "memory",
        "descriptions",
        "charge_mode",
        "architecture",
        "package_type",
        "system_disk_type",
        "system_disk_size",
        "resource_type",
        "cloud_service_type",
        "volume_product_type",
        "status",
    ]);
    fields.push(computed("is_gpu", AttributeType::Bool));
    fields.push(computed("contain_data_disk", AttributeType::Bool));
    AttributeType::block_list(fields)
}

fn desktop_block() -> AttributeType {
    let mut fields = computed_strings(&[
        "desktop_id",
        "computer_name",
        "os_host_name",
        "ipv4",
        "ipv6",
        "desktop_type",
        "status",
        "created",
        "login_status",
        "product_id",
        "availability_zone",
        "site_type",
        "site_name",
        "os_version",
        "sid",
        "attach_state",
        "enterprise_project_id",
        "subnet_id",
        "bill_resource_id",
    ]);
    fields.extend([
        computed("ip_addresses", AttributeType::string_list()),
        computed("in_maintenance_mode", AttributeType::Bool),
        computed("root_volume", volume_block()),
        computed("data_volumes", volume_block()),
        computed("product", product_block()),
        computed("tags", string_map()),
        computed("is_support_internet", AttributeType::Bool),
        computed("is_attaching_eip", AttributeType::Bool),
    ]);
    AttributeType::block_list(fields)
}

pub fn config() -> WorkspaceSchemaConfig {
    WorkspaceSchemaConfig {
        type_name: TYPE_NAME,
        service: Service::Workspace,
        schema: ResourceSchema::new(TYPE_NAME)
            .with_description("Lists the desktops associated with a desktop pool")
            .as_data_source()
            .attribute(region())
            .attribute(
                required("pool_id", AttributeType::String)
                    .with_description("The ID of the desktop pool"),
            )
            .attribute(computed("desktops", desktop_block())),
    }
}
