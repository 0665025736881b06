//! workspace_app_servers data source schema

use vela_core::schema::{AttributeType, ResourceSchema};

use super::{
    Service, WorkspaceSchemaConfig, computed, computed_strings, optional, optional_computed,
    region, string_map, tag_list,
};

pub const TYPE_NAME: &str = "workspace_app_servers";

/// Fields of `product_info` shared with the server group data source
pub(crate) fn product_info_block() -> AttributeType {
    let mut fields = computed_strings(&[
        "product_id",
        "flavor_id",
        "type",
        "architecture",
        "cpu",
        "cpu_desc",
        "memory",
        "system_disk_type",
        "system_disk_size",
        "gpu_desc",
        "descriptions",
        "charge_mode",
        "resource_type",
        "cloud_service_type",
        "volume_product_type",
        "status",
        "cond_operation_az",
        "package_type",
        "expire_time",
        "support_gpu_type",
    ]);
    fields.push(computed("is_gpu", AttributeType::Bool));
    fields.push(computed("contain_data_disk", AttributeType::Bool));
    fields.push(computed("sessions", AttributeType::Int));
    fields.push(computed("sub_product_list", AttributeType::string_list()));
    fields.push(computed("domain_ids", AttributeType::string_list()));
    AttributeType::block_list(fields)
}

fn server_block() -> AttributeType {
    let mut fields = computed_strings(&[
        "id",
        "name",
        "machine_name",
        "description",
        "server_group_id",
        "server_group_name",
        "status",
        "create_time",
        "update_time",
        "image_id",
        "availability_zone",
        "domain",
        "ou_name",
        "sid",
        "instance_id",
        "os_version",
        "os_type",
        "order_id",
        "job_id",
        "job_type",
        "job_status",
        "job_time",
        "resource_pool_id",
        "resource_pool_type",
        "host_id",
        "vm_status",
        "task_status",
        "enterprise_project_id",
    ]);
    fields.push(computed("maintain_status", AttributeType::Bool));
    fields.push(computed("scaling_auto_create", AttributeType::Bool));
    fields.push(computed("session_count", AttributeType::Int));
    fields.push(computed("metadata", string_map()));
    fields.push(computed(
        "flavor",
        AttributeType::block_list(vec![
            computed("id", AttributeType::String),
            computed(
                "links",
                AttributeType::block_list(computed_strings(&["rel", "href"])),
            ),
        ]),
    ));
    fields.push(computed("product_info", product_info_block()));
    fields.push(computed(
        "freeze",
        AttributeType::block_list(vec![
            computed("effect", AttributeType::Int),
            computed("scene", AttributeType::String),
        ]),
    ));
    let mut address = computed_strings(&[
        "addr",
        "mac_addr",
        "type",
        "port_id",
        "vpc_id",
        "subnet_id",
        "tenant_type",
    ]);
    address.push(computed("version", AttributeType::Int));
    fields.push(computed("host_address", AttributeType::block_list(address)));
    fields.push(computed("tags", tag_list()));
    AttributeType::block_list(fields)
}

pub fn config() -> WorkspaceSchemaConfig {
    WorkspaceSchemaConfig {
        type_name: TYPE_NAME,
        service: Service::AppStream,
        schema: ResourceSchema::new(TYPE_NAME)
            .with_description("Lists APP servers, optionally filtered")
            .as_data_source()
            .attribute(region())
            .attribute(
                optional("server_group_id", AttributeType::String)
                    .with_description("The ID of the server group"),
            )
            .attribute(optional("server_name", AttributeType::String))
            .attribute(optional("machine_name", AttributeType::String))
            .attribute(optional("ip_addr", AttributeType::String))
            .attribute(optional_computed("server_id", AttributeType::String))
            .attribute(optional("maintain_status", AttributeType::Bool))
            .attribute(optional("scaling_auto_create", AttributeType::Bool))
            .attribute(computed("servers", server_block()).with_description("The list of servers")),
    }
}
