//! workspace_app_servers data source

use serde_json::{Map, Value as JsonValue, json};
use vela_core::provider::ProviderResult;
use vela_core::resource::{Resource, State};

use crate::client::api_error;
use crate::data_sources::{data_source_state, filter};
use crate::pagination::list_all;
use crate::provider::HandlerContext;
use crate::utils::{attrs_to_json, build_query, path_search, pick, project, search_array};

const LIST_LIMIT: usize = 100;

const SERVER_FIELDS: &[&str] = &[
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
    "maintain_status",
    "scaling_auto_create",
    "job_id",
    "job_type",
    "job_status",
    "job_time",
    "resource_pool_id",
    "resource_pool_type",
    "host_id",
    "session_count",
    "vm_status",
    "task_status",
    "enterprise_project_id",
    "metadata",
];

pub(crate) const PRODUCT_INFO_FIELDS: &[&str] = &[
    "product_id",
    "flavor_id",
    "type",
    "architecture",
    "cpu",
    "cpu_desc",
    "memory",
    "is_gpu",
    "system_disk_type",
    "system_disk_size",
    "gpu_desc",
    "descriptions",
    "charge_mode",
    "contain_data_disk",
    "resource_type",
    "cloud_service_type",
    "volume_product_type",
    "sessions",
    "status",
    "cond_operation_az",
    "sub_product_list",
    "domain_ids",
    "package_type",
    "expire_time",
    "support_gpu_type",
];

fn query(attributes: &JsonValue) -> String {
    build_query(&[
        ("server_group_id", filter(attributes, "server_group_id")),
        ("server_name", filter(attributes, "server_name")),
        ("machine_name", filter(attributes, "machine_name")),
        ("ip_addr", filter(attributes, "ip_addr")),
        ("server_id", filter(attributes, "server_id")),
        ("maintain_status", filter(attributes, "maintain_status")),
        ("scaling_auto_create", filter(attributes, "scaling_auto_create")),
    ])
}

fn flatten_flavor(flavor: Option<&JsonValue>) -> JsonValue {
    let Some(flavor) = flavor.filter(|f| f.as_object().is_some_and(|o| !o.is_empty())) else {
        return JsonValue::Null;
    };
    let links: Vec<JsonValue> = search_array("links", flavor)
        .iter()
        .map(|link| pick(link, &["rel", "href"]))
        .collect();
    json!([{
        "id": path_search("id", flavor),
        "links": links,
    }])
}

/// `product_info` as a one-element block list, or null when absent
pub(crate) fn flatten_product_info(product_info: Option<&JsonValue>) -> JsonValue {
    match product_info {
        Some(info) if info.as_object().is_some_and(|o| !o.is_empty()) => {
            json!([pick(info, PRODUCT_INFO_FIELDS)])
        }
        _ => JsonValue::Null,
    }
}

fn flatten_freeze(freeze: &[JsonValue]) -> JsonValue {
    JsonValue::Array(
        freeze
            .iter()
            .map(|item| pick(item, &["effect", "scene"]))
            .collect(),
    )
}

fn flatten_host_address(addresses: &[JsonValue]) -> JsonValue {
    JsonValue::Array(
        addresses
            .iter()
            .map(|addr| {
                project(
                    addr,
                    &[
                        ("addr", "addr"),
                        ("version", "version"),
                        ("mac_addr", "\"OS-EXT-IPS-MAC:mac_addr\""),
                        ("type", "\"OS-EXT-IPS:type\""),
                        ("port_id", "\"OS-EXT-IPS:port_id\""),
                        ("vpc_id", "vpc_id"),
                        ("subnet_id", "subnet_id"),
                        ("tenant_type", "tenant_type"),
                    ],
                )
            })
            .collect(),
    )
}

fn flatten_tags(tags: &[JsonValue]) -> JsonValue {
    JsonValue::Array(tags.iter().map(|t| pick(t, &["key", "value"])).collect())
}

pub(crate) fn flatten_servers(servers: &[JsonValue]) -> JsonValue {
    JsonValue::Array(
        servers
            .iter()
            .map(|server| {
                let mut item = pick(server, SERVER_FIELDS);
                if let Some(obj) = item.as_object_mut() {
                    obj.insert("flavor".into(), flatten_flavor(path_search("flavor", server)));
                    obj.insert(
                        "product_info".into(),
                        flatten_product_info(path_search("product_info", server)),
                    );
                    obj.insert("freeze".into(), flatten_freeze(search_array("freeze", server)));
                    obj.insert(
                        "host_address".into(),
                        flatten_host_address(search_array("host_address", server)),
                    );
                    obj.insert("tags".into(), flatten_tags(search_array("tags", server)));
                }
                item
            })
            .collect(),
    )
}

pub async fn read(ctx: &HandlerContext<'_>, resource: &Resource) -> ProviderResult<State> {
    let attributes = attrs_to_json(&resource.attributes);
    let path = format!("v1/{{project_id}}/app-servers{}", query(&attributes));
    let servers = list_all(&ctx.client, &path, "items", LIST_LIMIT)
        .await
        .map_err(|e| api_error("error getting app servers", e))?;

    let mut computed = Map::new();
    computed.insert("servers".to_string(), flatten_servers(&servers));
    Ok(data_source_state(resource, &ctx.region, computed))
}
