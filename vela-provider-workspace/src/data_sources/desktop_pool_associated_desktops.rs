//! workspace_desktop_pool_associated_desktops data source

use serde_json::{Map, Value as JsonValue, json};
use vela_core::provider::{ProviderError, ProviderResult};
use vela_core::resource::{Resource, State};

use crate::client::api_error;
use crate::data_sources::data_source_state;
use crate::pagination::list_all;
use crate::provider::HandlerContext;
use crate::utils::{flatten_tags_to_map, path_search, pick, search_array};

const LIST_LIMIT: usize = 100;

const DESKTOP_FIELDS: &[&str] = &[
    "desktop_id",
    "computer_name",
    "os_host_name",
    "ipv4",
    "ipv6",
    "desktop_type",
    "status",
    "in_maintenance_mode",
    "created",
    "login_status",
    "product_id",
    "availability_zone",
    "site_type",
    "site_name",
    "os_version",
    "sid",
    "is_support_internet",
    "is_attaching_eip",
    "attach_state",
    "enterprise_project_id",
    "subnet_id",
    "bill_resource_id",
];

const VOLUME_FIELDS: &[&str] = &[
    "type",
    "size",
    "device",
    "id",
    "volume_id",
    "bill_resource_id",
    "create_time",
    "display_name",
    "resource_spec_code",
];

const PRODUCT_FIELDS: &[&str] = &[
    "product_id",
    "flavor_id",
    "type",
    "cpu",
    "memory",
    "descriptions",
    "charge_mode",
    "architecture",
    "is_gpu",
    "package_type",
    "system_disk_type",
    "system_disk_size",
    "contain_data_disk",
    "resource_type",
    "cloud_service_type",
    "volume_product_type",
    "status",
];

fn single_block(value: Option<&JsonValue>, fields: &[&str]) -> JsonValue {
    match value {
        Some(v) => json!([pick(v, fields)]),
        None => JsonValue::Null,
    }
}

pub(crate) fn flatten_desktops(desktops: &[JsonValue]) -> JsonValue {
    JsonValue::Array(
        desktops
            .iter()
            .map(|desktop| {
                let mut item = match pick(desktop, DESKTOP_FIELDS) {
                    JsonValue::Object(map) => map,
                    _ => Map::new(),
                };
                item.insert(
                    "ip_addresses".to_string(),
                    JsonValue::Array(search_array("ip_addresses", desktop).to_vec()),
                );
                item.insert(
                    "root_volume".to_string(),
                    single_block(path_search("root_volume", desktop), VOLUME_FIELDS),
                );
                item.insert(
                    "data_volumes".to_string(),
                    JsonValue::Array(
                        search_array("data_volumes", desktop)
                            .iter()
                            .map(|v| pick(v, VOLUME_FIELDS))
                            .collect(),
                    ),
                );
                item.insert(
                    "product".to_string(),
                    single_block(path_search("product", desktop), PRODUCT_FIELDS),
                );
                item.insert(
                    "tags".to_string(),
                    flatten_tags_to_map(path_search("tags", desktop).unwrap_or(&JsonValue::Null)),
                );
                JsonValue::Object(item)
            })
            .collect(),
    )
}

pub async fn read(ctx: &HandlerContext<'_>, resource: &Resource) -> ProviderResult<State> {
    let pool_id = resource
        .attributes
        .get("pool_id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProviderError::validation("pool_id must be set"))?;

    let path = format!("v2/{{project_id}}/desktop-pools/{}/desktops", pool_id);
    let desktops = list_all(&ctx.client, &path, "pool_desktops", LIST_LIMIT)
        .await
        .map_err(|e| {
            api_error(
                "error querying the associated desktops under the Workspace desktop pool",
                e,
            )
        })?;

    let mut computed = Map::new();
    computed.insert("desktops".to_string(), flatten_desktops(&desktops));
    Ok(data_source_state(resource, &ctx.region, computed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_empty_desktop() {
        let flat = flatten_desktops(&[json!({})]);
        assert_eq!(
            flat,
            json!([{
                "ip_addresses": [],
                "root_volume": null,
                "data_volumes": [],
                "product": null,
                "tags": {}
            }])
        );
    }

    #[test]
    fn flatten_full_desktop() {
        let desktop = json!({
            "desktop_id": "d-1",
            "computer_name": "pool-001",
            "ip_addresses": ["192.168.0.5"],
            "in_maintenance_mode": false,
            "root_volume": {"type": "SAS", "size": 80, "volume_id": "v-0", "unknown": 1},
            "data_volumes": [
                {"type": "SSD", "size": 20, "device": "/dev/vdb"},
                {"type": "SSD", "size": 40, "device": "/dev/vdc"}
            ],
            "product": {"product_id": "p-1", "is_gpu": false, "cpu": "4"},
            "tags": [{"key": "team", "value": "ops"}]
        });
        let flat = flatten_desktops(&[desktop]);
        let item = &flat[0];

        assert_eq!(item["desktop_id"], "d-1");
        assert_eq!(item["ip_addresses"], json!(["192.168.0.5"]));
        assert_eq!(item["in_maintenance_mode"], false);
        assert_eq!(
            item["root_volume"],
            json!([{"type": "SAS", "size": 80, "volume_id": "v-0"}])
        );
        assert_eq!(item["data_volumes"][1]["device"], "/dev/vdc");
        assert_eq!(item["product"][0]["cpu"], "4");
        assert_eq!(item["tags"], json!({"team": "ops"}));
    }
}
