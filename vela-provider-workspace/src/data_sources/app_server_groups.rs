//! workspace_app_server_groups data source

use serde_json::{Map, Value as JsonValue, json};
use vela_core::provider::ProviderResult;
use vela_core::resource::{Resource, State};

use crate::client::api_error;
use crate::data_sources::app_servers::flatten_product_info;
use crate::data_sources::{data_source_state, filter};
use crate::pagination::list_all;
use crate::provider::HandlerContext;
use crate::utils::{
    attrs_to_json, build_query, normalize_time_rfc3339, path_search, pick, search_array, search_str,
};

const LIST_LIMIT: usize = 100;

const GROUP_FIELDS: &[&str] = &[
    "id",
    "name",
    "description",
    "image_id",
    "os_type",
    "product_id",
    "subnet_id",
    "system_disk_type",
    "system_disk_size",
    "is_vdi",
    "extra_session_type",
    "extra_session_size",
    "app_type",
    "storage_mount_policy",
    "enterprise_project_id",
    "primary_server_group_ids",
    "secondary_server_group_ids",
    "server_group_status",
    "site_type",
    "site_id",
    "app_server_flavor_count",
    "app_server_count",
    "app_group_count",
    "image_name",
    "subnet_name",
    "ou_name",
];

fn query(attributes: &JsonValue) -> String {
    build_query(&[
        ("server_group_name", filter(attributes, "server_group_name")),
        ("server_group_id", filter(attributes, "server_group_id")),
        ("app_type", filter(attributes, "app_type")),
        ("enterprise_project_id", filter(attributes, "enterprise_project_id")),
        (
            "is_secondary_server_group",
            filter(attributes, "is_secondary_server_group"),
        ),
        ("tags", filter(attributes, "tags")),
    ])
}

/// Insert a server time re-rendered as local RFC3339, skipping empty results
fn insert_local_time(target: &mut Map<String, JsonValue>, key: &str, source: &JsonValue) {
    let time = normalize_time_rfc3339(&search_str(key, source, ""), false);
    if !time.is_empty() {
        target.insert(key.to_string(), JsonValue::String(time));
    }
}

fn flatten_scaling_policy(policy: Option<&JsonValue>) -> JsonValue {
    let Some(policy) = policy.filter(|p| p.as_object().is_some_and(|o| !o.is_empty())) else {
        return JsonValue::Null;
    };
    let mut flat = pick(policy, &["enable", "max_scaling_amount", "single_expansion_count"]);
    if let Some(by_session) = path_search("scaling_policy_by_session", policy)
        && by_session.as_object().is_some_and(|o| !o.is_empty())
        && let Some(obj) = flat.as_object_mut()
    {
        obj.insert(
            "scaling_policy_by_session".to_string(),
            json!([pick(
                by_session,
                &["session_usage_threshold", "shrink_after_session_idle_minutes"]
            )]),
        );
    }
    json!([flat])
}

pub(crate) fn flatten_server_groups(groups: &[JsonValue]) -> JsonValue {
    JsonValue::Array(
        groups
            .iter()
            .map(|group| {
                let mut item = match pick(group, GROUP_FIELDS) {
                    JsonValue::Object(map) => map,
                    _ => Map::new(),
                };
                insert_local_time(&mut item, "create_time", group);
                insert_local_time(&mut item, "update_time", group);

                let mut product_info = flatten_product_info(path_search("product_info", group));
                if let Some(info) = product_info.get_mut(0).and_then(|p| p.as_object_mut()) {
                    info.remove("expire_time");
                    if let Some(source) = path_search("product_info", group) {
                        insert_local_time(info, "expire_time", source);
                    }
                }
                item.insert("product_info".to_string(), product_info);
                item.insert(
                    "scaling_policy".to_string(),
                    flatten_scaling_policy(path_search("scaling_policy", group)),
                );
                item.insert(
                    "tags".to_string(),
                    JsonValue::Array(
                        search_array("tags", group)
                            .iter()
                            .map(|t| pick(t, &["key", "value"]))
                            .collect(),
                    ),
                );
                JsonValue::Object(item)
            })
            .collect(),
    )
}

pub async fn read(ctx: &HandlerContext<'_>, resource: &Resource) -> ProviderResult<State> {
    let attributes = attrs_to_json(&resource.attributes);
    let path = format!("v1/{{project_id}}/app-server-groups{}", query(&attributes));
    let groups = list_all(&ctx.client, &path, "items", LIST_LIMIT)
        .await
        .map_err(|e| api_error("error querying server groups", e))?;

    let mut computed = Map::new();
    computed.insert("server_groups".to_string(), flatten_server_groups(&groups));
    Ok(data_source_state(resource, &ctx.region, computed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parse_rfc3339_millis;

    #[test]
    fn query_uses_group_filters() {
        let attrs = json!({"server_group_name": "g1", "is_secondary_server_group": "false"});
        assert_eq!(
            query(&attrs),
            "?server_group_name=g1&is_secondary_server_group=false"
        );
    }

    #[test]
    fn flatten_empty_group() {
        let flat = flatten_server_groups(&[json!({})]);
        assert_eq!(
            flat,
            json!([{"product_info": null, "scaling_policy": null, "tags": []}])
        );
    }

    #[test]
    fn flatten_full_group() {
        let group = json!({
            "id": "g-1",
            "name": "group",
            "system_disk_size": 80,
            "is_vdi": true,
            "primary_server_group_ids": ["g-0"],
            "create_time": "2024-05-01T08:00:00.000Z",
            "update_time": "",
            "product_info": {
                "product_id": "p-1",
                "expire_time": "2025-01-01T00:00:00Z",
                "domain_ids": ["d-1"]
            },
            "scaling_policy": {
                "enable": true,
                "max_scaling_amount": 10,
                "scaling_policy_by_session": {
                    "session_usage_threshold": 80,
                    "shrink_after_session_idle_minutes": 30
                }
            },
            "tags": [{"key": "k", "value": "v"}]
        });
        let flat = flatten_server_groups(&[group]);
        let item = &flat[0];

        assert_eq!(item["id"], "g-1");
        assert_eq!(item["is_vdi"], true);
        assert_eq!(item["primary_server_group_ids"], json!(["g-0"]));
        let created = item["create_time"].as_str().unwrap();
        assert_eq!(parse_rfc3339_millis(created), Some(1_714_550_400_000));
        assert!(item.get("update_time").is_none());

        let expire = item["product_info"][0]["expire_time"].as_str().unwrap();
        assert_eq!(parse_rfc3339_millis(expire), Some(1_735_689_600_000));
        assert_eq!(item["product_info"][0]["domain_ids"], json!(["d-1"]));

        let policy = &item["scaling_policy"][0];
        assert_eq!(policy["max_scaling_amount"], 10);
        assert_eq!(
            policy["scaling_policy_by_session"][0]["shrink_after_session_idle_minutes"],
            30
        );
        assert_eq!(item["tags"][0]["key"], "k");
    }
}
