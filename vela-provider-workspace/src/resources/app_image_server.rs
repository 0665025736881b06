//! workspace_app_image_server resource

use std::time::Duration;

use log::debug;
use serde_json::{Map, Value as JsonValue, json};
use vela_core::provider::{ProviderError, ProviderResult};
use vela_core::resource::{Resource, ResourceId, State};

use crate::client::{api_error, check_deleted};
use crate::provider::HandlerContext;
use crate::resources::app_server::{build_root_volume, build_scheduler_hints, wait_for_app_job};
use crate::resources::{carry_over, has_change, job_id_of, state_from};
use crate::utils::{
    attrs_to_json, expand_tags, normalize_time_rfc3339, path_search, remove_nil, search_array,
    search_str, search_value, value_ignore_empty,
};

const CREATE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(20 * 60);

const IMAGE_SERVERS_PATH: &str = "v1/{project_id}/image-servers";

/// Attributes the service never echoes back
const INPUT_ONLY: &[&str] = &[
    "flavor_id",
    "vpc_id",
    "subnet_id",
    "root_volume",
    "image_source_product_id",
    "is_vdi",
    "availability_zone",
    "ou_name",
    "extra_session_type",
    "extra_session_size",
    "route_policy",
    "tags",
    "scheduler_hints",
    "is_delete_associated_resources",
    "attach_apps",
];

fn job_path(job_id: &str) -> String {
    format!("v1/{{project_id}}/image-server-jobs/{}", job_id)
}

fn build_accounts(d: &JsonValue) -> JsonValue {
    let accounts: Vec<JsonValue> = search_array("authorize_accounts", d)
        .iter()
        .map(|account| {
            json!({
                "account": search_str("account", account, ""),
                "account_type": search_str("type", account, ""),
                "domain": search_str("domain", account, ""),
            })
        })
        .collect();
    value_ignore_empty(JsonValue::Array(accounts))
}

fn build_route_policy(d: &JsonValue) -> JsonValue {
    match path_search("route_policy[0]", d) {
        Some(policy) => json!({
            "max_session": value_ignore_empty(search_value("max_session", policy)),
            "cpu_threshold": value_ignore_empty(search_value("cpu_threshold", policy)),
            "mem_threshold": value_ignore_empty(search_value("mem_threshold", policy)),
        }),
        None => JsonValue::Null,
    }
}

pub(crate) fn build_create_body(d: &JsonValue, eps: Option<String>) -> JsonValue {
    remove_nil(json!({
        "name": search_value("name", d),
        "product_id": search_value("flavor_id", d),
        "vpc_id": search_value("vpc_id", d),
        "subnet_id": search_value("subnet_id", d),
        "root_volume": build_root_volume(d),
        "authorize_accounts": build_accounts(d),
        "image_ref": {
            "id": search_value("image_id", d),
            "image_type": search_value("image_type", d),
            "spce_code": value_ignore_empty(search_value("spec_code", d)),
            "product_id": value_ignore_empty(search_value("image_source_product_id", d)),
        },
        "is_vdi": search_value("is_vdi", d).as_bool().unwrap_or(false),
        "availability_zone": value_ignore_empty(search_value("availability_zone", d)),
        "description": value_ignore_empty(search_value("description", d)),
        "ou_name": value_ignore_empty(search_value("ou_name", d)),
        "extra_session_type": value_ignore_empty(search_value("extra_session_type", d)),
        "extra_session_size": value_ignore_empty(search_value("extra_session_size", d)),
        "route_policy": build_route_policy(d),
        "tags": value_ignore_empty(expand_tags(d.get("tags").unwrap_or(&JsonValue::Null))),
        "enterprise_project_id": eps,
        "scheduler_hints": build_scheduler_hints(d),
        "attach_apps": value_ignore_empty(search_value("attach_apps", d)),
    }))
}

pub(crate) fn flatten_image_server(server: &JsonValue) -> Map<String, JsonValue> {
    let accounts: Vec<JsonValue> = search_array("authorize_accounts", server)
        .iter()
        .map(|account| {
            json!({
                "account": search_value("account", account),
                "type": search_value("account_type", account),
                "domain": search_value("domain", account),
            })
        })
        .collect();

    let mut attrs = Map::new();
    attrs.insert("name".into(), search_value("name", server));
    attrs.insert(
        "authorize_accounts".into(),
        value_ignore_empty(JsonValue::Array(accounts)),
    );
    attrs.insert("image_id".into(), search_value("image_ref.id", server));
    attrs.insert("image_type".into(), search_value("image_ref.image_type", server));
    attrs.insert("spec_code".into(), search_value("image_ref.spce_code", server));
    attrs.insert("description".into(), search_value("description", server));
    attrs.insert(
        "enterprise_project_id".into(),
        search_value("enterprise_project_id", server),
    );
    attrs.insert(
        "created_at".into(),
        value_ignore_empty(JsonValue::String(normalize_time_rfc3339(
            &search_str("create_time", server, ""),
            false,
        ))),
    );
    attrs
}

/// Look up an image server; the list API answers 200 even when nothing matches
async fn get_image_server(ctx: &HandlerContext<'_>, server_id: &str) -> ProviderResult<JsonValue> {
    let path = format!(
        "{}?server_id={}",
        IMAGE_SERVERS_PATH,
        urlencoding::encode(server_id)
    );
    let body = ctx.client.get(&path).await.map_err(|e| {
        api_error(format!("error retrieving image server ({})", server_id), e)
    })?;
    path_search("items|[0]", &body)
        .cloned()
        .ok_or_else(|| ProviderError::not_found(format!("image server ({}) not found", server_id)))
}

pub async fn create(ctx: &HandlerContext<'_>, resource: &Resource) -> ProviderResult<State> {
    let d = attrs_to_json(&resource.attributes);
    let body = build_create_body(&d, ctx.config.enterprise_project_for(resource));
    let resp = ctx
        .client
        .post(IMAGE_SERVERS_PATH, &body)
        .await
        .map_err(|e| api_error("error creating image server of Workspace APP", e))?;

    let job_id = job_id_of(&resp)?;
    let job = wait_for_app_job(ctx, &job_path(&job_id), &job_id, CREATE_TIMEOUT).await?;
    let server_id = search_str("sub_jobs|[0].job_resource_info.resource_id", &job, "");
    if server_id.is_empty() {
        return Err(ProviderError::new(
            "unable to find image server ID from API response",
        ));
    }
    debug!("image server {} created by job {}", server_id, job_id);

    let desired = State::existing(resource.id.clone(), resource.attributes.clone());
    read(ctx, &resource.id, &server_id, Some(&desired)).await
}

pub async fn read(
    ctx: &HandlerContext<'_>,
    id: &ResourceId,
    identifier: &str,
    prior: Option<&State>,
) -> ProviderResult<State> {
    let prior = prior
        .map(|s| attrs_to_json(&s.attributes))
        .unwrap_or(JsonValue::Null);

    let server = match get_image_server(ctx, identifier).await {
        Ok(server) => server,
        Err(e) => return check_deleted(id, e),
    };
    let mut attrs = flatten_image_server(&server);
    carry_over(&mut attrs, &prior, INPUT_ONLY);
    Ok(state_from(id, identifier, &ctx.region, attrs))
}

pub async fn update(
    ctx: &HandlerContext<'_>,
    id: &ResourceId,
    identifier: &str,
    from: &State,
    to: &Resource,
) -> ProviderResult<State> {
    let old = attrs_to_json(&from.attributes);
    let new = attrs_to_json(&to.attributes);

    // Only name and description are editable; other changes stay local
    if has_change(&old, &new, &["name", "description"]) {
        let body = json!({
            "name": search_value("name", &new),
            "description": search_str("description", &new, ""),
        });
        ctx.client
            .patch(&format!("{}/{}", IMAGE_SERVERS_PATH, identifier), &body)
            .await
            .map_err(|e| {
                api_error(
                    format!("error updating image server ({}) of Workspace APP", identifier),
                    e,
                )
            })?;
    }

    let desired = State::existing(id.clone(), to.attributes.clone());
    read(ctx, id, identifier, Some(&desired)).await
}

pub async fn delete(
    ctx: &HandlerContext<'_>,
    id: &ResourceId,
    identifier: &str,
    prior: &State,
) -> ProviderResult<()> {
    let prior = attrs_to_json(&prior.attributes);
    let body = json!({
        "items": [identifier],
        "recursive": search_value("is_delete_associated_resources", &prior)
            .as_bool()
            .unwrap_or(false),
    });
    let resp = match ctx
        .client
        .patch(&format!("{}/actions/batch-delete", IMAGE_SERVERS_PATH), &body)
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            let err = api_error(format!("error deleting image server ({})", identifier), e);
            return check_deleted(id, err).map(|_| ());
        }
    };

    let job_id = job_id_of(&resp)?;
    wait_for_app_job(ctx, &job_path(&job_id), &job_id, DELETE_TIMEOUT).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_body_maps_image_ref_and_accounts() {
        let d = json!({
            "name": "builder",
            "flavor_id": "p-1",
            "vpc_id": "vpc-1",
            "subnet_id": "subnet-1",
            "root_volume": [{"type": "SAS", "size": 80}],
            "authorize_accounts": [{"account": "alice", "type": "USER"}],
            "image_id": "img-1",
            "image_type": "gold",
            "spec_code": "",
            "route_policy": [{"max_session": 3}],
            "tags": {"b": "2", "a": "1"}
        });
        let body = build_create_body(&d, Some("eps-1".to_string()));
        assert_eq!(body["product_id"], "p-1");
        assert_eq!(
            body["image_ref"],
            json!({"id": "img-1", "image_type": "gold"})
        );
        assert_eq!(
            body["authorize_accounts"],
            json!([{"account": "alice", "account_type": "USER", "domain": ""}])
        );
        assert_eq!(body["route_policy"], json!({"max_session": 3}));
        assert_eq!(body["tags"][0]["key"], "a");
        assert_eq!(body["is_vdi"], false);
        assert_eq!(body["enterprise_project_id"], "eps-1");
        assert!(body.get("attach_apps").is_none());
        assert!(body.get("scheduler_hints").is_none());
    }

    #[test]
    fn flatten_maps_account_type() {
        let server = json!({
            "name": "builder",
            "authorize_accounts": [{"account": "alice", "account_type": "USER", "domain": "corp"}],
            "image_ref": {"id": "img-1", "image_type": "gold", "spce_code": "s-1"},
            "enterprise_project_id": "0"
        });
        let attrs = flatten_image_server(&server);
        assert_eq!(
            attrs["authorize_accounts"],
            json!([{"account": "alice", "type": "USER", "domain": "corp"}])
        );
        assert_eq!(attrs["spec_code"], "s-1");
        assert_eq!(attrs["image_id"], "img-1");
        assert_eq!(attrs["created_at"], JsonValue::Null);
    }
}
