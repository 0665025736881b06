//! workspace_app_server resource

use std::time::Duration;

use log::{debug, warn};
use serde_json::{Map, Value as JsonValue, json};
use vela_core::provider::{ProviderError, ProviderResult};
use vela_core::resource::{Resource, ResourceId, State};

use crate::client::{api_error, check_deleted};
use crate::provider::HandlerContext;
use crate::resources::{carry_over, job_id_of, state_from};
use crate::utils::{
    attrs_to_json, path_search, remove_nil, search_bool, search_i64, search_str, search_value,
    value_ignore_empty,
};
use crate::wait::StateWaiter;

const CREATE_TIMEOUT: Duration = Duration::from_secs(40 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

const SERVERS_PATH: &str = "v1/{project_id}/app-servers";

fn server_path(server_id: &str) -> String {
    format!("{}/{}", SERVERS_PATH, server_id)
}

fn job_path(job_id: &str) -> String {
    format!("v2/{{project_id}}/job/{}", job_id)
}

pub(crate) fn build_scheduler_hints(d: &JsonValue) -> Option<JsonValue> {
    path_search("scheduler_hints[0]", d).map(|hint| {
        json!({
            "dedicated_host_id": search_value("dedicated_host_id", hint),
            "tenancy": search_value("tenancy", hint),
        })
    })
}

pub(crate) fn build_root_volume(d: &JsonValue) -> Option<JsonValue> {
    path_search("root_volume[0]", d).map(|volume| {
        json!({
            "type": search_value("type", volume),
            "size": search_value("size", volume),
        })
    })
}

pub(crate) fn build_create_body(d: &JsonValue) -> JsonValue {
    let scheduler_hints = build_scheduler_hints(d);
    let root_volume = build_root_volume(d);
    remove_nil(json!({
        "server_group_id": search_value("server_group_id", d),
        "type": search_value("type", d),
        "product_id": search_value("flavor_id", d),
        "subscription_num": 1,
        "root_volume": root_volume,
        "vpc_id": search_value("vpc_id", d),
        "subnet_id": search_value("subnet_id", d),
        "os_type": value_ignore_empty(search_value("os_type", d)),
        "availability_zone": value_ignore_empty(search_value("availability_zone", d)),
        "update_access_agent": search_bool("update_access_agent", d, true),
        "ou_name": value_ignore_empty(search_value("ou_name", d)),
        "scheduler_hints": scheduler_hints,
    }))
}

/// PATCH body with the changed editable fields, or `None` when nothing changed
pub(crate) fn build_patch_body(old: &JsonValue, new: &JsonValue) -> Option<JsonValue> {
    let mut body = Map::new();
    for key in ["name", "description", "maintain_status"] {
        if old.get(key) != new.get(key) {
            let value = match (key, new.get(key)) {
                (_, Some(value)) => value.clone(),
                ("maintain_status", None) => JsonValue::Bool(false),
                (_, None) => JsonValue::String(String::new()),
            };
            body.insert(key.to_string(), value);
        }
    }
    if body.is_empty() {
        None
    } else {
        Some(JsonValue::Object(body))
    }
}

fn flatten_charging_mode(server: &JsonValue) -> JsonValue {
    match search_str("metadata.charging_mode", server, "").as_str() {
        "1" => json!("prePaid"),
        "0" => json!("postPaid"),
        _ => {
            warn!("error parsing charging_mode from API response");
            JsonValue::Null
        }
    }
}

pub(crate) fn flatten_server(server: &JsonValue) -> Map<String, JsonValue> {
    let mut attrs = Map::new();
    for key in [
        "server_group_id",
        "name",
        "os_type",
        "availability_zone",
        "description",
        "ou_name",
        "maintain_status",
    ] {
        attrs.insert(key.into(), search_value(key, server));
    }
    attrs.insert(
        "flavor_id".into(),
        search_value("product_info.product_id", server),
    );
    attrs.insert(
        "root_volume".into(),
        match path_search("product_info", server) {
            // The disk size comes back as a string
            Some(info) => json!([{
                "type": search_value("system_disk_type", info),
                "size": search_i64("system_disk_size", info, 0),
            }]),
            None => JsonValue::Null,
        },
    );
    attrs.insert("charging_mode".into(), flatten_charging_mode(server));
    attrs
}

async fn get_server(ctx: &HandlerContext<'_>, server_id: &str) -> ProviderResult<JsonValue> {
    ctx.client
        .get(&server_path(server_id))
        .await
        .map_err(|e| api_error("error retrieving Workspace APP server", e))
}

/// Poll the APP job at `path` until it succeeds and return its final body
pub(crate) async fn wait_for_app_job(
    ctx: &HandlerContext<'_>,
    path: &str,
    job_id: &str,
    timeout: Duration,
) -> ProviderResult<JsonValue> {
    let waiter = StateWaiter::new(&["RUNNING"], &["SUCCESS"], timeout)
        .with_delay(Duration::from_secs(10))
        .with_poll_interval(Duration::from_secs(30))
        .for_config(ctx.config);
    let job = waiter
        .wait(|| async {
            let body = ctx
                .client
                .get(path)
                .await
                .map_err(|e| api_error("error retrieving job details", e))?;
            let status = search_str("status", &body, "");
            Ok((Some(body), status))
        })
        .await
        .map_err(|e| {
            ProviderError::new(format!("error waiting for the job ({}) completed: {}", job_id, e))
                .with_kind(e.kind)
        })?;
    Ok(job.unwrap_or(JsonValue::Null))
}

async fn patch_server(ctx: &HandlerContext<'_>, server_id: &str, body: &JsonValue) -> ProviderResult<()> {
    ctx.client
        .patch(&server_path(server_id), body)
        .await
        .map_err(|e| api_error(format!("error updating the server ({})", server_id), e))?;
    Ok(())
}

pub async fn create(ctx: &HandlerContext<'_>, resource: &Resource) -> ProviderResult<State> {
    let d = attrs_to_json(&resource.attributes);
    if search_str("charging_mode", &d, "") == "prePaid" {
        return Err(ProviderError::validation(
            "prePaid APP servers are not supported, use postPaid",
        ));
    }

    let server_group_id = search_str("server_group_id", &d, "");
    let resp = ctx
        .client
        .post(
            &format!("{}/actions/create", SERVERS_PATH),
            &build_create_body(&d),
        )
        .await
        .map_err(|e| {
            api_error(
                format!(
                    "error creating Workspace APP server under specified server group ({})",
                    server_group_id
                ),
                e,
            )
        })?;

    let job_id = job_id_of(&resp)?;
    let job = wait_for_app_job(ctx, &job_path(&job_id), &job_id, CREATE_TIMEOUT).await?;
    let server_id = search_str("sub_jobs|[0].job_resource_info.resource_id", &job, "");
    if server_id.is_empty() {
        return Err(ProviderError::new("unable to find server ID from API response"));
    }
    debug!("APP server {} created by job {}", server_id, job_id);

    if let Some(body) = build_patch_body(&json!({}), &d) {
        patch_server(ctx, &server_id, &body).await?;
    }

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

    let server = match get_server(ctx, identifier).await {
        Ok(server) => server,
        Err(e) => return check_deleted(id, e),
    };
    let mut attrs = flatten_server(&server);
    carry_over(
        &mut attrs,
        &prior,
        &["type", "vpc_id", "subnet_id", "update_access_agent", "scheduler_hints"],
    );
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
    if let Some(body) = build_patch_body(&old, &new) {
        patch_server(ctx, identifier, &body).await?;
    }

    let desired = State::existing(id.clone(), to.attributes.clone());
    read(ctx, id, identifier, Some(&desired)).await
}

pub async fn delete(
    ctx: &HandlerContext<'_>,
    id: &ResourceId,
    identifier: &str,
    _prior: &State,
) -> ProviderResult<()> {
    // Deleting a server that does not exist still returns 200
    match ctx.client.delete(&server_path(identifier)).await {
        Ok(resp) => {
            let job_id = search_str("job_id", &resp, "");
            if job_id.is_empty() {
                warn!("unable to find job ID from API response");
            } else {
                wait_for_app_job(ctx, &job_path(&job_id), &job_id, DELETE_TIMEOUT).await?;
            }
        }
        Err(e) => {
            let err = api_error("error deleting Workspace APP server", e);
            return check_deleted(id, err).map(|_| ());
        }
    }

    let waiter = StateWaiter::new(&["PENDING"], &["COMPLETED"], DELETE_TIMEOUT)
        .with_delay(Duration::from_secs(10))
        .with_poll_interval(Duration::from_secs(20))
        .for_config(ctx.config);
    waiter
        .wait(|| async {
            match get_server(ctx, identifier).await {
                Ok(server) => Ok((Some(server), "PENDING".to_string())),
                Err(e) if e.is_not_found() => Ok((None, "COMPLETED".to_string())),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| {
            ProviderError::new(format!(
                "error waiting for Workspace APP server ({}) deleted: {}",
                identifier, e
            ))
            .with_kind(e.kind)
        })?;
    Ok(())
}
