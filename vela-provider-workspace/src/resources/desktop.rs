//! workspace_desktop resource

use std::time::Duration;

use log::{debug, error, warn};
use serde_json::{Map, Value as JsonValue, json};
use vela_core::provider::{ProviderError, ProviderResult};
use vela_core::resource::{Resource, ResourceId, State};

use crate::client::{api_error, check_deleted, error_code_of};
use crate::jobs::wait_for_workspace_job;
use crate::provider::HandlerContext;
use crate::resources::{carry_over, has_change, job_id_of, state_from};
use crate::retry::retry_while;
use crate::utils::{
    attrs_to_json, expand_tags, flatten_tags_to_map, path_search, pluck, project, remove_nil,
    search_array, search_bool, search_i64, search_str, search_value, value_ignore_empty,
};
use crate::wait::StateWaiter;

const CREATE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(20 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

const DESKTOPS_PATH: &str = "v2/{project_id}/desktops";

/// Volume type whose QoS (iops and throughput) can be configured
const QOS_VOLUME_TYPE: &str = "GPSSD2";
/// Raised while an earlier volume addition is still running
const ADDING_VOLUMES_CODE: &str = "WKS.0407";

/// Attributes the service never returns
const INPUT_ONLY: &[&str] = &[
    "user_email",
    "email_notification",
    "delete_user",
    "power_action",
    "power_action_type",
    "image_type",
];

fn desktop_path(desktop_id: &str) -> String {
    format!("{}/{}", DESKTOPS_PATH, desktop_id)
}

// =============================================================================
// Request Bodies
// =============================================================================

fn build_volume(volume: &JsonValue) -> JsonValue {
    json!({
        "type": search_value("type", volume),
        "size": search_value("size", volume),
        "iops": value_ignore_empty(search_value("iops", volume)),
        "throughput": value_ignore_empty(search_value("throughput", volume)),
        "kms_id": value_ignore_empty(search_value("kms_id", volume)),
    })
}

fn string_list(value: Option<&JsonValue>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn build_create_body(d: &JsonValue, enterprise_project_id: Option<String>) -> JsonValue {
    let data_volumes: Vec<JsonValue> = search_array("data_volume", d).iter().map(build_volume).collect();
    let nics: Vec<JsonValue> = search_array("nic", d)
        .iter()
        .map(|nic| json!({"subnet_id": search_value("network_id", nic)}))
        .collect();
    let security_groups: Vec<JsonValue> = string_list(d.get("security_groups"))
        .into_iter()
        .map(|id| json!({"id": id}))
        .collect();

    remove_nil(json!({
        "desktops": [{
            "user_name": search_str("user_name", d, ""),
            "user_email": search_str("user_email", d, ""),
            "user_group": search_str("user_group", d, ""),
            "computer_name": value_ignore_empty(search_value("name", d)),
        }],
        "desktop_type": "DEDICATED",
        "product_id": search_str("flavor_id", d, ""),
        "root_volume": path_search("root_volume[0]", d).map(build_volume),
        "availability_zone": value_ignore_empty(search_value("availability_zone", d)),
        "image_type": search_str("image_type", d, ""),
        "image_id": search_str("image_id", d, ""),
        "vpc_id": search_str("vpc_id", d, ""),
        "email_notification": search_bool("email_notification", d, false),
        "data_volumes": value_ignore_empty(JsonValue::Array(data_volumes)),
        "nics": value_ignore_empty(JsonValue::Array(nics)),
        "security_groups": value_ignore_empty(JsonValue::Array(security_groups)),
        "tags": value_ignore_empty(expand_tags(d.get("tags").unwrap_or(&JsonValue::Null))),
        "enterprise_project_id": enterprise_project_id.filter(|e| !e.is_empty()),
    }))
}

/// Tags to remove (gone or changed) and tags to create (new or changed)
pub(crate) fn tag_changes(old: &JsonValue, new: &JsonValue) -> (Vec<JsonValue>, Vec<JsonValue>) {
    let empty = Map::new();
    let old = old.get("tags").and_then(|t| t.as_object()).unwrap_or(&empty);
    let new = new.get("tags").and_then(|t| t.as_object()).unwrap_or(&empty);

    let removed: Map<String, JsonValue> = old
        .iter()
        .filter(|(k, v)| new.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let added: Map<String, JsonValue> = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let as_list = |tags: Map<String, JsonValue>| match expand_tags(&JsonValue::Object(tags)) {
        JsonValue::Array(list) => list,
        _ => Vec::new(),
    };
    (as_list(removed), as_list(added))
}

// =============================================================================
// Volumes
// =============================================================================

fn qos_changed(old: &JsonValue, new: &JsonValue) -> bool {
    ["iops", "throughput"]
        .iter()
        .any(|key| new.get(*key).is_some() && new.get(*key) != old.get(*key))
}

/// Problems with a volume list change; empty when the change is allowed
pub(crate) fn volume_change_errors(old: &[JsonValue], new: &[JsonValue]) -> Vec<String> {
    if new.len() < old.len() {
        return vec!["the number of volumes cannot be reduced".to_string()];
    }

    let mut errors = Vec::new();
    for (old_volume, new_volume) in old.iter().zip(new) {
        let new_type = search_str("type", new_volume, "");
        let name = search_str("name", old_volume, "");
        if new_type != search_str("type", old_volume, "") {
            errors.push("volume type does not support updates".to_string());
        }
        let (old_size, new_size) = (
            search_i64("size", old_volume, 0),
            search_i64("size", new_volume, 0),
        );
        if new_size < old_size {
            errors.push(format!(
                "volume ({}) size (old:{}, new:{}) cannot be smaller than the size before the change",
                name, old_size, new_size
            ));
        }
        if new_type != QOS_VOLUME_TYPE && qos_changed(old_volume, new_volume) {
            errors.push(format!(
                "the type of the volume ({}) is not {}, cannot set QoS options",
                name, QOS_VOLUME_TYPE
            ));
        }
    }

    for (index, volume) in new.iter().enumerate().skip(old.len()) {
        if search_str("type", volume, "") == QOS_VOLUME_TYPE
            && (search_i64("iops", volume, 0) == 0 || search_i64("throughput", volume, 0) == 0)
        {
            errors.push(format!(
                "the type of the volume (index number: {}) is {}, iops and throughput cannot be empty",
                index, QOS_VOLUME_TYPE
            ));
        }
    }
    errors
}

pub(crate) fn build_add_volumes_body(
    desktop_id: &str,
    old: &[JsonValue],
    new: &[JsonValue],
) -> Option<JsonValue> {
    if new.len() <= old.len() {
        return None;
    }
    let volumes: Vec<JsonValue> = new[old.len()..].iter().map(build_volume).collect();
    Some(remove_nil(json!({
        "addDesktopVolumesReq": [{
            "desktop_id": desktop_id,
            "volumes": volumes,
        }]
    })))
}

pub(crate) fn build_expand_volumes_body(
    desktop_id: &str,
    old: &[JsonValue],
    new: &[JsonValue],
) -> Option<JsonValue> {
    let expansions: Vec<JsonValue> = old
        .iter()
        .zip(new)
        .filter(|(o, n)| search_i64("size", n, 0) > search_i64("size", o, 0))
        .map(|(o, n)| {
            json!({
                "desktop_id": desktop_id,
                "volume_id": search_str("id", o, ""),
                "new_size": search_i64("size", n, 0),
            })
        })
        .collect();
    if expansions.is_empty() {
        return None;
    }
    Some(json!({"desktop_volumes_expansion": expansions}))
}

/// One QoS request per GPSSD2 volume whose iops or throughput changed
pub(crate) fn build_qos_changes(old: &[JsonValue], new: &[JsonValue]) -> Vec<JsonValue> {
    old.iter()
        .zip(new)
        .filter(|(o, n)| search_str("type", n, "") == QOS_VOLUME_TYPE && qos_changed(o, n))
        .map(|(o, n)| {
            json!({
                "volume_ids": [search_str("id", o, "")],
                "qos": {
                    "iops": search_i64("iops", n, 0),
                    "throughput": search_i64("throughput", n, 0),
                },
            })
        })
        .collect()
}

async fn post_and_wait(
    ctx: &HandlerContext<'_>,
    path: &str,
    body: &JsonValue,
    context: &str,
) -> ProviderResult<()> {
    let resp = ctx
        .client
        .post(path, body)
        .await
        .map_err(|e| api_error(context, e))?;
    let job_id = search_str("job_id", &resp, "");
    wait_for_workspace_job(&ctx.client, ctx.config, &job_id, None, UPDATE_TIMEOUT).await?;
    debug!("the job ({}) has been completed", job_id);
    Ok(())
}

async fn add_volumes(ctx: &HandlerContext<'_>, body: &JsonValue) -> ProviderResult<()> {
    let path = "v2/{project_id}/volumes";
    let interval = ctx.config.wait_duration(Duration::from_secs(5 * 60));
    let resp = retry_while(
        UPDATE_TIMEOUT,
        interval,
        |e| error_code_of(e) == Some(ADDING_VOLUMES_CODE),
        || async {
            ctx.client
                .post(path, body)
                .await
                .map_err(|e| api_error("unable to add volumes for desktop", e))
        },
    )
    .await?;
    let job_id = search_str("job_id", &resp, "");
    wait_for_workspace_job(&ctx.client, ctx.config, &job_id, None, UPDATE_TIMEOUT).await?;
    debug!("the add volumes job ({}) has been completed", job_id);
    Ok(())
}

async fn update_volumes(
    ctx: &HandlerContext<'_>,
    desktop_id: &str,
    old: &JsonValue,
    new: &JsonValue,
    role: &str,
) -> ProviderResult<()> {
    let old_volumes = search_array(role, old);
    let new_volumes = search_array(role, new);

    let errors = volume_change_errors(old_volumes, new_volumes);
    if !errors.is_empty() {
        return Err(ProviderError::validation(errors.join("; ")));
    }

    if let Some(body) = build_add_volumes_body(desktop_id, old_volumes, new_volumes) {
        add_volumes(ctx, &body).await?;
    }
    if let Some(body) = build_expand_volumes_body(desktop_id, old_volumes, new_volumes) {
        post_and_wait(
            ctx,
            "v2/{project_id}/volumes/expand",
            &body,
            "unable to expand volume size",
        )
        .await?;
    }
    for change in build_qos_changes(old_volumes, new_volumes) {
        let resp = ctx
            .client
            .put("v2/{project_id}/volumes/batch-modify-qos", &change)
            .await
            .map_err(|e| api_error("unable to change volume QoS", e))?;
        let job_id = search_str("job_id", &resp, "");
        wait_for_workspace_job(&ctx.client, ctx.config, &job_id, None, UPDATE_TIMEOUT).await?;
        debug!("the change volume QoS job ({}) has been completed", job_id);
    }
    Ok(())
}

// =============================================================================
// Flatten
// =============================================================================

fn flatten_volume(volume: &JsonValue) -> JsonValue {
    project(
        volume,
        &[
            ("type", "type"),
            ("size", "size"),
            ("iops", "iops"),
            ("throughput", "throughput"),
            ("id", "volume_id"),
            ("name", "display_name"),
            ("device", "device"),
            ("created_at", "create_time"),
        ],
    )
}

/// Data volumes sorted by device; the service returns them unordered
pub(crate) fn flatten_data_volumes(volumes: &[JsonValue]) -> JsonValue {
    let mut flat: Vec<JsonValue> = volumes.iter().map(flatten_volume).collect();
    flat.sort_by_key(|v| search_str("device", v, ""));
    JsonValue::Array(flat)
}

/// Desktop details as attributes; missing image or security groups are
/// reported together
pub(crate) fn flatten_desktop(desktop: &JsonValue) -> Result<Map<String, JsonValue>, String> {
    let mut attrs = Map::new();
    attrs.insert("flavor_id".into(), search_value("product.product_id", desktop));
    attrs.insert("user_name".into(), search_value("user_name", desktop));
    attrs.insert(
        "root_volume".into(),
        match path_search("root_volume", desktop) {
            Some(volume) => json!([flatten_volume(volume)]),
            None => JsonValue::Null,
        },
    );
    attrs.insert(
        "data_volume".into(),
        flatten_data_volumes(search_array("data_volumes", desktop)),
    );
    attrs.insert("availability_zone".into(), search_value("availability_zone", desktop));
    attrs.insert("user_group".into(), search_value("user_group", desktop));
    attrs.insert("name".into(), search_value("computer_name", desktop));
    attrs.insert(
        "tags".into(),
        flatten_tags_to_map(path_search("tags", desktop).unwrap_or(&JsonValue::Null)),
    );
    attrs.insert(
        "enterprise_project_id".into(),
        search_value("enterprise_project_id", desktop),
    );
    attrs.insert("status".into(), search_value("status", desktop));

    let mut errors = Vec::new();
    let image_id = search_str("metadata.\"metering.image_id\"", desktop, "");
    if image_id.is_empty() {
        errors.push("the image_id field does not found in metadata structure");
    } else {
        attrs.insert("image_id".into(), JsonValue::String(image_id));
    }
    let security_groups = pluck("security_groups", "id", desktop);
    if security_groups.is_empty() {
        errors.push("the security_groups field does not found in API response");
    } else {
        attrs.insert("security_groups".into(), JsonValue::Array(security_groups));
    }

    if errors.is_empty() {
        Ok(attrs)
    } else {
        Err(errors.join("; "))
    }
}

// =============================================================================
// Remote Calls
// =============================================================================

async fn get_desktop(ctx: &HandlerContext<'_>, desktop_id: &str) -> ProviderResult<JsonValue> {
    let body = ctx
        .client
        .get(&desktop_path(desktop_id))
        .await
        .map_err(|e| api_error("error retrieving Workspace desktop", e))?;
    Ok(search_value("desktop", &body))
}

async fn get_desktop_nic(ctx: &HandlerContext<'_>, desktop_id: &str) -> ProviderResult<JsonValue> {
    let body = ctx
        .client
        .get(&format!("{}/networks", desktop_path(desktop_id)))
        .await
        .map_err(|e| api_error("error getting desktop network info", e))?;
    let network = path_search("network_infos[0]", &body).ok_or_else(|| {
        ProviderError::new(format!(
            "unable to find any network information under Workspace desktop ({})",
            desktop_id
        ))
    })?;
    Ok(json!([{"network_id": search_value("subnet_info.id", network)}]))
}

/// Status a desktop settles in after a power action
fn power_action_target(action: &str) -> Option<&'static str> {
    match action {
        "os-start" | "reboot" => Some("ACTIVE"),
        "os-stop" => Some("SHUTOFF"),
        "os-hibernate" => Some("HIBERNATED"),
        _ => None,
    }
}

/// The action is complete once no task is running and the target status shows
pub(crate) fn power_action_status(desktop: &JsonValue, action: &str) -> &'static str {
    let idle = search_str("task_status", desktop, "").is_empty();
    let status = search_str("status", desktop, "");
    if idle && power_action_target(action) == Some(status.as_str()) {
        "COMPLETED"
    } else {
        "PENDING"
    }
}

async fn update_power_action(
    ctx: &HandlerContext<'_>,
    desktop_id: &str,
    d: &JsonValue,
    timeout: Duration,
) -> ProviderResult<()> {
    let action = search_str("power_action", d, "");
    let body = remove_nil(json!({
        "desktop_ids": [desktop_id],
        "op_type": action,
        "type": value_ignore_empty(search_value("power_action_type", d)),
    }));
    ctx.client
        .post(&format!("{}/action", DESKTOPS_PATH), &body)
        .await
        .map_err(|e| {
            api_error(
                format!("error updating the power action of the Workspace desktop ({})", desktop_id),
                e,
            )
        })?;

    // Start and reboot both settle in ACTIVE, so the target is confirmed twice
    let waiter = StateWaiter::new(&["PENDING"], &["COMPLETED"], timeout)
        .with_delay(Duration::from_secs(10))
        .with_poll_interval(Duration::from_secs(10))
        .with_continuous_target(2)
        .for_config(ctx.config);
    waiter
        .wait(|| async {
            let desktop = get_desktop(ctx, desktop_id).await?;
            let status = power_action_status(&desktop, &action);
            Ok((Some(desktop), status.to_string()))
        })
        .await
        .map_err(|e| {
            ProviderError::new(format!(
                "error waiting for power action ({}) for desktop ({}) failed: {}",
                action, desktop_id, e
            ))
            .with_kind(e.kind)
        })?;
    Ok(())
}

async fn update_flavor(ctx: &HandlerContext<'_>, desktop_id: &str, d: &JsonValue) -> ProviderResult<()> {
    let body = json!({
        "desktops": [{"desktop_id": desktop_id}],
        "product_id": search_str("flavor_id", d, ""),
        "mode": "STOP_DESKTOP",
    });
    post_and_wait(
        ctx,
        &format!("{}/resize", DESKTOPS_PATH),
        &body,
        "error updating desktop product",
    )
    .await
}

async fn update_image(ctx: &HandlerContext<'_>, desktop_id: &str, d: &JsonValue) -> ProviderResult<()> {
    let body = json!({
        "desktop_ids": [desktop_id],
        "image_type": search_str("image_type", d, ""),
        "image_id": search_str("image_id", d, ""),
    });
    post_and_wait(
        ctx,
        &format!("{}/rebuild", DESKTOPS_PATH),
        &body,
        "error rebuild Workspace desktop",
    )
    .await
}

async fn update_tags(
    ctx: &HandlerContext<'_>,
    desktop_id: &str,
    old: &JsonValue,
    new: &JsonValue,
) -> ProviderResult<()> {
    let path = format!("{}/tags/action", desktop_path(desktop_id));
    let (removed, added) = tag_changes(old, new);
    let context = format!("error updating tags of Workspace desktop ({})", desktop_id);
    if !removed.is_empty() {
        ctx.client
            .post(&path, &json!({"action": "delete", "tags": removed}))
            .await
            .map_err(|e| api_error(&context, e))?;
    }
    if !added.is_empty() {
        ctx.client
            .post(&path, &json!({"action": "create", "tags": added}))
            .await
            .map_err(|e| api_error(&context, e))?;
    }
    Ok(())
}

async fn update_network(ctx: &HandlerContext<'_>, desktop_id: &str, d: &JsonValue) -> ProviderResult<()> {
    let Some(nic) = path_search("nic[0]", d) else {
        return Ok(());
    };
    let body = json!({
        "vpc_id": search_str("vpc_id", d, ""),
        "subnet_id": search_value("network_id", nic),
        "security_group_ids": string_list(d.get("security_groups")),
    });
    let resp = ctx
        .client
        .put(&format!("{}/networks", desktop_path(desktop_id)), &body)
        .await
        .map_err(|e| {
            api_error(
                format!("error updating the network of the Workspace desktop ({})", desktop_id),
                e,
            )
        })?;
    let job_id = search_str("job_id", &resp, "");
    wait_for_workspace_job(&ctx.client, ctx.config, &job_id, None, UPDATE_TIMEOUT).await?;
    debug!("the job ({}) has been completed", job_id);
    Ok(())
}

// =============================================================================
// Lifecycle
// =============================================================================

pub async fn create(ctx: &HandlerContext<'_>, resource: &Resource) -> ProviderResult<State> {
    let d = attrs_to_json(&resource.attributes);
    let body = build_create_body(&d, ctx.config.enterprise_project_for(resource));
    let resp = ctx
        .client
        .post(DESKTOPS_PATH, &body)
        .await
        .map_err(|e| api_error("error creating Workspace desktop", e))?;

    let job_id = job_id_of(&resp)?;
    let desktop_id =
        wait_for_workspace_job(&ctx.client, ctx.config, &job_id, None, CREATE_TIMEOUT).await?;
    debug!("the job ({}) has been completed", job_id);

    match search_str("power_action", &d, "").as_str() {
        "" => {}
        "os-start" => warn!("the power action (os-start) is invalid after desktop created"),
        _ => update_power_action(ctx, &desktop_id, &d, CREATE_TIMEOUT).await?,
    }

    let desired = State::existing(resource.id.clone(), resource.attributes.clone());
    read(ctx, &resource.id, &desktop_id, Some(&desired)).await
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

    let desktop = match get_desktop(ctx, identifier).await {
        Ok(desktop) => desktop,
        Err(e) => return check_deleted(id, e),
    };
    let mut attrs = flatten_desktop(&desktop)
        .map_err(|e| ProviderError::new(format!("error setting desktop fields: {}", e)))?;

    // Not available in every region
    match get_desktop_nic(ctx, identifier).await {
        Ok(nic) => {
            attrs.insert("nic".into(), nic);
        }
        Err(e) => error!("{}", e),
    }

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

    if has_change(&old, &new, &["flavor_id"]) {
        update_flavor(ctx, identifier, &new).await?;
    }
    if has_change(&old, &new, &["image_type", "image_id"]) {
        update_image(ctx, identifier, &new).await?;
    }
    if has_change(&old, &new, &["root_volume", "data_volume"]) {
        update_volumes(ctx, identifier, &old, &new, "root_volume").await?;
        if new.get("data_volume").is_some() {
            update_volumes(ctx, identifier, &old, &new, "data_volume").await?;
        }
    }
    if has_change(&old, &new, &["tags"]) {
        update_tags(ctx, identifier, &old, &new).await?;
    }
    if new.get("nic").is_some() && has_change(&old, &new, &["nic"]) {
        update_network(ctx, identifier, &new).await?;
    }
    if new.get("enterprise_project_id").is_some() && has_change(&old, &new, &["enterprise_project_id"]) {
        warn!(
            "{}.{}: moving a desktop between enterprise projects is not supported, keeping {}",
            id.resource_type,
            id.name,
            search_str("enterprise_project_id", &old, "")
        );
    }
    if new.get("power_action").is_some() && has_change(&old, &new, &["power_action"]) {
        update_power_action(ctx, identifier, &new, UPDATE_TIMEOUT).await?;
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
    let d = attrs_to_json(&prior.attributes);
    let delete_user = search_bool("delete_user", &d, false);
    let path = format!(
        "{}?delete_users={}&email_notification={}",
        desktop_path(identifier),
        delete_user,
        search_bool("email_notification", &d, false)
    );
    if let Err(e) = ctx.client.delete(&path).await {
        let err = api_error(format!("error deleting desktop ({})", identifier), e);
        return check_deleted(id, err).map(|_| ());
    }

    let deleted = StateWaiter::new(
        &["ACTIVE", "DELETING", "SHUTOFF", "HIBERNATED"],
        &["DELETED"],
        DELETE_TIMEOUT,
    )
    .with_delay(Duration::from_secs(10))
    .with_poll_interval(Duration::from_secs(10))
    .for_config(ctx.config);
    deleted
        .wait(|| async {
            match get_desktop(ctx, identifier).await {
                Ok(desktop) => {
                    // The status is empty while the machine is being torn down
                    let status = search_str("status", &desktop, "");
                    let status = if status.is_empty() {
                        "DELETING".to_string()
                    } else {
                        status.to_uppercase()
                    };
                    Ok((Some(desktop), status))
                }
                Err(e) if e.is_not_found() => Ok((None, "DELETED".to_string())),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| {
            ProviderError::new(format!("unable to delete desktop ({}): {}", identifier, e))
                .with_kind(e.kind)
        })?;

    if delete_user {
        let user_name = search_str("user_name", &d, "");
        let users_path = format!(
            "v2/{{project_id}}/users?user_name={}",
            urlencoding::encode(&user_name)
        );
        let user_deleted = StateWaiter::new(&["ACTIVE"], &["DELETED"], DELETE_TIMEOUT)
            .with_delay(Duration::from_secs(10))
            .with_poll_interval(Duration::from_secs(10))
            .for_config(ctx.config);
        user_deleted
            .wait(|| async {
                let body = ctx
                    .client
                    .get(&users_path)
                    .await
                    .map_err(|e| api_error("error querying desktop users", e))?;
                let status = if search_array("users", &body).is_empty() {
                    "DELETED"
                } else {
                    "ACTIVE"
                };
                Ok((Some(body), status.to_string()))
            })
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "unable to delete user under desktop ({}): {}",
                    identifier, e
                ))
                .with_kind(e.kind)
            })?;
    }
    Ok(())
}
