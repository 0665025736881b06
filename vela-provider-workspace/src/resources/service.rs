//! workspace_service resource
//!
//! The Workspace service is a per-project singleton: create registers it,
//! read and update always address `v2/{project_id}/workspaces`, and delete
//! unregisters it.

use std::time::Duration;

use log::{debug, warn};
use serde_json::{Map, Value as JsonValue, json};
use vela_core::provider::{ProviderError, ProviderResult};
use vela_core::resource::{Resource, ResourceId, State};

use crate::client::api_error;
use crate::jobs::wait_for_workspace_job;
use crate::provider::HandlerContext;
use crate::resources::{carry_over, has_change, state_from};
use crate::schemas::service::{AUTH_TYPE_LITE_AS, AUTH_TYPE_LOCAL_AD};
use crate::utils::{
    attrs_to_json, is_uuid, path_search, pick, remove_nil, search_array, search_bool, search_str,
    value_ignore_empty,
};
use crate::wait::StateWaiter;

const CREATE_TIMEOUT: Duration = Duration::from_secs(20 * 60);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(20 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

const SERVICE_PATH: &str = "v2/{project_id}/workspaces";
const AUTH_CONFIG_PATH: &str = "v2/{project_id}/assist-auth-config/method-config";
const LOCK_STATUS_PATH: &str = "v2/{project_id}/workspaces/lock-status";

// =============================================================================
// Request Bodies
// =============================================================================

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

fn joined_subnets(d: &JsonValue) -> JsonValue {
    value_ignore_empty(JsonValue::String(
        string_list(d.get("dedicated_subnets")).join(";"),
    ))
}

/// `ad_domain[0]` as the API's `ad_domains` object
pub(crate) fn build_ad_domain(d: &JsonValue) -> Option<JsonValue> {
    let domain = path_search("ad_domain[0]", d)?;
    let delete_object = if search_bool("delete_computer_object", domain, false) {
        1
    } else {
        0
    };
    Some(remove_nil(json!({
        "domain_type": AUTH_TYPE_LOCAL_AD,
        "domain_name": search_str("name", domain, ""),
        "domain_admin_account": search_str("admin_account", domain, ""),
        "domain_password": search_str("password", domain, ""),
        "active_domain_ip": search_str("active_domain_ip", domain, ""),
        "active_domain_name": search_str("active_domain_name", domain, ""),
        "standby_domain_ip": value_ignore_empty(json!(search_str("standby_domain_ip", domain, ""))),
        "standby_domain_name": value_ignore_empty(json!(search_str("standby_domain_name", domain, ""))),
        "active_dns_ip": value_ignore_empty(json!(search_str("active_dns_ip", domain, ""))),
        "standby_dns_ip": value_ignore_empty(json!(search_str("standby_dns_ip", domain, ""))),
        "delete_computer_object": delete_object,
    })))
}

fn build_auth_configuration(d: &JsonValue) -> ProviderResult<JsonValue> {
    let auth_type = search_str("auth_type", d, AUTH_TYPE_LITE_AS);
    if auth_type == AUTH_TYPE_LITE_AS {
        return Ok(json!({"domain_type": auth_type}));
    }
    build_ad_domain(d).ok_or_else(|| {
        ProviderError::validation(format!(
            "ad_domain is required when auth_type is {}",
            AUTH_TYPE_LOCAL_AD
        ))
    })
}

pub(crate) fn build_create_body(d: &JsonValue) -> ProviderResult<JsonValue> {
    let subnets: Vec<JsonValue> = string_list(d.get("network_ids"))
        .into_iter()
        .map(|id| json!({"subnet_id": id}))
        .collect();
    Ok(remove_nil(json!({
        "ad_domains": build_auth_configuration(d)?,
        "vpc_id": search_str("vpc_id", d, ""),
        "subnet_ids": subnets,
        "access_mode": search_str("access_mode", d, ""),
        "enterprise_id": value_ignore_empty(json!(search_str("enterprise_id", d, ""))),
        "dedicated_subnets": joined_subnets(d),
        "management_subnet_cidr": value_ignore_empty(json!(search_str("management_subnet_cidr", d, ""))),
    })))
}

pub(crate) fn build_otp_config(d: &JsonValue) -> Option<JsonValue> {
    let info = path_search("otp_config_info[0]", d)?;
    let text = |key: &str| value_ignore_empty(json!(search_str(key, info, "")));
    Some(remove_nil(json!({
        "auth_type": "OTP",
        "otp_config_info": {
            "enable": search_bool("enable", info, false),
            "receive_mode": search_str("receive_mode", info, ""),
            "auth_url": text("auth_url"),
            "app_id": text("app_id"),
            "app_secrte": text("app_secret"),
            "auth_server_access_mode": text("auth_server_access_mode"),
            "cert_content": text("cert_content"),
            "apply_rule": {
                "rule_type": text("rule_type"),
                "rule": text("rule"),
            },
        },
    })))
}

// =============================================================================
// Flatten
// =============================================================================

fn flatten_security_group(value: Option<&JsonValue>) -> JsonValue {
    match value {
        Some(group) if group.as_object().is_some_and(|o| !o.is_empty()) => {
            json!([pick(group, &["id", "name"])])
        }
        _ => JsonValue::Null,
    }
}

fn flatten_ad_domain(resp: &JsonValue, prior: &JsonValue) -> JsonValue {
    let Some(domain) = path_search("ad_domains", resp) else {
        return JsonValue::Null;
    };
    if search_str("domain_type", domain, "") != AUTH_TYPE_LOCAL_AD {
        return JsonValue::Null;
    }
    json!([{
        "name": path_search("domain_name", domain),
        "admin_account": path_search("domain_admin_account", domain),
        "password": path_search("ad_domain[0].password", prior),
        "active_domain_ip": path_search("active_domain_ip", domain),
        "active_domain_name": path_search("active_domain_name", domain),
        "standby_domain_ip": path_search("standby_domain_ip", domain),
        "standby_domain_name": path_search("standby_domain_name", domain),
        "active_dns_ip": path_search("active_dns_ip", domain),
        "standby_dns_ip": path_search("standby_dns_ip", domain),
        "delete_computer_object": search_str("delete_computer_object", domain, "") == "1",
    }])
}

/// Service details as attributes; the password is taken from `prior`
pub(crate) fn flatten_service(resp: &JsonValue, prior: &JsonValue) -> Map<String, JsonValue> {
    let mut attrs = Map::new();
    attrs.insert("ad_domain".into(), flatten_ad_domain(resp, prior));
    attrs.insert("auth_type".into(), search_value_or_null("ad_domains.domain_type", resp));
    attrs.insert("vpc_id".into(), search_value_or_null("vpc_id", resp));
    attrs.insert(
        "network_ids".into(),
        JsonValue::Array(
            search_array("subnet_ids", resp)
                .iter()
                .filter_map(|s| path_search("subnet_id", s).cloned())
                .collect(),
        ),
    );
    attrs.insert("access_mode".into(), search_value_or_null("access_mode", resp));
    attrs.insert("enterprise_id".into(), search_value_or_null("enterprise_id", resp));
    let dedicated = search_str("dedicated_subnets", resp, "");
    attrs.insert(
        "dedicated_subnets".into(),
        JsonValue::Array(
            dedicated
                .split(';')
                .filter(|s| !s.is_empty())
                .map(|s| JsonValue::String(s.to_string()))
                .collect(),
        ),
    );
    attrs.insert(
        "management_subnet_cidr".into(),
        search_value_or_null("management_subnet_cidr", resp),
    );
    attrs.insert(
        "infrastructure_security_group".into(),
        flatten_security_group(path_search("infrastructure_security_group", resp)),
    );
    attrs.insert(
        "desktop_security_group".into(),
        flatten_security_group(path_search("desktop_security_group", resp)),
    );
    attrs.insert("status".into(), search_value_or_null("status", resp));

    let port = search_str("internet_access_port", resp, "");
    if !port.is_empty() {
        match port.parse::<i64>() {
            Ok(number) => {
                attrs.insert("internet_access_port".into(), json!(number));
                attrs.insert(
                    "internet_access_address".into(),
                    search_value_or_null("internet_access_address", resp),
                );
            }
            Err(_) => warn!("the internet access port '{}' cannot convert to number", port),
        }
    }
    attrs
}

fn search_value_or_null(expr: &str, json: &JsonValue) -> JsonValue {
    path_search(expr, json).cloned().unwrap_or(JsonValue::Null)
}

/// `otp_config_info` block, or null when OTP is disabled
pub(crate) fn flatten_otp_config(resp: &JsonValue) -> JsonValue {
    let info = path_search("otp_config_info", resp).unwrap_or(&JsonValue::Null);
    if !search_bool("enable", info, false) {
        return JsonValue::Null;
    }
    json!([{
        "enable": true,
        "receive_mode": path_search("receive_mode", info),
        "auth_url": path_search("auth_url", info),
        "app_id": path_search("app_id", info),
        "app_secret": path_search("app_secrte", info),
        "auth_server_access_mode": path_search("auth_server_access_mode", info),
        "cert_content": path_search("cert_content", info),
        "rule_type": path_search("apply_rule.rule_type", info),
        "rule": path_search("apply_rule.rule", info),
    }])
}

// =============================================================================
// Remote Calls
// =============================================================================

async fn get_service(ctx: &HandlerContext<'_>) -> ProviderResult<JsonValue> {
    ctx.client
        .get(SERVICE_PATH)
        .await
        .map_err(|e| api_error("error retrieving resource details of Workspace service", e))
}

async fn wait_for_registered(ctx: &HandlerContext<'_>) -> ProviderResult<String> {
    let waiter = StateWaiter::new(&["PREPARING", "SUBSCRIBING"], &["SUBSCRIBED"], CREATE_TIMEOUT)
        .with_delay(Duration::from_secs(10))
        .with_poll_interval(Duration::from_secs(15))
        .for_config(ctx.config);
    let service = waiter
        .wait(|| async {
            let resp = get_service(ctx).await?;
            let status = search_str("status", &resp, "");
            Ok((Some(resp), status))
        })
        .await
        .map_err(|e| {
            ProviderError::new(format!(
                "an error occurred while registering the service: {}",
                e
            ))
            .with_kind(e.kind)
        })?;
    Ok(service
        .map(|s| search_str("id", &s, ""))
        .unwrap_or_default())
}

/// PUT the service and wait for the job it starts
async fn update_with_job(ctx: &HandlerContext<'_>, body: &JsonValue) -> ProviderResult<()> {
    let resp = ctx
        .client
        .put(SERVICE_PATH, body)
        .await
        .map_err(|e| api_error("error updating Workspace service", e))?;
    let job_id = search_str("job_id", &resp, "");
    wait_for_workspace_job(&ctx.client, ctx.config, &job_id, None, UPDATE_TIMEOUT).await?;
    debug!("the job ({}) has been completed", job_id);
    Ok(())
}

async fn update_connection(ctx: &HandlerContext<'_>, d: &JsonValue) -> ProviderResult<()> {
    debug!("start to update the service connection");
    let body = remove_nil(json!({
        "ad_domains": build_ad_domain(d),
        "access_mode": search_str("access_mode", d, ""),
        "dedicated_subnets": joined_subnets(d),
    }));
    update_with_job(ctx, &body)
        .await
        .map_err(|e| prefix("error updating connection parameters of service", e))
}

async fn update_subnet_ids(ctx: &HandlerContext<'_>, d: &JsonValue) -> ProviderResult<()> {
    debug!("start updating the network ID list of service");
    let body = json!({"subnet_ids": string_list(d.get("network_ids"))});
    // No job is returned for subnet changes
    ctx.client
        .put(SERVICE_PATH, &body)
        .await
        .map_err(|e| api_error("error updating subnet list of service", e))?;
    Ok(())
}

async fn update_internet_access(ctx: &HandlerContext<'_>, d: &JsonValue) -> ProviderResult<()> {
    debug!("start to update the internet access port of service");
    let port = path_search("internet_access_port", d)
        .and_then(|v| v.as_i64())
        .unwrap_or_default();
    update_with_job(ctx, &json!({"internet_access_port": port.to_string()}))
        .await
        .map_err(|e| prefix("error updating internet access port of service", e))
}

async fn update_enterprise_id(ctx: &HandlerContext<'_>, d: &JsonValue) -> ProviderResult<()> {
    debug!("start to update the enterprise ID of service");
    let body = json!({"enterprise_id": search_str("enterprise_id", d, "")});
    update_with_job(ctx, &body)
        .await
        .map_err(|e| prefix("error updating enterprise ID of service", e))
}

async fn update_assist_auth_config(ctx: &HandlerContext<'_>, d: &JsonValue) -> ProviderResult<()> {
    let Some(body) = build_otp_config(d) else {
        return Ok(());
    };
    ctx.client
        .put(AUTH_CONFIG_PATH, &body)
        .await
        .map_err(|e| api_error("error updating authentication config parameters of service", e))?;
    Ok(())
}

async fn unlock_service(ctx: &HandlerContext<'_>) -> ProviderResult<()> {
    let resp = ctx
        .client
        .put(LOCK_STATUS_PATH, &json!({"operate_type": "unlock"}))
        .await
        .map_err(|e| api_error("error unlocking the Workspace service", e))?;
    let job_id = search_str("job_id", &resp, "");
    wait_for_workspace_job(&ctx.client, ctx.config, &job_id, None, UPDATE_TIMEOUT).await?;
    debug!("the job ({}) has been completed", job_id);
    Ok(())
}

fn prefix(context: &str, err: ProviderError) -> ProviderError {
    ProviderError {
        message: format!("{}: {}", context, err.message),
        ..err
    }
}

/// Whether an optional+computed attribute was set to a new value
fn set_and_changed(old: &JsonValue, new: &JsonValue, key: &str) -> bool {
    new.get(key).is_some() && old.get(key) != new.get(key)
}

// =============================================================================
// Lifecycle
// =============================================================================

pub async fn create(ctx: &HandlerContext<'_>, resource: &Resource) -> ProviderResult<State> {
    let d = attrs_to_json(&resource.attributes);
    let body = build_create_body(&d)?;
    ctx.client
        .post(SERVICE_PATH, &body)
        .await
        .map_err(|e| api_error("error creating Workspace service", e))?;

    let service_id = wait_for_registered(ctx).await?;
    if d.get("internet_access_port").is_some() {
        update_internet_access(ctx, &d)
            .await
            .map_err(|e| prefix("error configuring access port", e))?;
    }

    let desired = State::existing(resource.id.clone(), resource.attributes.clone());
    read(ctx, &resource.id, &service_id, Some(&desired)).await
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

    let resp = get_service(ctx).await?;
    if search_str("status", &resp, "") == "CLOSED" {
        warn!(
            "{}.{} no longer exists, removing it from state",
            id.resource_type, id.name
        );
        return Ok(State::not_found(id.clone()));
    }

    let mut attrs = flatten_service(&resp, &prior);

    let auth_config = ctx.client.get(AUTH_CONFIG_PATH).await.map_err(|e| {
        api_error(
            "error getting the auxiliary authentication configuration details",
            e,
        )
    })?;
    attrs.insert("otp_config_info".into(), flatten_otp_config(&auth_config));

    let lock = ctx
        .client
        .get(LOCK_STATUS_PATH)
        .await
        .map_err(|e| api_error("error retrieving the lock status of Workspace service", e))?;
    attrs.insert("is_locked".into(), search_value_or_null("is_locked", &lock));
    attrs.insert("lock_time".into(), search_value_or_null("lock_time", &lock));
    attrs.insert("lock_reason".into(), search_value_or_null("lock_reason", &lock));

    carry_over(&mut attrs, &prior, &["lock_enabled"]);

    let service_id = search_str("id", &resp, identifier);
    Ok(state_from(id, &service_id, &ctx.region, attrs))
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

    if set_and_changed(&old, &new, "ad_domain")
        || has_change(&old, &new, &["access_mode"])
        || set_and_changed(&old, &new, "dedicated_subnets")
    {
        update_connection(ctx, &new).await?;
    }
    if has_change(&old, &new, &["network_ids"]) {
        update_subnet_ids(ctx, &new).await?;
    }
    if set_and_changed(&old, &new, "internet_access_port") {
        update_internet_access(ctx, &new).await?;
    }
    if set_and_changed(&old, &new, "enterprise_id") {
        update_enterprise_id(ctx, &new).await?;
    }
    if has_change(&old, &new, &["otp_config_info"]) {
        update_assist_auth_config(ctx, &new).await?;
    }
    // Unlocking only applies when the service is locked
    if has_change(&old, &new, &["lock_enabled"]) && search_bool("lock_enabled", &new, false) {
        unlock_service(ctx).await?;
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
    let closable = StateWaiter::new(&["PENDING"], &["COMPLETE"], DELETE_TIMEOUT)
        .with_delay(Duration::from_secs(10))
        .with_poll_interval(Duration::from_secs(10))
        .for_config(ctx.config);
    closable
        .wait(|| async {
            let resp = get_service(ctx).await?;
            let status = if search_bool("closable", &resp, false) {
                "COMPLETE"
            } else {
                "PENDING"
            };
            Ok((Some(resp), status.to_string()))
        })
        .await
        .map_err(|e| {
            prefix(
                "the current service is not allowed to be deleted (closable is false)",
                e,
            )
        })?;

    ctx.client
        .delete(SERVICE_PATH)
        .await
        .map_err(|e| api_error(format!("error unregistering service ({})", identifier), e))?;

    let closed = StateWaiter::new(&["DEREGISTERING"], &["CLOSED"], DELETE_TIMEOUT)
        .with_delay(Duration::from_secs(10))
        .with_poll_interval(Duration::from_secs(10))
        .for_config(ctx.config);
    closed
        .wait(|| async {
            let resp = get_service(ctx).await?;
            let status = search_str("status", &resp, "");
            Ok((Some(resp), status))
        })
        .await
        .map_err(|e| prefix("an error occurred while unregistering the service", e))?;

    debug!("{}.{} unregistered", id.resource_type, id.name);
    Ok(())
}

/// Import by service ID; any other identifier is replaced by the live ID
pub async fn import(
    ctx: &HandlerContext<'_>,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<State> {
    let service_id = if is_uuid(identifier) {
        identifier.to_string()
    } else {
        let resp = get_service(ctx).await?;
        search_str("id", &resp, identifier)
    };
    read(ctx, id, &service_id, None).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_ad_attrs() -> JsonValue {
        json!({
            "vpc_id": "vpc-1",
            "network_ids": ["net-1", "net-2"],
            "access_mode": "INTERNET",
            "auth_type": "LOCAL_AD",
            "dedicated_subnets": ["10.0.0.0/24", "10.0.1.0/24"],
            "ad_domain": [{
                "name": "example.com",
                "admin_account": "admin",
                "password": "secret",
                "active_domain_ip": "10.0.0.10",
                "active_domain_name": "dc1.example.com",
                "delete_computer_object": true
            }]
        })
    }

    #[test]
    fn lite_as_create_body() {
        let d = json!({
            "vpc_id": "vpc-1",
            "network_ids": ["net-1"],
            "access_mode": "DEDICATED",
            "auth_type": "LITE_AS"
        });
        assert_eq!(
            build_create_body(&d).unwrap(),
            json!({
                "ad_domains": {"domain_type": "LITE_AS"},
                "vpc_id": "vpc-1",
                "subnet_ids": [{"subnet_id": "net-1"}],
                "access_mode": "DEDICATED"
            })
        );
    }

    #[test]
    fn local_ad_create_body() {
        let body = build_create_body(&local_ad_attrs()).unwrap();
        assert_eq!(body["dedicated_subnets"], "10.0.0.0/24;10.0.1.0/24");
        assert_eq!(body["ad_domains"]["domain_type"], "LOCAL_AD");
        assert_eq!(body["ad_domains"]["domain_password"], "secret");
        assert_eq!(body["ad_domains"]["delete_computer_object"], 1);
        assert!(body["ad_domains"].get("standby_domain_ip").is_none());
        assert_eq!(body["subnet_ids"][1]["subnet_id"], "net-2");
    }

    #[test]
    fn local_ad_without_domain_is_rejected() {
        let d = json!({"auth_type": "LOCAL_AD", "vpc_id": "v", "network_ids": []});
        assert!(build_create_body(&d).is_err());
    }

    #[test]
    fn flatten_keeps_prior_password() {
        let resp = json!({
            "id": "svc-1",
            "ad_domains": {
                "domain_type": "LOCAL_AD",
                "domain_name": "example.com",
                "domain_admin_account": "admin",
                "active_domain_ip": "10.0.0.10",
                "delete_computer_object": "1"
            },
            "vpc_id": "vpc-1",
            "subnet_ids": [{"subnet_id": "net-1"}],
            "access_mode": "BOTH",
            "dedicated_subnets": "10.0.0.0/24;10.0.1.0/24",
            "infrastructure_security_group": {"id": "sg-1", "name": "infra"},
            "status": "SUBSCRIBED",
            "internet_access_port": "8443",
            "internet_access_address": "1.2.3.4"
        });
        let attrs = flatten_service(&resp, &local_ad_attrs());

        assert_eq!(attrs["ad_domain"][0]["password"], "secret");
        assert_eq!(attrs["ad_domain"][0]["delete_computer_object"], true);
        assert_eq!(attrs["auth_type"], "LOCAL_AD");
        assert_eq!(attrs["network_ids"], json!(["net-1"]));
        assert_eq!(attrs["dedicated_subnets"], json!(["10.0.0.0/24", "10.0.1.0/24"]));
        assert_eq!(attrs["infrastructure_security_group"][0]["name"], "infra");
        assert_eq!(attrs["desktop_security_group"], JsonValue::Null);
        assert_eq!(attrs["internet_access_port"], 8443);
        assert_eq!(attrs["internet_access_address"], "1.2.3.4");
    }

    #[test]
    fn flatten_lite_as_has_no_domain() {
        let resp = json!({"ad_domains": {"domain_type": "LITE_AS"}, "internet_access_port": "x"});
        let attrs = flatten_service(&resp, &JsonValue::Null);
        assert_eq!(attrs["ad_domain"], JsonValue::Null);
        assert_eq!(attrs["dedicated_subnets"], json!([]));
        assert!(attrs.get("internet_access_port").is_none());
    }

    #[test]
    fn otp_config_round_trip_uses_service_spelling() {
        let d = json!({"otp_config_info": [{
            "enable": true,
            "receive_mode": "VMFA",
            "app_secret": "s3",
            "rule_type": "ACCESS_TYPE",
            "rule": "INTERNET"
        }]});
        let body = build_otp_config(&d).unwrap();
        assert_eq!(body["auth_type"], "OTP");
        assert_eq!(body["otp_config_info"]["app_secrte"], "s3");
        assert_eq!(body["otp_config_info"]["apply_rule"]["rule"], "INTERNET");
        assert!(body["otp_config_info"].get("auth_url").is_none());

        let flat = flatten_otp_config(&json!({"otp_config_info": body["otp_config_info"]}));
        assert_eq!(flat[0]["app_secret"], "s3");
        assert_eq!(flat[0]["rule_type"], "ACCESS_TYPE");
    }

    #[test]
    fn disabled_otp_is_unset() {
        assert_eq!(
            flatten_otp_config(&json!({"otp_config_info": {"enable": false}})),
            JsonValue::Null
        );
        assert!(build_otp_config(&json!({})).is_none());
    }
}
