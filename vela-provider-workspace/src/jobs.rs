//! Waits on asynchronous Workspace jobs

use std::time::Duration;

use log::debug;
use serde_json::Value as JsonValue;
use vela_core::provider::{ProviderError, ProviderResult};

use crate::client::{ServiceClient, api_error};
use crate::config::ProviderConfig;
use crate::utils::{search_array, search_str};
use crate::wait::{Refresh, StateWaiter};

/// Current status of a job, judged by its sub-jobs.
///
/// The first sub-job that has not succeeded decides the status; when
/// every sub-job succeeded the job is `SUCCESS` and the first sub-job is
/// returned.
pub fn sub_job_status(body: &JsonValue) -> ProviderResult<Refresh> {
    let jobs = search_array("jobs", body);
    if jobs.is_empty() {
        return Err(ProviderError::new("unable to find any job details"));
    }
    for job in jobs {
        let status = search_str("status", job, "");
        if status != "SUCCESS" {
            return Ok((Some(job.clone()), status));
        }
    }
    Ok((Some(jobs[0].clone()), "SUCCESS".to_string()))
}

/// Wait for a Workspace job (`workspace-sub-jobs`) and return the desktop ID
/// recorded in its entities, which may be empty.
pub async fn wait_for_workspace_job(
    client: &ServiceClient,
    config: &ProviderConfig,
    job_id: &str,
    desktop_pool_id: Option<&str>,
    timeout: Duration,
) -> ProviderResult<String> {
    let mut path = format!("v2/{{project_id}}/workspace-sub-jobs?job_id={}", job_id);
    if let Some(pool_id) = desktop_pool_id {
        path.push_str(&format!("&desktop_pool_id={}", pool_id));
    }

    let waiter = StateWaiter::new(&["WAITING", "RUNNING"], &["SUCCESS"], timeout)
        .with_delay(Duration::from_secs(10))
        .with_poll_interval(Duration::from_secs(15))
        .for_config(config);

    let job = waiter
        .wait(|| async {
            let body = client
                .get(&path)
                .await
                .map_err(|e| api_error("error retrieving job details", e))?;
            sub_job_status(&body)
        })
        .await
        .map_err(|e| ProviderError::new(format!("error waiting for job ({}): {}", job_id, e)).with_kind(e.kind))?;

    let desktop_id = job
        .as_ref()
        .map(|j| search_str("entities.desktop_id", j, ""))
        .unwrap_or_default();
    debug!("job {} completed (desktop: '{}')", job_id, desktop_id);
    Ok(desktop_id)
}

/// Wait for a top-level Workspace job (`workspace-jobs/{job_id}`).
///
/// The result is confirmed twice since desktop states lag behind job
/// completion.
pub async fn wait_for_pool_job(
    client: &ServiceClient,
    config: &ProviderConfig,
    job_id: &str,
    timeout: Duration,
) -> ProviderResult<()> {
    let path = format!("v2/{{project_id}}/workspace-jobs/{}", job_id);
    let waiter = StateWaiter::new(&["PENDING"], &["COMPLETED"], timeout)
        .with_delay(Duration::from_secs(10))
        .with_poll_interval(Duration::from_secs(20))
        .with_continuous_target(2)
        .for_config(config);

    waiter
        .wait(|| async {
            let body = client
                .get(&path)
                .await
                .map_err(|e| api_error("error retrieving job details", e))?;
            match search_str("status", &body, "").as_str() {
                "SUCCESS" => Ok((Some(body), "COMPLETED".to_string())),
                "FAILED" => Err(ProviderError::new(format!(
                    "job ({}) failed: {}",
                    job_id,
                    search_str("fail_reason", &body, "unknown reason")
                ))),
                _ => Ok((Some(body), "PENDING".to_string())),
            }
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_unfinished_sub_job_decides() {
        let body = json!({"jobs": [
            {"id": "1", "status": "SUCCESS"},
            {"id": "2", "status": "RUNNING"},
            {"id": "3", "status": "FAIL"}
        ]});
        let (job, status) = sub_job_status(&body).unwrap();
        assert_eq!(status, "RUNNING");
        assert_eq!(job.unwrap()["id"], "2");
    }

    #[test]
    fn all_successful_returns_first_job() {
        let body = json!({"jobs": [
            {"id": "1", "status": "SUCCESS", "entities": {"desktop_id": "d-1"}},
            {"id": "2", "status": "SUCCESS"}
        ]});
        let (job, status) = sub_job_status(&body).unwrap();
        assert_eq!(status, "SUCCESS");
        assert_eq!(search_str("entities.desktop_id", &job.unwrap(), ""), "d-1");
    }

    #[test]
    fn missing_jobs_is_an_error() {
        assert!(sub_job_status(&json!({"jobs": []})).is_err());
        assert!(sub_job_status(&JsonValue::Null).is_err());
    }
}
