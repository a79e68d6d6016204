//! Tenant-scoped dashboard endpoints.
//!
//! Reads of list endpoints go through the response cache; writes invalidate
//! every cached entry of the resource classes they affect.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::{
    cache::{ResponseCache, cache_key},
    domain::{Build, Notification, Organization, Pipeline, Task, TaskDraft, TaskPatch},
    error::ClientError,
    gateway::{ApiRequest, RequestGateway},
};

pub const TASKS: &str = "tasks";
pub const PIPELINES: &str = "pipelines";
pub const BUILDS: &str = "builds";
pub const NOTIFICATIONS: &str = "notifications";
pub const ORGANIZATIONS: &str = "organizations";

const ALL: &str = "all";

/// Dashboard API of one organization (the cache tenant)
pub struct DashboardApi {
    tenant: String,
    gateway: Arc<RequestGateway>,
    cache: Arc<ResponseCache>,
    ttl_secs: u64,
}

impl DashboardApi {
    pub fn new(
        tenant: impl Into<String>,
        gateway: Arc<RequestGateway>,
        cache: Arc<ResponseCache>,
        ttl_secs: u64,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            gateway,
            cache,
            ttl_secs,
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub async fn list_organizations(&self) -> Result<Vec<Organization>, ClientError> {
        self.cached_get(ORGANIZATIONS, ALL, "/organizations".to_string())
            .await
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, ClientError> {
        self.cached_get(TASKS, ALL, self.org_path("tasks")).await
    }

    pub async fn list_pipelines(&self) -> Result<Vec<Pipeline>, ClientError> {
        self.cached_get(PIPELINES, ALL, self.org_path("pipelines"))
            .await
    }

    /// Builds of the organization, optionally narrowed to one pipeline
    pub async fn list_builds(&self, pipeline_id: Option<&str>) -> Result<Vec<Build>, ClientError> {
        match pipeline_id {
            Some(id) => {
                let path = format!("{}?pipelineId={}", self.org_path("builds"), id);
                self.cached_get(BUILDS, &format!("pipeline={}", id), path)
                    .await
            }
            None => self.cached_get(BUILDS, ALL, self.org_path("builds")).await,
        }
    }

    pub async fn list_notifications(&self) -> Result<Vec<Notification>, ClientError> {
        self.cached_get(NOTIFICATIONS, ALL, "/notifications".to_string())
            .await
    }

    pub async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ClientError> {
        let request = ApiRequest::post(self.org_path("tasks")).json(draft)?;
        let task = self.gateway.send_json(request).await?;
        self.invalidate(&[TASKS]);
        Ok(task)
    }

    pub async fn update_task(
        &self,
        task_id: &str,
        patch: &TaskPatch,
    ) -> Result<Task, ClientError> {
        let path = format!("{}/{}", self.org_path("tasks"), task_id);
        let request = ApiRequest::patch(path).json(patch)?;
        let task = self.gateway.send_json(request).await?;
        self.invalidate(&[TASKS]);
        Ok(task)
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), ClientError> {
        let path = format!("{}/{}", self.org_path("tasks"), task_id);
        self.gateway.send(ApiRequest::delete(path)).await?;
        self.invalidate(&[TASKS]);
        Ok(())
    }

    /// Start a build of `pipeline_id`
    pub async fn trigger_pipeline(&self, pipeline_id: &str) -> Result<Build, ClientError> {
        let path = format!("{}/{}/trigger", self.org_path("pipelines"), pipeline_id);
        let build = self.gateway.send_json(ApiRequest::post(path)).await?;
        self.invalidate(&[BUILDS, PIPELINES]);
        Ok(build)
    }

    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<(), ClientError> {
        let path = format!("/notifications/{}/read", notification_id);
        self.gateway.send(ApiRequest::post(path)).await?;
        self.invalidate(&[NOTIFICATIONS]);
        Ok(())
    }

    fn org_path(&self, resource: &str) -> String {
        format!("/organizations/{}/{}", self.tenant, resource)
    }

    fn invalidate(&self, resources: &[&str]) {
        for resource in resources {
            self.cache.invalidate_resource(&self.tenant, resource);
        }
    }

    async fn cached_get<T: DeserializeOwned>(
        &self,
        resource: &str,
        discriminator: &str,
        path: String,
    ) -> Result<T, ClientError> {
        let key = cache_key(&self.tenant, resource, discriminator);
        if let Some(bytes) = self.cache.get(&key) {
            match serde_json::from_slice(&bytes) {
                Ok(value) => return Ok(value),
                Err(e) => tracing::warn!("Discarding undecodable cache entry {}: {}", key, e),
            }
        }

        let response = self.gateway.send(ApiRequest::get(path)).await?;
        let value = response.json()?;
        self.cache.set(key, response.body, self.ttl_secs);
        Ok(value)
    }
}
