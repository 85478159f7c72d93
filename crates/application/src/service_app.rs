//! Service resource use cases.

use std::sync::Arc;

use common::{Error, RequestContext, Result, Service};
use entity_store::{ServiceRepository, StoreError};
use tracing::info;

use crate::dto::{CreateServiceRequest, UpdateServiceRequest};
use crate::validator::{first_issue, service_data_issues, service_name_issues};

const RESOURCE: &str = "service";

/// Qualify a store failure with the resource kind and the key the caller used.
fn translate(err: StoreError, key: &str) -> Error {
    match err {
        StoreError::NotFound => Error::not_found(RESOURCE, key),
        StoreError::AlreadyExists(id) => Error::AlreadyExists(format!("{} {}", RESOURCE, id)),
    }
}

#[derive(Clone)]
pub struct ServiceApp {
    repo: Arc<dyn ServiceRepository>,
}

impl ServiceApp {
    pub fn new(repo: Arc<dyn ServiceRepository>) -> Self {
        Self { repo }
    }

    pub async fn get_service(&self, ctx: &RequestContext, id: &str) -> Result<Service> {
        self.repo
            .find_by_id(ctx, id)
            .await
            .map_err(|e| translate(e, id))
    }

    pub async fn get_all_services(&self, ctx: &RequestContext) -> Result<Vec<Service>> {
        self.repo.find_all(ctx).await.map_err(|e| translate(e, ""))
    }

    pub async fn get_service_by_name(&self, ctx: &RequestContext, name: &str) -> Result<Service> {
        self.repo
            .find_by_name(ctx, name)
            .await
            .map_err(|e| translate(e, name))
    }

    pub async fn create_service(
        &self,
        ctx: &RequestContext,
        req: CreateServiceRequest,
    ) -> Result<Service> {
        first_issue("name", service_name_issues(&req.name))?;
        first_issue("data", service_data_issues(&req.data))?;

        let service = Service::new(req.name, req.data)?;
        self.repo
            .save(ctx, service.clone())
            .await
            .map_err(|e| translate(e, &service.id))?;

        info!("Created service {} ({})", service.id, service.name);
        Ok(service)
    }

    /// Applies only the fields the request sets; a bad name leaves the store untouched.
    pub async fn update_service(
        &self,
        ctx: &RequestContext,
        id: &str,
        req: UpdateServiceRequest,
    ) -> Result<Service> {
        let mut service = self.get_service(ctx, id).await?;

        if let Some(name) = req.new_name() {
            first_issue("name", service_name_issues(name))?;
            service.rename(name)?;
        }
        if let Some(data) = req.new_data() {
            first_issue("data", service_data_issues(data))?;
            service.update_data(data);
        }

        self.repo
            .update(ctx, service.clone())
            .await
            .map_err(|e| translate(e, id))?;

        info!("Updated service {} ({})", service.id, service.name);
        Ok(service)
    }

    pub async fn delete_service(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        self.repo
            .delete(ctx, id)
            .await
            .map_err(|e| translate(e, id))?;
        info!("Deleted service {}", id);
        Ok(())
    }
}
