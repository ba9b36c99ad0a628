use crate::config::Config;
use axum::http::HeaderMap;
use std::sync::Arc;
use weft_core::auth::{AllowAll, BearerTokenVerifier, TokenVerifier};
use weft_core::bus_adapter::TracingBus;
use weft_core::project::{ProjectContext, ProjectManager};

#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<ProjectManager>,
    pub config: Arc<Config>,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let verifier: Arc<dyn TokenVerifier> = match &config.bearer_token {
            Some(token) => Arc::new(BearerTokenVerifier::new(token.clone())),
            None => Arc::new(AllowAll),
        };
        let bus_publisher = Arc::new(TracingBus::new(config.bus_subject_root.clone()));
        Self {
            projects: Arc::new(ProjectManager::new(config.work, bus_publisher)),
            config: Arc::new(config),
            verifier,
        }
    }

    /// Projects are identified by the `X-Project-Id` header; unspecified
    /// requests land in the `default` tenant.
    pub async fn project_for(&self, headers: &HeaderMap) -> Arc<ProjectContext> {
        let project_id = headers
            .get("x-project-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("default");
        self.projects.get_or_create(project_id).await
    }

    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        let presented = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        self.verifier.verify(presented)
    }
}
