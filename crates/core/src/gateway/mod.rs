//! Resource gateway: uniform client for the backend REST API.

pub mod auth;
pub mod client;
pub mod dashboard;
pub mod resource;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;

use crate::{config::ApiConfig, models::ResourceKind};

pub use auth::AuthApi;
pub use client::{ApiClient, BearerSource, RequestOptions};
pub use dashboard::DashboardApi;
pub use resource::Resource;
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};

/// Entry point handing out one client per registered resource.
///
/// Cloning is cheap and every clone shares the transport. The gateway holds
/// no cross-call state.
#[derive(Clone)]
pub struct Gateway {
    client: ApiClient,
    config: Arc<ApiConfig>,
}

impl Gateway {
    /// Gateway for `config`, sending every call through `transport`.
    pub fn new(config: ApiConfig, transport: Arc<dyn Transport>) -> Self {
        let client = ApiClient::new(&config.base_url, transport);
        Self {
            client,
            config: Arc::new(config),
        }
    }

    /// Same gateway, sending the session's bearer credential.
    pub fn with_bearer(self, bearer: Arc<dyn BearerSource>) -> Self {
        Self {
            client: self.client.with_bearer(bearer),
            config: self.config,
        }
    }

    /// CRUD client for `kind` at its configured path.
    pub fn resource(&self, kind: ResourceKind) -> Resource {
        Resource::new(
            kind,
            self.config.paths.resource(kind),
            self.client.clone(),
        )
    }

    /// Login, signup and sign-out endpoints.
    pub fn auth(&self) -> AuthApi {
        let paths = &self.config.paths;
        AuthApi::new(
            self.client.clone(),
            &paths.login,
            &paths.signup,
            paths.logout.clone(),
        )
    }

    /// Dashboard aggregate endpoints.
    pub fn dashboard(&self) -> DashboardApi {
        DashboardApi::new(self.client.clone(), &self.config.paths)
    }

    /// Underlying request primitive.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Backend origin.
    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }
}
