//! Authentication endpoints.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{error::ApiResult, models::LoginResponse};

use super::{
    client::{ApiClient, RequestOptions},
    transport::Method,
};

#[derive(Serialize)]
struct CredentialsBody<'a> {
    username: &'a str,
    password: &'a str,
}

/// Login, signup and optional backend sign-out.
#[derive(Clone)]
pub struct AuthApi {
    client: ApiClient,
    login_path: String,
    signup_path: String,
    logout_path: Option<String>,
}

impl AuthApi {
    pub(crate) fn new(
        client: ApiClient,
        login_path: impl Into<String>,
        signup_path: impl Into<String>,
        logout_path: Option<String>,
    ) -> Self {
        Self {
            client,
            login_path: login_path.into(),
            signup_path: signup_path.into(),
            logout_path,
        }
    }

    /// `POST` the credentials to the login path; yields `{token, user}`.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse> {
        let options = RequestOptions::post(&CredentialsBody { username, password })?;
        self.client.request(&self.login_path, options).await
    }

    /// `POST` the credentials to the signup path.
    pub async fn signup(&self, username: &str, password: &str) -> ApiResult<Value> {
        let options = RequestOptions::post(&CredentialsBody { username, password })?;
        self.client.request(&self.signup_path, options).await
    }

    /// Whether the backend exposes a sign-out endpoint.
    pub fn has_logout(&self) -> bool {
        self.logout_path.is_some()
    }

    /// `POST` to the sign-out path; a no-op when none is configured.
    pub async fn logout(&self) -> ApiResult<()> {
        let Some(path) = self.logout_path.as_deref() else {
            debug!("no logout endpoint configured; skipping backend sign-out");
            return Ok(());
        };
        self.client
            .request_discarding(path, RequestOptions::new(Method::Post))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ApiError, gateway::mock::MockTransport};
    use serde_json::json;

    fn auth(mock: &std::sync::Arc<MockTransport>, logout: Option<&str>) -> AuthApi {
        let client = ApiClient::new("http://localhost:8080", mock.clone());
        AuthApi::new(client, "/api/login", "/cadastrar", logout.map(str::to_string))
    }

    #[tokio::test]
    async fn login_posts_credentials_and_parses_token() {
        let mock = MockTransport::new();
        mock.push_json(200, json!({"token": "tok-1", "user": {"id": "u1"}}));

        let response = auth(&mock, None)
            .login("alice", "secret1")
            .await
            .expect("login");
        assert_eq!(response.token, "tok-1");
        assert_eq!(response.user.id.as_deref(), Some("u1"));

        let sent = &mock.requests()[0];
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.url, "http://localhost:8080/api/login");
        let body: Value = serde_json::from_str(sent.body.as_deref().unwrap_or_default())
            .expect("json body");
        assert_eq!(body, json!({"username": "alice", "password": "secret1"}));
    }

    #[tokio::test]
    async fn login_without_token_field_is_a_parse_error() {
        let mock = MockTransport::new();
        mock.push_json(200, json!({"user": {"id": "u1"}}));

        let err = auth(&mock, None)
            .login("alice", "secret1")
            .await
            .expect_err("missing token");
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[tokio::test]
    async fn signup_posts_to_signup_path() {
        let mock = MockTransport::new();
        mock.push_json(201, json!({"id": 12, "username": "bob"}));

        let created = auth(&mock, None)
            .signup("bob", "hunter22")
            .await
            .expect("signup");
        assert_eq!(created["username"], json!("bob"));
        assert_eq!(mock.requests()[0].url, "http://localhost:8080/cadastrar");
    }

    #[tokio::test]
    async fn logout_is_local_when_no_endpoint_is_configured() {
        let mock = MockTransport::new();
        let api = auth(&mock, None);
        assert!(!api.has_logout());
        api.logout().await.expect("no-op logout");
        assert_eq!(mock.call_count(), 0);

        mock.push(204, "");
        let api = auth(&mock, Some("/api/logout"));
        api.logout().await.expect("backend logout");
        assert_eq!(mock.requests()[0].url, "http://localhost:8080/api/logout");
    }
}
