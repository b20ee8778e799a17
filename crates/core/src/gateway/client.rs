//! Request primitive shared by every gateway client.

use std::{collections::BTreeMap, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{ApiError, ApiResult};

use super::transport::{HttpRequest, HttpResponse, Method, Transport};

/// Read-only view of the current bearer credential.
///
/// The gateway only ever reads through this; the session guard owns the token.
pub trait BearerSource: Send + Sync {
    /// Token to send, or `None` when no session is active.
    fn bearer_token(&self) -> Option<String>;
}

/// Per-call request envelope: verb, optional body and header overrides.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    method: Method,
    body: Option<String>,
    headers: Vec<(String, String)>,
}

impl RequestOptions {
    /// Bodiless request with `method`.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            body: None,
            headers: Vec::new(),
        }
    }

    /// Bodiless `GET`.
    pub fn get() -> Self {
        Self::new(Method::Get)
    }

    /// Bodiless `DELETE`.
    pub fn delete() -> Self {
        Self::new(Method::Delete)
    }

    /// `POST` with `payload` serialized verbatim.
    pub fn post<P: Serialize + ?Sized>(payload: &P) -> ApiResult<Self> {
        Self::new(Method::Post).json(payload)
    }

    /// `PUT` with `payload` serialized verbatim.
    pub fn put<P: Serialize + ?Sized>(payload: &P) -> ApiResult<Self> {
        Self::new(Method::Put).json(payload)
    }

    /// Attach a JSON body.
    pub fn json<P: Serialize + ?Sized>(mut self, payload: &P) -> ApiResult<Self> {
        let body = serde_json::to_string(payload)
            .map_err(|err| ApiError::Validation(format!("payload is not serializable: {err}")))?;
        self.body = Some(body);
        Ok(self)
    }

    /// Override or add a header; applied after the defaults.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Verb this envelope will be sent with.
    pub fn method(&self) -> Method {
        self.method
    }
}

/// Low-level `request` primitive shared by every resource.
#[derive(Clone)]
pub struct ApiClient {
    base_url: Arc<str>,
    transport: Arc<dyn Transport>,
    bearer: Option<Arc<dyn BearerSource>>,
}

impl ApiClient {
    /// Client for `base_url`; a trailing slash is ignored.
    pub fn new(base_url: impl AsRef<str>, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: Arc::from(base_url.as_ref().trim_end_matches('/')),
            transport,
            bearer: None,
        }
    }

    /// Attach the session's bearer credential to every subsequent request.
    pub fn with_bearer(mut self, bearer: Arc<dyn BearerSource>) -> Self {
        self.bearer = Some(bearer);
        self
    }

    /// Origin every path is joined to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one call and parse the 2xx body as JSON.
    pub async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        let response = self.execute(path, options).await?;
        serde_json::from_str(&response.body).map_err(|err| {
            ApiError::Parse(format!("invalid JSON body from {path}: {err}"))
        })
    }

    /// Issue one call and discard whatever body a 2xx response carries.
    pub async fn request_discarding(&self, path: &str, options: RequestOptions) -> ApiResult<()> {
        self.execute(path, options).await.map(|_| ())
    }

    async fn execute(&self, path: &str, options: RequestOptions) -> ApiResult<HttpResponse> {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        if let Some(token) = self
            .bearer
            .as_ref()
            .and_then(|bearer| bearer.bearer_token())
        {
            headers.insert("authorization".to_string(), format!("Bearer {token}"));
        }
        for (name, value) in options.headers {
            headers.insert(name.to_ascii_lowercase(), value);
        }

        let request = HttpRequest {
            method: options.method,
            url: format!("{}{}", self.base_url, path),
            headers,
            body: options.body,
        };

        debug!(method = %request.method, path, "sending request");
        let response = self.transport.send(request).await?;
        debug!(status = response.status, path, "received response");

        if !response.is_success() {
            return Err(ApiError::HttpStatus {
                code: response.status,
                status_text: response.status_text,
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockTransport;
    use serde_json::{json, Value};

    struct FixedBearer(&'static str);

    impl BearerSource for FixedBearer {
        fn bearer_token(&self) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn joins_origin_and_sets_json_content_type() {
        let mock = MockTransport::new();
        mock.push_json(200, json!({"ok": true}));
        let client = ApiClient::new("http://localhost:8080/", mock.clone());

        let value: Value = client
            .request("/Dashboard/stats", RequestOptions::get())
            .await
            .expect("request");
        assert_eq!(value, json!({"ok": true}));

        let sent = mock.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "http://localhost:8080/Dashboard/stats");
        assert_eq!(sent[0].header("content-type"), Some("application/json"));
        assert_eq!(sent[0].header("authorization"), None);
    }

    #[tokio::test]
    async fn caller_headers_override_defaults() {
        let mock = MockTransport::new();
        mock.push_json(200, json!([]));
        let client =
            ApiClient::new("http://api", mock.clone()).with_bearer(Arc::new(FixedBearer("abc")));

        let options = RequestOptions::get()
            .with_header("Content-Type", "application/vnd.estokar+json")
            .with_header("X-Trace", "1");
        let _: Vec<Value> = client.request("/Marcas", options).await.expect("request");

        let sent = &mock.requests()[0];
        assert_eq!(sent.header("content-type"), Some("application/vnd.estokar+json"));
        assert_eq!(sent.header("x-trace"), Some("1"));
        assert_eq!(sent.header("authorization"), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn non_success_status_carries_code_and_text() {
        let mock = MockTransport::new();
        mock.push(503, "maintenance");
        let client = ApiClient::new("http://api", mock.clone());

        let err = client
            .request::<Value>("/Setores", RequestOptions::get())
            .await
            .expect_err("503 must fail");
        assert_eq!(
            err,
            ApiError::HttpStatus {
                code: 503,
                status_text: "Service Unavailable".to_string()
            }
        );
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_parse_error() {
        let mock = MockTransport::new();
        mock.push(200, "<html>oops</html>");
        let client = ApiClient::new("http://api", mock.clone());

        let err = client
            .request::<Value>("/Materiais", RequestOptions::get())
            .await
            .expect_err("html is not json");
        assert!(matches!(err, ApiError::Parse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn transport_failures_propagate_without_retry() {
        let mock = MockTransport::new();
        mock.push_error(ApiError::Network("connection refused".to_string()));
        mock.push_json(200, json!([]));
        let client = ApiClient::new("http://api", mock.clone());

        let err = client
            .request::<Value>("/Saidas", RequestOptions::get())
            .await
            .expect_err("network failure");
        assert_eq!(err, ApiError::Network("connection refused".to_string()));
        assert_eq!(mock.call_count(), 1);
    }
}
