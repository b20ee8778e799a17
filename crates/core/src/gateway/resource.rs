//! Generic CRUD client for one backend collection.

use std::fmt::Display;

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    models::ResourceKind,
};

use super::client::{ApiClient, RequestOptions};

/// Uniform five-verb contract over one backend collection.
///
/// Payloads are opaque: callers pick the (de)serialization types, usually
/// `serde_json::Value`, and the backend stays the only validator.
#[derive(Clone)]
pub struct Resource {
    kind: ResourceKind,
    base_path: String,
    client: ApiClient,
}

impl Resource {
    pub(crate) fn new(kind: ResourceKind, base_path: impl Into<String>, client: ApiClient) -> Self {
        Self {
            kind,
            base_path: base_path.into(),
            client,
        }
    }

    /// Which backend collection this client addresses.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Collection path relative to the origin.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// `GET P`: the whole collection, unpaginated.
    pub async fn list_all<T: DeserializeOwned>(&self) -> ApiResult<Vec<T>> {
        self.client
            .request(&self.base_path, RequestOptions::get())
            .await
    }

    /// `GET P/{id}`.
    pub async fn get_one<T: DeserializeOwned>(&self, id: impl Display) -> ApiResult<T> {
        let path = self.item_path(id)?;
        self.client.request(&path, RequestOptions::get()).await
    }

    /// `POST P` with the payload as body.
    pub async fn create<P, T>(&self, payload: &P) -> ApiResult<T>
    where
        P: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let options = RequestOptions::post(payload)?;
        self.client.request(&self.base_path, options).await
    }

    /// `PUT P/{id}` with the payload as body.
    pub async fn update<P, T>(&self, id: impl Display, payload: &P) -> ApiResult<T>
    where
        P: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let path = self.item_path(id)?;
        let options = RequestOptions::put(payload)?;
        self.client.request(&path, options).await
    }

    /// `DELETE P/{id}`; any response body is ignored.
    pub async fn remove(&self, id: impl Display) -> ApiResult<()> {
        let path = self.item_path(id)?;
        self.client
            .request_discarding(&path, RequestOptions::delete())
            .await
    }

    fn item_path(&self, id: impl Display) -> ApiResult<String> {
        let id = id.to_string();
        let id = id.trim();
        if id.is_empty() {
            return Err(ApiError::Validation(format!(
                "{} identifier must not be empty",
                self.kind
            )));
        }
        Ok(format!("{}/{}", self.base_path, urlencoding::encode(id)))
    }
}
