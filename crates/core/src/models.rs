//! Shared domain models.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Domain areas exposed by the backend with the uniform CRUD path shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Stock materials.
    Materials,
    /// Brands and suppliers.
    Brands,
    /// Employees that withdraw stock.
    Employees,
    /// Company sectors.
    Sectors,
    /// Inbound stock movements ("entradas").
    Inbound,
    /// Outbound stock movements ("saidas").
    Outbound,
    /// Console users.
    Users,
}

impl ResourceKind {
    /// Every registered resource, in menu order.
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Materials,
        ResourceKind::Employees,
        ResourceKind::Users,
        ResourceKind::Brands,
        ResourceKind::Inbound,
        ResourceKind::Outbound,
        ResourceKind::Sectors,
    ];

    /// Stable logical name of the resource.
    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Materials => "materials",
            ResourceKind::Brands => "brands",
            ResourceKind::Employees => "employees",
            ResourceKind::Sectors => "sectors",
            ResourceKind::Inbound => "inbound",
            ResourceKind::Outbound => "outbound",
            ResourceKind::Users => "users",
        }
    }

    /// Human-readable title used by frontends.
    pub fn title(self) -> &'static str {
        match self {
            ResourceKind::Materials => "Materials",
            ResourceKind::Brands => "Brands",
            ResourceKind::Employees => "Employees",
            ResourceKind::Sectors => "Sectors",
            ResourceKind::Inbound => "Inbound",
            ResourceKind::Outbound => "Outbound",
            ResourceKind::Users => "Users",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Minimal user descriptor returned by the backend at login.
///
/// Only `id` and a display name are interpreted; any other fields the backend
/// sends are kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDescriptor {
    /// Backend identifier, stringified when the backend sends a number.
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    /// Display name, when the backend provides one.
    #[serde(default, alias = "username", alias = "nome", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Remaining fields passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl UserDescriptor {
    /// Label shown next to the session indicator.
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .filter(|value| !value.is_empty())
            .unwrap_or("unknown user")
            .to_string()
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(num)) => Some(num.to_string()),
        _ => None,
    })
}

/// Body returned by the login endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// Opaque bearer credential.
    pub token: String,
    /// Descriptor of the authenticated user.
    #[serde(default)]
    pub user: UserDescriptor,
}

/// Session material kept by the session guard.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionToken {
    /// Opaque bearer credential.
    pub token: String,
    /// User the token was issued to, when known.
    pub user: Option<UserDescriptor>,
    /// When the token was obtained by this console.
    pub issued_at: Option<DateTime<Utc>>,
}

/// Outcome of checking whether the protected tree is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthCheck {
    /// Check still in flight.
    Checking,
    /// A session token is present.
    Authenticated,
    /// No usable session; traffic goes to the login surface.
    Unauthenticated,
}
