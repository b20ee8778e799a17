#![warn(clippy::all, missing_docs)]

//! Core of the EstoKar inventory console.
//!
//! This crate hosts the resource gateway that talks to the inventory
//! backend, the session guard that owns authentication state, and the
//! configuration and models shared by the terminal UI and any future
//! frontends.

pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod session;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use gateway::{Gateway, ReqwestTransport, Resource};
pub use models::{AuthCheck, ResourceKind, SessionToken, UserDescriptor};
pub use session::{FileTokenStore, Gate, SessionGuard, TokenStore};
