//! Session guard, durable token store and credential policy.

mod credentials;
pub mod guard;
pub mod store;

pub use credentials::{CredentialPolicy, Credentials};
pub use guard::{Gate, SessionGuard};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
