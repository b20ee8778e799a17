//! Session guard: sole owner of the authentication state.

use std::{future::Future, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    error::{ApiError, ApiResult},
    gateway::{BearerSource, Gateway},
    models::{AuthCheck, SessionToken, UserDescriptor},
};

use super::{
    credentials::CredentialPolicy,
    store::{TokenStore, ISSUED_AT_KEY, TOKEN_KEY, USER_KEY},
};

/// What a protected subtree should do for the current auth state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate<T> {
    /// Check still in flight; show a placeholder.
    Loading,
    /// Session present; the subtree was rendered.
    Render(T),
    /// No session; send the user to the login surface.
    RedirectToLogin,
}

struct GuardState {
    check: AuthCheck,
    session: Option<SessionToken>,
    /// Bumped whenever the active session is replaced or ended.
    epoch: u64,
}

impl GuardState {
    /// Resolve a pending check against whatever session is still held.
    fn settle_without_new_session(&mut self) {
        self.check = if self.session.is_some() {
            AuthCheck::Authenticated
        } else {
            AuthCheck::Unauthenticated
        };
    }
}

/// Owner of the session token and gatekeeper of the protected tree.
///
/// Every mutation of the durable store goes through `login`, `logout` or the
/// teardown triggered by `guarded`; everything else only reads.
#[derive(Clone)]
pub struct SessionGuard {
    state: Arc<RwLock<GuardState>>,
    store: Arc<dyn TokenStore>,
    gateway: Gateway,
    policy: CredentialPolicy,
}

struct SessionBearer {
    state: Arc<RwLock<GuardState>>,
}

impl BearerSource for SessionBearer {
    fn bearer_token(&self) -> Option<String> {
        self.state
            .read()
            .session
            .as_ref()
            .map(|session| session.token.clone())
    }
}

impl SessionGuard {
    /// Wrap `gateway` so its requests carry this guard's bearer token.
    pub fn new(gateway: Gateway, store: Arc<dyn TokenStore>, policy: CredentialPolicy) -> Self {
        let state = Arc::new(RwLock::new(GuardState {
            check: AuthCheck::Checking,
            session: None,
            epoch: 0,
        }));
        let gateway = gateway.with_bearer(Arc::new(SessionBearer {
            state: Arc::clone(&state),
        }));
        Self {
            state,
            store,
            gateway,
            policy,
        }
    }

    /// Gateway whose calls are authenticated with the current session.
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Local credential preconditions.
    pub fn policy(&self) -> &CredentialPolicy {
        &self.policy
    }

    /// Enter `Checking`, as on every mount of the protected tree.
    pub fn mount(&self) -> AuthCheck {
        self.state.write().check = AuthCheck::Checking;
        AuthCheck::Checking
    }

    /// Resolve reachability from the durable store alone; never touches the network.
    pub fn check_session(&self) -> AuthCheck {
        let session = match self.load_session() {
            Ok(session) => session,
            Err(err) => {
                warn!("failed to read token store: {err}");
                None
            }
        };
        let check = if session.is_some() {
            AuthCheck::Authenticated
        } else {
            AuthCheck::Unauthenticated
        };

        let mut state = self.state.write();
        let token = |session: &Option<SessionToken>| session.as_ref().map(|s| s.token.clone());
        if token(&state.session) != token(&session) {
            state.epoch += 1;
        }
        state.session = session;
        state.check = check;
        check
    }

    /// Last resolved state.
    pub fn state(&self) -> AuthCheck {
        self.state.read().check
    }

    /// Shorthand for `state() == Authenticated`.
    pub fn is_authenticated(&self) -> bool {
        self.state() == AuthCheck::Authenticated
    }

    /// User descriptor persisted with the session, if any.
    pub fn current_user(&self) -> Option<UserDescriptor> {
        self.state
            .read()
            .session
            .as_ref()
            .and_then(|session| session.user.clone())
    }

    /// Snapshot of the active session.
    pub fn current_session(&self) -> Option<SessionToken> {
        self.state.read().session.clone()
    }

    /// Validate locally, authenticate against the backend and persist the session.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<SessionToken> {
        let credentials = self.policy.validate(username, password)?;

        let response = match self
            .gateway
            .auth()
            .login(&credentials.username, &credentials.password)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(username = %credentials.username, "login rejected: {err}");
                self.state.write().settle_without_new_session();
                return Err(err);
            }
        };

        if response.token.trim().is_empty() {
            self.state.write().settle_without_new_session();
            return Err(ApiError::Parse(
                "login response carried an empty token".to_string(),
            ));
        }

        let session = SessionToken {
            token: response.token,
            user: Some(response.user),
            issued_at: Some(Utc::now()),
        };
        let mut state = self.state.write();
        if let Err(err) = self.persist(&session) {
            if let Err(clear_err) = self.store.clear() {
                warn!("failed to roll back partial session: {clear_err}");
            }
            state.settle_without_new_session();
            return Err(err);
        }

        let display_name = session
            .user
            .as_ref()
            .map(UserDescriptor::display_name)
            .unwrap_or_default();
        info!(user = %display_name, "login succeeded");
        state.session = Some(session.clone());
        state.check = AuthCheck::Authenticated;
        state.epoch += 1;
        Ok(session)
    }

    /// Register a new account; the current session is left untouched.
    pub async fn signup(&self, username: &str, password: &str) -> ApiResult<Value> {
        let credentials = self.policy.validate(username, password)?;
        let created = self
            .gateway
            .auth()
            .signup(&credentials.username, &credentials.password)
            .await?;
        info!(username = %credentials.username, "signup succeeded");
        Ok(created)
    }

    /// Sign out. Local teardown happens even when the backend call fails.
    pub async fn logout(&self) {
        if let Err(err) = self.gateway.auth().logout().await {
            warn!("backend sign-out failed, clearing local session anyway: {err}");
        }
        self.teardown("logout");
    }

    /// Render `render` only when a session is present.
    pub fn require_session<T>(&self, render: impl FnOnce() -> T) -> Gate<T> {
        match self.state() {
            AuthCheck::Checking => Gate::Loading,
            AuthCheck::Authenticated => Gate::Render(render()),
            AuthCheck::Unauthenticated => Gate::RedirectToLogin,
        }
    }

    /// Await a gateway call, tearing the session down when the backend rejects it.
    ///
    /// 401/403 are reported as [`ApiError::SessionExpired`]; every other outcome
    /// passes through unchanged. A rejection of a call issued under a session
    /// that has since been replaced or ended leaves the current session alone
    /// and is returned as the plain status error.
    pub async fn guarded<T, F>(&self, call: F) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        let issued_under = self.state.read().epoch;
        match call.await {
            Err(err) if err.is_auth_failure() => {
                let code = err.status_code().unwrap_or(401);
                let mut state = self.state.write();
                if state.epoch != issued_under {
                    debug!(
                        code,
                        "rejection belongs to an earlier session; keeping the current one"
                    );
                    return Err(err);
                }
                self.end_session(&mut state, "backend rejected the session");
                Err(ApiError::SessionExpired { code })
            }
            other => other,
        }
    }

    fn teardown(&self, reason: &str) {
        let mut state = self.state.write();
        self.end_session(&mut state, reason);
    }

    fn end_session(&self, state: &mut GuardState, reason: &str) {
        if let Err(err) = self.store.clear() {
            warn!("failed to clear token store: {err}");
        }
        state.session = None;
        state.check = AuthCheck::Unauthenticated;
        state.epoch += 1;
        info!(reason, "session ended");
    }

    fn persist(&self, session: &SessionToken) -> ApiResult<()> {
        self.store.set(TOKEN_KEY, &session.token)?;
        match &session.user {
            Some(user) => {
                let serialized = serde_json::to_string(user).map_err(|err| {
                    ApiError::Store(format!("failed to serialize user descriptor: {err}"))
                })?;
                self.store.set(USER_KEY, &serialized)?;
            }
            None => self.store.remove(USER_KEY)?,
        }
        match session.issued_at {
            Some(issued_at) => self.store.set(ISSUED_AT_KEY, &issued_at.to_rfc3339()),
            None => self.store.remove(ISSUED_AT_KEY),
        }
    }

    fn load_session(&self) -> ApiResult<Option<SessionToken>> {
        let Some(token) = self
            .store
            .get(TOKEN_KEY)?
            .filter(|token| !token.trim().is_empty())
        else {
            return Ok(None);
        };

        let user = self
            .store
            .get(USER_KEY)?
            .and_then(|raw| match serde_json::from_str::<UserDescriptor>(&raw) {
                Ok(user) => Some(user),
                Err(err) => {
                    warn!("ignoring unreadable user descriptor: {err}");
                    None
                }
            });
        let issued_at = self
            .store
            .get(ISSUED_AT_KEY)?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|time| time.with_timezone(&Utc));

        Ok(Some(SessionToken {
            token,
            user,
            issued_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ApiConfig,
        gateway::mock::MockTransport,
        models::ResourceKind,
        session::store::{FileTokenStore, MemoryTokenStore},
    };
    use serde_json::json;
    use tempfile::tempdir;
    use tokio::sync::{oneshot, Notify};

    fn guard_with(mock: &Arc<MockTransport>, store: Arc<dyn TokenStore>) -> SessionGuard {
        let gateway = Gateway::new(ApiConfig::default(), mock.clone());
        SessionGuard::new(gateway, store, CredentialPolicy::default())
    }

    fn memory_store() -> Arc<MemoryTokenStore> {
        Arc::new(MemoryTokenStore::new())
    }

    #[test]
    fn empty_store_is_unauthenticated_without_network() {
        let mock = MockTransport::new();
        let guard = guard_with(&mock, memory_store());

        assert_eq!(guard.state(), AuthCheck::Checking);
        assert_eq!(guard.check_session(), AuthCheck::Unauthenticated);
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn stored_token_is_authenticated_without_network() {
        let mock = MockTransport::new();
        let store = memory_store();
        store.set(TOKEN_KEY, "abc").expect("seed");
        let guard = guard_with(&mock, store);

        assert_eq!(guard.check_session(), AuthCheck::Authenticated);
        assert_eq!(guard.current_session().map(|s| s.token).as_deref(), Some("abc"));
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn blank_token_does_not_count() {
        let mock = MockTransport::new();
        let store = memory_store();
        store.set(TOKEN_KEY, "   ").expect("seed");
        let guard = guard_with(&mock, store);

        assert_eq!(guard.check_session(), AuthCheck::Unauthenticated);
    }

    #[tokio::test]
    async fn login_success_persists_token_and_authenticates() {
        let mock = MockTransport::new();
        mock.push_json(200, json!({"token": "tok-1", "user": {"id": "u1"}}));
        let store = memory_store();
        let guard = guard_with(&mock, store.clone());

        let session = guard.login("alice", "secret1").await.expect("login");
        assert_eq!(session.token, "tok-1");
        assert_eq!(store.get(TOKEN_KEY).expect("get").as_deref(), Some("tok-1"));
        assert_eq!(guard.state(), AuthCheck::Authenticated);
        assert_eq!(
            guard.current_user().and_then(|user| user.id).as_deref(),
            Some("u1")
        );

        let stored_user = store.get(USER_KEY).expect("get").expect("user stored");
        let user: UserDescriptor = serde_json::from_str(&stored_user).expect("descriptor");
        assert_eq!(user.id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn login_failure_leaves_store_empty_and_propagates_status() {
        let mock = MockTransport::new();
        mock.push(401, "");
        let store = memory_store();
        let policy = CredentialPolicy {
            min_username_len: 3,
            min_password_len: 5,
        };
        let guard = SessionGuard::new(
            Gateway::new(ApiConfig::default(), mock.clone()),
            store.clone(),
            policy,
        );

        let err = guard.login("alice", "wrong").await.expect_err("401 must fail");
        assert!(matches!(err, ApiError::HttpStatus { code: 401, .. }));
        assert_eq!(store.get(TOKEN_KEY).expect("get"), None);
        assert_eq!(guard.state(), AuthCheck::Unauthenticated);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn default_policy_rejects_short_passwords_locally() {
        let mock = MockTransport::new();
        let guard = guard_with(&mock, memory_store());

        let err = guard.login("alice", "wrong").await.expect_err("too short");
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn short_username_fails_validation_without_network() {
        let mock = MockTransport::new();
        let guard = guard_with(&mock, memory_store());

        let err = guard.login("ab", "secret1").await.expect_err("too short");
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn requests_carry_the_session_bearer() {
        let mock = MockTransport::new();
        mock.push_json(200, json!({"token": "tok-1", "user": {"id": "u1"}}));
        mock.push_json(200, json!([]));
        let guard = guard_with(&mock, memory_store());

        guard.login("alice", "secret1").await.expect("login");
        let materials = guard.gateway().resource(ResourceKind::Materials);
        let _: Vec<Value> = guard
            .guarded(materials.list_all())
            .await
            .expect("list");

        let sent = mock.requests();
        assert_eq!(sent[0].header("authorization"), None);
        assert_eq!(sent[1].header("authorization"), Some("Bearer tok-1"));
    }

    #[tokio::test]
    async fn rejected_call_tears_the_session_down() {
        let mock = MockTransport::new();
        mock.push(401, "");
        let store = memory_store();
        store.set(TOKEN_KEY, "expired").expect("seed");
        let guard = guard_with(&mock, store.clone());
        assert_eq!(guard.check_session(), AuthCheck::Authenticated);

        let brands = guard.gateway().resource(ResourceKind::Brands);
        let err = guard
            .guarded(brands.list_all::<Value>())
            .await
            .expect_err("401 must fail");
        assert_eq!(err, ApiError::SessionExpired { code: 401 });
        assert_eq!(store.get(TOKEN_KEY).expect("get"), None);
        assert_eq!(guard.check_session(), AuthCheck::Unauthenticated);
    }

    #[tokio::test]
    async fn late_rejection_from_an_earlier_session_keeps_the_new_one() {
        let mock = MockTransport::new();
        mock.push_json(200, json!({"token": "fresh", "user": {"id": "u1"}}));
        let store = memory_store();
        store.set(TOKEN_KEY, "old").expect("seed");
        let guard = guard_with(&mock, store.clone());
        assert_eq!(guard.check_session(), AuthCheck::Authenticated);

        let (sent_tx, sent_rx) = oneshot::channel::<()>();
        let release = Arc::new(Notify::new());
        let in_flight = {
            let release = Arc::clone(&release);
            async move {
                let _ = sent_tx.send(());
                release.notified().await;
                Err::<Vec<Value>, _>(ApiError::HttpStatus {
                    code: 401,
                    status_text: "Unauthorized".to_string(),
                })
            }
        };
        let relogin = async {
            sent_rx.await.expect("call issued");
            guard.logout().await;
            guard.login("alice", "secret1").await.expect("relogin");
            release.notify_one();
        };

        let (result, ()) = tokio::join!(guard.guarded(in_flight), relogin);
        assert!(matches!(result, Err(ApiError::HttpStatus { code: 401, .. })));
        assert_eq!(guard.state(), AuthCheck::Authenticated);
        assert_eq!(
            guard.current_session().map(|s| s.token).as_deref(),
            Some("fresh")
        );
        assert_eq!(store.get(TOKEN_KEY).expect("get").as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn other_failures_pass_through_guarded_calls() {
        let mock = MockTransport::new();
        mock.push(404, "");
        let store = memory_store();
        store.set(TOKEN_KEY, "abc").expect("seed");
        let guard = guard_with(&mock, store.clone());
        guard.check_session();

        let sectors = guard.gateway().resource(ResourceKind::Sectors);
        let err = guard
            .guarded(sectors.get_one::<Value>(5))
            .await
            .expect_err("404 must fail");
        assert!(matches!(err, ApiError::HttpStatus { code: 404, .. }));
        assert_eq!(guard.state(), AuthCheck::Authenticated);
        assert_eq!(store.get(TOKEN_KEY).expect("get").as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn logout_clears_locally_even_when_backend_fails() {
        let mock = MockTransport::new();
        mock.push_error(ApiError::Network("connection refused".to_string()));
        let mut config = ApiConfig::default();
        config.paths.logout = Some("/api/logout".to_string());
        let store = memory_store();
        store.set(TOKEN_KEY, "abc").expect("seed");
        let guard = SessionGuard::new(
            Gateway::new(config, mock.clone()),
            store.clone(),
            CredentialPolicy::default(),
        );
        guard.check_session();

        guard.logout().await;
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.requests()[0].header("authorization"), Some("Bearer abc"));
        assert_eq!(store.get(TOKEN_KEY).expect("get"), None);
        assert_eq!(guard.state(), AuthCheck::Unauthenticated);
    }

    #[tokio::test]
    async fn signup_never_changes_the_session() {
        let mock = MockTransport::new();
        mock.push_json(201, json!({"id": 3}));
        let store = memory_store();
        let guard = guard_with(&mock, store.clone());
        guard.check_session();

        guard.signup("bob", "hunter22").await.expect("signup");
        assert_eq!(guard.state(), AuthCheck::Unauthenticated);
        assert_eq!(store.get(TOKEN_KEY).expect("get"), None);

        let err = guard.signup("bo", "hunter22").await.expect_err("too short");
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn require_session_follows_the_state_machine() {
        let mock = MockTransport::new();
        let store = memory_store();
        let guard = guard_with(&mock, store.clone());

        assert_eq!(guard.require_session(|| "page"), Gate::Loading);

        guard.check_session();
        let mut rendered = false;
        assert_eq!(
            guard.require_session(|| {
                rendered = true;
            }),
            Gate::RedirectToLogin
        );
        assert!(!rendered);

        store.set(TOKEN_KEY, "abc").expect("seed");
        guard.mount();
        assert_eq!(guard.state(), AuthCheck::Checking);
        guard.check_session();
        assert_eq!(guard.require_session(|| "page"), Gate::Render("page"));
    }

    #[tokio::test]
    async fn session_survives_a_restart_through_the_file_store() {
        let dir = tempdir().expect("tempdir");
        let mock = MockTransport::new();
        mock.push_json(200, json!({"token": "tok-1", "user": {"id": 42, "username": "alice"}}));

        let store = Arc::new(FileTokenStore::for_origin(dir.path(), "http://localhost:8080"));
        guard_with(&mock, store)
            .login("alice", "secret1")
            .await
            .expect("login");

        let reopened = Arc::new(FileTokenStore::for_origin(dir.path(), "http://localhost:8080"));
        let guard = guard_with(&mock, reopened);
        assert_eq!(guard.check_session(), AuthCheck::Authenticated);
        let user = guard.current_user().expect("user");
        assert_eq!(user.id.as_deref(), Some("42"));
        assert_eq!(user.display_name(), "alice");
        assert!(guard.current_session().and_then(|s| s.issued_at).is_some());
    }
}
