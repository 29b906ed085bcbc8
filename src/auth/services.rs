use std::{future::Future, sync::Arc, time::Duration};

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest, UpdateUserRequest},
        jwt::JwtKeys,
        password,
    },
    error::{AuthError, AuthResult},
    users::{StoreError, User, UserStore, UserUpdate},
};

pub const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn required_name(field: &str, value: &str) -> AuthResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::InvalidInput(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Registration, login and profile operations over a [`UserStore`].
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: Arc<JwtKeys>,
    store_timeout: Duration,
    /// Verified against when the email is unknown so both login failures cost the same.
    dummy_hash: Arc<OnceCell<Option<String>>>,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, keys: Arc<JwtKeys>, store_timeout: Duration) -> Self {
        Self {
            store,
            keys,
            store_timeout,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_ms = self.store_timeout.as_millis() as u64, "user store call timed out");
                Err(StoreError::Timeout)
            }
        }
    }

    async fn hash(&self, plain: String) -> AuthResult<String> {
        tokio::task::spawn_blocking(move || password::hash_password(&plain))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .map_err(AuthError::from)
    }

    async fn verify(&self, plain: String, hash: String) -> AuthResult<bool> {
        tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    async fn dummy_hash(&self) -> Option<&str> {
        self.dummy_hash
            .get_or_init(|| async {
                match self.hash("login-timing-equalizer".to_string()).await {
                    Ok(hash) => Some(hash),
                    Err(e) => {
                        error!(error = %e, "dummy hash unavailable; unknown-email logins skip the verify");
                        None
                    }
                }
            })
            .await
            .as_deref()
    }

    pub async fn register(&self, req: RegisterRequest) -> AuthResult<User> {
        let email = normalize_email(&req.email);
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AuthError::InvalidInput("Invalid email".into()));
        }
        if req.password.chars().count() < MIN_PASSWORD_LEN {
            warn!("password too short");
            return Err(AuthError::InvalidInput(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters long"
            )));
        }
        let first_name = required_name("first_name", &req.first_name)?;
        let last_name = required_name("last_name", &req.last_name)?;

        if self
            .bounded("find_by_email", self.store.find_by_email(&email))
            .await?
            .is_some()
        {
            warn!(email = %email, "email already registered");
            return Err(AuthError::AlreadyExists);
        }

        let password_hash = self.hash(req.password).await?;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash,
            first_name,
            last_name,
            phone_number: None,
            date_of_birth: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        match self.bounded("insert", self.store.insert(&user)).await {
            Ok(_) => {}
            Err(StoreError::Duplicate) => {
                warn!(email = %user.email, "email registered concurrently");
                return Err(AuthError::AlreadyExists);
            }
            Err(e) => return Err(e.into()),
        }

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Returns a fresh session token and the authenticated user.
    pub async fn login(&self, req: LoginRequest) -> AuthResult<(String, User)> {
        let email = normalize_email(&req.email);
        if email.is_empty() || req.password.is_empty() {
            return Err(AuthError::InvalidInput("email and password are required".into()));
        }
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AuthError::InvalidInput("Invalid email".into()));
        }

        let user = match self
            .bounded("find_by_email", self.store.find_by_email(&email))
            .await?
        {
            Some(user) => user,
            None => {
                if let Some(dummy) = self.dummy_hash().await {
                    self.verify(req.password, dummy.to_string()).await?;
                }
                warn!(email = %email, "login unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.verify(req.password, user.password_hash.clone()).await? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            warn!(user_id = %user.id, "login on deactivated account");
            return Err(AuthError::AccountDeactivated);
        }

        let token = self.keys.issue(&user)?;
        info!(user_id = %user.id, email = %user.email, "user logged in");
        Ok((token, user))
    }

    pub async fn get_user(&self, id: Uuid) -> AuthResult<User> {
        self.bounded("find_by_id", self.store.find_by_id(id))
            .await?
            .ok_or(AuthError::NotFound)
    }

    /// Apply only the fields present in `req` and refresh `updated_at`.
    pub async fn update_profile(&self, id: Uuid, req: UpdateUserRequest) -> AuthResult<()> {
        let changes = UserUpdate {
            first_name: req
                .first_name
                .as_deref()
                .map(|v| required_name("first_name", v))
                .transpose()?,
            last_name: req
                .last_name
                .as_deref()
                .map(|v| required_name("last_name", v))
                .transpose()?,
            phone_number: req.phone_number.map(|v| v.trim().to_string()),
            date_of_birth: req.date_of_birth,
            ..UserUpdate::touch(OffsetDateTime::now_utc())
        };
        self.apply(id, &changes).await?;
        debug!(user_id = %id, "profile updated");
        Ok(())
    }

    /// Soft-delete: the record stays, login is refused from now on.
    pub async fn deactivate(&self, id: Uuid) -> AuthResult<()> {
        let changes = UserUpdate {
            is_active: Some(false),
            ..UserUpdate::touch(OffsetDateTime::now_utc())
        };
        self.apply(id, &changes).await?;
        info!(user_id = %id, "account deactivated");
        Ok(())
    }

    async fn apply(&self, id: Uuid, changes: &UserUpdate) -> AuthResult<()> {
        match self.bounded("update", self.store.update(id, changes)).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound) => Err(AuthError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::jwt::TokenError, config::JwtConfig, users::InMemoryUserStore};
    use async_trait::async_trait;

    fn keys() -> Arc<JwtKeys> {
        Arc::new(JwtKeys::from_config(&JwtConfig {
            secret: "test-secret".into(),
            issuer: "test".into(),
            ttl_minutes: 24 * 60,
            leeway_secs: 0,
            fallback_secret: false,
        }))
    }

    fn service() -> (AuthService, Arc<JwtKeys>) {
        let keys = keys();
        let svc = AuthService::new(
            Arc::new(InMemoryUserStore::new()),
            keys.clone(),
            Duration::from_secs(5),
        );
        (svc, keys)
    }

    fn register_req(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: password.into(),
            first_name: "A".into(),
            last_name: "B".into(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("a b@x.com"));
    }

    #[tokio::test]
    async fn register_then_login_issues_valid_token() {
        let (svc, keys) = service();
        let user = svc.register(register_req("a@x.com", "longenough1")).await.unwrap();
        assert!(user.is_active);
        assert_ne!(user.password_hash, "longenough1");

        let (token, logged_in) = svc.login(login_req("a@x.com", "longenough1")).await.unwrap();
        assert_eq!(logged_in.id, user.id);
        let claims = keys.validate(&token).expect("token validates");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "a@x.com");
    }

    #[tokio::test]
    async fn register_normalizes_email() {
        let (svc, _) = service();
        let user = svc.register(register_req("  A@X.com ", "longenough1")).await.unwrap();
        assert_eq!(user.email, "a@x.com");
        assert!(svc.login(login_req("A@x.COM", "longenough1")).await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_regardless_of_password() {
        let (svc, _) = service();
        svc.register(register_req("a@x.com", "longenough1")).await.unwrap();
        let err = svc
            .register(register_req("a@x.com", "another-password"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AlreadyExists));
    }

    #[tokio::test]
    async fn register_validates_input() {
        let (svc, _) = service();
        let cases = [
            register_req("not-an-email", "longenough1"),
            register_req("a@x.com", "short"),
            RegisterRequest {
                first_name: "  ".into(),
                ..register_req("a@x.com", "longenough1")
            },
            RegisterRequest {
                last_name: String::new(),
                ..register_req("a@x.com", "longenough1")
            },
        ];
        for req in cases {
            let err = svc.register(req).await.unwrap_err();
            assert_eq!(err.code(), "INVALID_INPUT");
        }
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_identical() {
        let (svc, _) = service();
        svc.register(register_req("a@x.com", "longenough1")).await.unwrap();

        let wrong = svc.login(login_req("a@x.com", "wrong")).await.unwrap_err();
        let unknown = svc.login(login_req("nobody@x.com", "longenough1")).await.unwrap_err();
        assert_eq!(wrong.code(), "INVALID_CREDENTIALS");
        assert_eq!(unknown.code(), wrong.code());
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn deactivated_account_cannot_login() {
        let (svc, _) = service();
        let user = svc.register(register_req("a@x.com", "longenough1")).await.unwrap();
        svc.deactivate(user.id).await.unwrap();

        let err = svc.login(login_req("a@x.com", "longenough1")).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountDeactivated));
        assert!(!svc.get_user(user.id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn deactivated_account_with_wrong_password_is_invalid_credentials() {
        let (svc, _) = service();
        let user = svc.register(register_req("a@x.com", "longenough1")).await.unwrap();
        svc.deactivate(user.id).await.unwrap();
        let err = svc.login(login_req("a@x.com", "wrong-password")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn update_profile_touches_only_given_fields() {
        let (svc, _) = service();
        let user = svc.register(register_req("a@x.com", "longenough1")).await.unwrap();
        svc.update_profile(
            user.id,
            UpdateUserRequest {
                phone_number: Some("+1-555-0100".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let before = svc.get_user(user.id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        svc.update_profile(
            user.id,
            UpdateUserRequest {
                first_name: Some("Alice".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let after = svc.get_user(user.id).await.unwrap();
        assert_eq!(after.first_name, "Alice");
        assert_eq!(after.last_name, before.last_name);
        assert_eq!(after.phone_number.as_deref(), Some("+1-555-0100"));
        assert_eq!(after.email, before.email);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
    }

    #[tokio::test]
    async fn update_profile_rejects_blank_name_and_unknown_user() {
        let (svc, _) = service();
        let user = svc.register(register_req("a@x.com", "longenough1")).await.unwrap();
        let err = svc
            .update_profile(
                user.id,
                UpdateUserRequest {
                    last_name: Some(" ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");

        let err = svc
            .update_profile(Uuid::new_v4(), UpdateUserRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    #[tokio::test]
    async fn issued_token_for_other_secret_is_rejected() {
        let (svc, _) = service();
        svc.register(register_req("a@x.com", "longenough1")).await.unwrap();
        let (token, _) = svc.login(login_req("a@x.com", "longenough1")).await.unwrap();

        let other = JwtKeys::from_config(&JwtConfig {
            secret: "another-secret".into(),
            issuer: "test".into(),
            ttl_minutes: 60,
            leeway_secs: 0,
            fallback_secret: false,
        });
        assert_eq!(other.validate(&token).unwrap_err(), TokenError::BadSignature);
    }

    #[tokio::test]
    async fn login_rejects_malformed_shape_before_lookup() {
        let svc = AuthService::new(Arc::new(SlowStore), keys(), Duration::from_millis(20));
        for (email, password) in [("", "longenough1"), ("a@x.com", ""), ("not-an-email", "pw")] {
            let err = svc.login(login_req(email, password)).await.unwrap_err();
            assert_eq!(err.code(), "INVALID_INPUT", "email {email:?}");
        }
    }

    #[tokio::test]
    async fn short_password_still_reaches_credential_check() {
        let (svc, _) = service();
        svc.register(register_req("a@x.com", "longenough1")).await.unwrap();
        let err = svc.login(login_req("a@x.com", "wrong")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_email_builds_dummy_hash_once() {
        let (svc, _) = service();
        assert!(svc.dummy_hash.get().is_none());
        svc.login(login_req("ghost@x.com", "longenough1")).await.unwrap_err();
        let first = svc.dummy_hash.get().cloned().flatten().expect("dummy hash built");
        assert!(first.starts_with("$argon2id$"));

        svc.login(login_req("ghost2@x.com", "longenough1")).await.unwrap_err();
        assert_eq!(svc.dummy_hash.get().cloned().flatten(), Some(first));
    }

    struct SlowStore;

    #[async_trait]
    impl UserStore for SlowStore {
        async fn insert(&self, user: &User) -> Result<Uuid, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(user.id)
        }
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }
        async fn find_by_id(&self, _id: Uuid) -> Result<Option<User>, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }
        async fn update(&self, _id: Uuid, _changes: &UserUpdate) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_store_surfaces_timeout() {
        let svc = AuthService::new(Arc::new(SlowStore), keys(), Duration::from_millis(20));
        let err = svc.get_user(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AuthError::Storage(StoreError::Timeout)));
        assert_eq!(err.code(), "TIMEOUT");

        let err = svc.login(login_req("a@x.com", "longenough1")).await.unwrap_err();
        assert_eq!(err.code(), "TIMEOUT");
    }
}
