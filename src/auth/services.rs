//! Credential lifecycle: registration, login, token validation and refresh.
//!
//! Requests are stateless. The only shared mutable state is the user store;
//! tokens are never persisted and cannot be revoked before they expire.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    jwt::JwtKeys,
    password::{hash_password, hash_password_blocking, verify_password_blocking},
    repo::{StoreError, UserStore},
    repo_types::{NewUser, User},
};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    // Verified against when the email is unknown so both login failures cost the same.
    static ref DUMMY_HASH: String = hash_password("credcore-dummy-password").unwrap_or_default();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
}

pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys) -> Self {
        lazy_static::initialize(&DUMMY_HASH);
        Self { store, keys }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<User, AuthError> {
        if !is_valid_email(email) {
            return Err(AuthError::Validation("invalid email".into()));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("password is required".into()));
        }
        if name.trim().is_empty() {
            return Err(AuthError::Validation("name is required".into()));
        }

        if self.store.find_by_email(email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AuthError::AlreadyExists);
        }

        let password_hash = hash_password_blocking(password.to_owned()).await?;

        let user = self
            .store
            .create(NewUser {
                email: email.to_owned(),
                password_hash,
                name: name.to_owned(),
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate => {
                    warn!(email = %email, "email registered concurrently");
                    AuthError::AlreadyExists
                }
                StoreError::Other(e) => AuthError::Internal(e),
            })?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<(TokenPair, User), AuthError> {
        let user = match self.store.find_by_email(email).await? {
            Some(u) => u,
            None => {
                let _ = verify_password_blocking(password.to_owned(), DUMMY_HASH.clone()).await;
                warn!(email = %email, "login unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let ok = verify_password_blocking(password.to_owned(), user.password_hash.clone())
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user.id, "stored password hash unusable");
                AuthError::Internal(e)
            })?;
        if !ok {
            warn!(email = %email, user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let pair = self.issue_token_pair(user.id)?;
        info!(user_id = %user.id, "user logged in");
        Ok((pair, user))
    }

    /// Returns the subject of a valid access token.
    #[instrument(skip_all)]
    pub fn validate_token(&self, token: &str) -> Result<Uuid, AuthError> {
        match self.keys.verify_access(token) {
            Ok(claims) => Ok(claims.user_id),
            Err(e) => {
                warn!(error = %e, "token rejected");
                Err(AuthError::InvalidToken)
            }
        }
    }

    /// Issues a fresh pair for the subject of `refresh_token`. The old token
    /// stays valid until it expires.
    #[instrument(skip_all)]
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.keys.verify_refresh(refresh_token).map_err(|e| {
            warn!(error = %e, "refresh token rejected");
            AuthError::InvalidToken
        })?;
        let pair = self.issue_token_pair(claims.user_id)?;
        info!(user_id = %claims.user_id, "tokens refreshed");
        Ok(pair)
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, id: &str) -> Result<User, AuthError> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Err(AuthError::NotFound);
        };
        self.store.find_by_id(id).await?.ok_or(AuthError::NotFound)
    }

    /// There is no server-side session, so this always succeeds.
    pub fn logout(&self) -> bool {
        true
    }

    pub fn issue_token_pair(&self, user_id: Uuid) -> Result<TokenPair, AuthError> {
        let access_token = self.keys.sign_access(user_id)?;
        let refresh_token = self.keys.sign_refresh(user_id)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.keys.access_ttl.as_secs() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::{claims::TokenKind, repo::MemoryUserStore};

    fn service() -> AuthService {
        service_with(JwtKeys::new("test-secret", Duration::from_secs(24 * 60 * 60)))
    }

    fn service_with(keys: JwtKeys) -> AuthService {
        AuthService::new(Arc::new(MemoryUserStore::new()), keys)
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("A.B+c@sub.example.org"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("no-at.example.com"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email(""));
    }

    #[tokio::test]
    async fn register_login_validate_scenario() {
        let svc = service();

        let user = svc.register("a@x.com", "pw123", "Ann").await.expect("register");
        assert!(!user.id.is_nil());
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.name, "Ann");
        assert_ne!(user.password_hash, "pw123");

        let again = svc.register("a@x.com", "pw123", "Ann").await.unwrap_err();
        assert!(matches!(again, AuthError::AlreadyExists));

        let (pair, logged_in) = svc.login("a@x.com", "pw123").await.expect("login");
        assert_eq!(logged_in.id, user.id);
        assert_eq!(pair.expires_in, 86_400);

        assert_eq!(svc.validate_token(&pair.access_token).unwrap(), user.id);
        assert!(matches!(svc.validate_token("garbage"), Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn second_registration_does_not_reuse_id() {
        let svc = service();
        let first = svc.register("a@x.com", "pw", "Ann").await.unwrap();
        assert!(svc.register("a@x.com", "other", "Bob").await.is_err());
        let second = svc.register("b@x.com", "pw", "Bob").await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let svc = service();
        svc.register("a@x.com", "pw123", "Ann").await.unwrap();

        let wrong_pw = svc.login("a@x.com", "nope").await.unwrap_err();
        let unknown = svc.login("b@x.com", "pw123").await.unwrap_err();

        assert!(matches!(wrong_pw, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong_pw.to_string(), unknown.to_string());
        assert_eq!(wrong_pw.status_code(), unknown.status_code());
    }

    #[tokio::test]
    async fn login_is_case_sensitive_on_email() {
        let svc = service();
        svc.register("a@x.com", "pw123", "Ann").await.unwrap();
        assert!(matches!(
            svc.login("A@x.com", "pw123").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn register_validates_input() {
        let svc = service();
        for (email, pw, name) in [
            ("not-an-email", "pw", "Ann"),
            ("a@x.com", "", "Ann"),
            ("a@x.com", "pw", "   "),
        ] {
            let err = svc.register(email, pw, name).await.unwrap_err();
            assert!(matches!(err, AuthError::Validation(_)), "{email} {pw} {name}");
        }
    }

    #[tokio::test]
    async fn refresh_issues_tokens_for_same_subject() {
        let svc = service();
        let user = svc.register("a@x.com", "pw123", "Ann").await.unwrap();
        let (pair, _) = svc.login("a@x.com", "pw123").await.unwrap();

        let refreshed = svc.refresh(&pair.refresh_token).expect("refresh");
        assert_eq!(svc.validate_token(&refreshed.access_token).unwrap(), user.id);
        assert_eq!(refreshed.expires_in, pair.expires_in);

        // Old refresh token keeps working; there is no revocation.
        assert!(svc.refresh(&pair.refresh_token).is_ok());
        assert!(matches!(svc.refresh("garbage"), Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn token_kinds_interchangeable_by_default() {
        let svc = service();
        svc.register("a@x.com", "pw123", "Ann").await.unwrap();
        let (pair, user) = svc.login("a@x.com", "pw123").await.unwrap();

        assert_eq!(svc.validate_token(&pair.refresh_token).unwrap(), user.id);
        assert!(svc.refresh(&pair.access_token).is_ok());
    }

    #[tokio::test]
    async fn token_kinds_enforced_when_configured() {
        let mut keys = JwtKeys::new("test-secret", Duration::from_secs(60));
        keys.enforce_kind = true;
        let svc = service_with(keys);
        svc.register("a@x.com", "pw123", "Ann").await.unwrap();
        let (pair, _) = svc.login("a@x.com", "pw123").await.unwrap();

        assert!(matches!(
            svc.validate_token(&pair.refresh_token),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(svc.refresh(&pair.access_token), Err(AuthError::InvalidToken)));
        assert!(svc.refresh(&pair.refresh_token).is_ok());
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let svc = service();
        let token = svc
            .keys()
            .issue_at(
                Uuid::new_v4(),
                TokenKind::Access,
                Duration::from_secs(60),
                time::OffsetDateTime::now_utc() - time::Duration::seconds(120),
            )
            .unwrap();
        assert!(matches!(svc.validate_token(&token), Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn get_user_by_id() {
        let svc = service();
        let user = svc.register("a@x.com", "pw123", "Ann").await.unwrap();

        let found = svc.get_user(&user.id.to_string()).await.unwrap();
        assert_eq!(found.email, "a@x.com");
        assert!(matches!(
            svc.get_user(&Uuid::new_v4().to_string()).await,
            Err(AuthError::NotFound)
        ));
        assert!(matches!(svc.get_user("not-a-uuid").await, Err(AuthError::NotFound)));
    }

    #[tokio::test]
    async fn login_with_huge_ttl_does_not_panic() {
        let svc = service_with(JwtKeys::new("test-secret", Duration::from_secs(1_000_000_000 * 3600)));
        svc.register("a@x.com", "pw123", "Ann").await.unwrap();
        let (pair, user) = svc.login("a@x.com", "pw123").await.expect("login");
        assert_eq!(svc.validate_token(&pair.access_token).unwrap(), user.id);
        assert!(svc.refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn dummy_hash_ready_after_construction() {
        let _svc = service();
        assert!(DUMMY_HASH.starts_with("$argon2"));
        assert!(crate::auth::password::verify_password("credcore-dummy-password", &DUMMY_HASH).unwrap());
    }

    #[test]
    fn logout_always_succeeds() {
        assert!(service().logout());
    }
}
