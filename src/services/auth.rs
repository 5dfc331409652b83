//! Registration, login and bearer tokens.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Role, User};
use crate::domain::value_objects::normalize_email;
use crate::repository::UserRepository;
use crate::{CommerceError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CommerceError::Internal(format!("Password hashing failed: {e}")))
}

pub fn verify_password(hash: &str, password: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| CommerceError::Internal(format!("Invalid stored password hash: {e}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CommerceError::Internal(format!("Password verification failed: {e}"))),
    }
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    admin_emails: Arc<Vec<String>>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, secret: &str, ttl_hours: i64, admin_emails: Vec<String>) -> Self {
        Self {
            users,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
            admin_emails: Arc::new(admin_emails),
        }
    }

    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse> {
        req.validate()?;
        let email = normalize_email(&req.email);
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(CommerceError::Conflict("Email already registered".to_string()));
        }

        let role = if self.admin_emails.contains(&email) { Role::Admin } else { Role::Customer };
        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            email,
            password_hash: Some(hash_password(&req.password)?),
            first_name: req.first_name,
            last_name: req.last_name,
            phone: req.phone,
            role,
            created_at: now,
            updated_at: now,
        };
        let user = self.users.insert(&user).await?;
        info!(user_id = %user.id, role = %user.role, "User registered");

        let access_token = self.issue_token(&user)?;
        Ok(AuthResponse { user, access_token })
    }

    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse> {
        req.validate()?;
        let invalid = || CommerceError::Unauthorized("Invalid credentials".to_string());
        let user = self.users.find_by_email(&normalize_email(&req.email)).await?.ok_or_else(invalid)?;
        let hash = user.password_hash.as_deref().ok_or_else(invalid)?;
        if !verify_password(hash, &req.password)? {
            return Err(invalid());
        }
        let access_token = self.issue_token(&user)?;
        Ok(AuthResponse { user, access_token })
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<User> {
        self.users
            .find(user_id)
            .await?
            .ok_or_else(|| CommerceError::NotFound("User not found".to_string()))
    }

    pub fn issue_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| CommerceError::Internal(format!("Token signing failed: {e}")))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| CommerceError::Unauthorized("Invalid or expired token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repositories;

    fn service(admins: &[&str]) -> AuthService {
        let repos = Repositories::in_memory();
        AuthService::new(repos.users, "test-secret", 1, admins.iter().map(|s| s.to_string()).collect())
    }

    fn register(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(), password: "correct horse".into(),
            first_name: None, last_name: None, phone: None,
        }
    }

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("s3cret-pass").unwrap();
        assert!(verify_password(&hash, "s3cret-pass").unwrap());
        assert!(!verify_password(&hash, "wrong").unwrap());
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = service(&[]);
        let registered = auth.register(register("Shopper@Example.com")).await.unwrap();
        assert_eq!(registered.user.email, "shopper@example.com");
        assert_eq!(registered.user.role, Role::Customer);

        let claims = auth.verify_token(&registered.access_token).unwrap();
        assert_eq!(claims.sub, registered.user.id);

        let login = LoginRequest { email: "shopper@example.com".into(), password: "correct horse".into() };
        assert!(auth.login(login).await.is_ok());

        let bad = LoginRequest { email: "shopper@example.com".into(), password: "nope".into() };
        assert!(matches!(auth.login(bad).await, Err(CommerceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let auth = service(&[]);
        auth.register(register("a@example.com")).await.unwrap();
        assert!(matches!(auth.register(register("A@example.com")).await, Err(CommerceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_admin_emails_register_as_admin() {
        let auth = service(&["boss@example.com"]);
        let response = auth.register(register("boss@example.com")).await.unwrap();
        assert_eq!(response.user.role, Role::Admin);
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let auth = service(&[]);
        assert!(matches!(auth.verify_token("not.a.token"), Err(CommerceError::Unauthorized(_))));
    }
}
