//! Credentials: signup validation, password hashing, and access tokens.

use crate::error::ApiError;
use crate::types::{User, UserRole};
use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const USERNAME_MIN_LEN: usize = 4;
pub const USERNAME_MAX_LEN: usize = 20;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 32;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signup request body.
#[derive(Debug, Clone, Deserialize)]
pub struct SignUp {
    pub username: Option<String>,
    pub password: String,
    pub email: String,
    /// Honored only under the `any_authenticated` relation policy.
    pub role: Option<UserRole>,
}

/// Signin request body.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

pub fn validate_email(email: &str) -> std::result::Result<(), ApiError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(ApiError::invalid_argument("email", "email must be an email"))
    }
}

/// Password rules: 8-32 characters, an uppercase and a lowercase letter, a
/// digit or symbol, and no leading '.'.
pub fn validate_password(password: &str) -> std::result::Result<(), ApiError> {
    let len = password.chars().count();
    if len < PASSWORD_MIN_LEN {
        return Err(ApiError::invalid_argument(
            "password",
            format!("password must be longer than or equal to {} characters", PASSWORD_MIN_LEN),
        ));
    }
    if len > PASSWORD_MAX_LEN {
        return Err(ApiError::invalid_argument(
            "password",
            format!("password must be shorter than or equal to {} characters", PASSWORD_MAX_LEN),
        ));
    }

    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit_or_symbol = password
        .chars()
        .any(|c| c.is_ascii_digit() || !(c.is_alphanumeric() || c == '_'));
    let bad_start = password.starts_with('.') || password.contains('\n');

    if !(has_upper && has_lower && has_digit_or_symbol) || bad_start {
        return Err(ApiError::invalid_argument("password", "password is weak"));
    }
    Ok(())
}

pub fn validate_username(username: &str) -> std::result::Result<(), ApiError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ApiError::invalid_argument(
            "username",
            format!(
                "username must be between {} and {} characters",
                USERNAME_MIN_LEN, USERNAME_MAX_LEN
            ),
        ));
    }
    Ok(())
}

impl SignUp {
    /// Validate the request and return the username to store.
    ///
    /// Without an explicit username the local part of the email is used.
    pub fn validate(&self) -> std::result::Result<String, ApiError> {
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        match &self.username {
            Some(username) => {
                validate_username(username)?;
                Ok(username.clone())
            }
            None => Ok(self
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string()),
        }
    }
}

/// Hash a plaintext password.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// Verify a password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("stored password hash is invalid: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// HS256 signing and verification keys derived from the shared secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: u64,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Issue an access token for `user`.
    pub fn issue(&self, user: &User) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let exp = i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| anyhow!("token ttl {} is out of range", self.ttl_seconds))?;
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            iat: now,
            exp,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Verify signature and expiry and return the claims.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}
