//! Credentials and the host:port scope they apply to.
//!
//! # Design
//! Secrets live in `SecureString`, which zeroes its memory on drop and never
//! prints its value through `Debug` or `Display`. Credentials are only
//! attached to requests that target the endpoint's own host and port.

use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CimiError;

/// Sensitive string data, zeroed on drop and redacted when printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl From<String> for SecureString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecureString {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl Serialize for SecureString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Credentials sent with every in-scope request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    /// HTTP Basic authentication (RFC 7617).
    Basic {
        username: String,
        password: SecureString,
    },
    /// Bearer token authentication (RFC 6750).
    Bearer(SecureString),
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<SecureString>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<SecureString>) -> Self {
        Credentials::Bearer(token.into())
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> Result<String, CimiError> {
        match self {
            Credentials::Basic { username, password } => {
                if username.contains(':') {
                    return Err(CimiError::Authentication(
                        "username cannot contain ':'".to_string(),
                    ));
                }
                let raw = format!("{username}:{}", password.as_str());
                let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
                Ok(format!("Basic {encoded}"))
            }
            Credentials::Bearer(token) => {
                if token.as_str().chars().any(|c| c.is_control()) {
                    return Err(CimiError::Authentication(
                        "bearer token contains control characters".to_string(),
                    ));
                }
                Ok(format!("Bearer {}", token.as_str()))
            }
        }
    }

    /// Short label safe for logs.
    pub fn describe(&self) -> String {
        match self {
            Credentials::Basic { username, .. } => format!("basic({username})"),
            Credentials::Bearer(_) => "bearer".to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Credentials::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
        }
    }
}

/// The host and port credentials are valid for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthScope {
    host: String,
    port: Option<u16>,
}

impl AuthScope {
    pub fn from_url(url: &Url) -> Result<Self, CimiError> {
        let host = url
            .host_str()
            .ok_or_else(|| CimiError::InvalidUrl(format!("{url} has no host")))?;
        Ok(Self {
            host: host.to_ascii_lowercase(),
            port: url.port_or_known_default(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Whether `url` targets this scope. Unparseable URLs never match.
    pub fn matches(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|target| Self::from_url(&target).ok())
            .is_some_and(|target| target == *self)
    }
}
