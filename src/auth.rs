use crate::config::SdkConfig;
use crate::http::Headers;
use chrono::{DateTime, Utc};

/// Credentials and connection settings for one backend.
///
/// Token refresh is out of scope: an expired credential makes every provider
/// operation abort before touching the network.
pub trait AuthenticationProvider: Send + Sync {
    /// Base URL of the service, without a trailing slash
    fn server(&self) -> String;

    fn is_token_expired(&self) -> bool;

    /// Authorization headers; `include_content_negotiation` adds JSON
    /// `Accept` / `Content-Type` defaults
    fn authorization_headers(&self, include_content_negotiation: bool) -> Headers;

    fn proxy(&self) -> Option<String>;

    fn accept_invalid_certs(&self) -> bool;
}

/// Bearer-token credential used by the resource-style service
#[derive(Debug, Clone)]
pub struct TokenAuthProvider {
    server: String,
    token: String,
    expires_at: Option<DateTime<Utc>>,
    proxy: Option<String>,
    accept_invalid_certs: bool,
}

impl TokenAuthProvider {
    pub fn new(server: &str, token: &str) -> Self {
        Self {
            server: server.trim_end_matches('/').to_string(),
            token: token.to_string(),
            expires_at: None,
            proxy: None,
            accept_invalid_certs: false,
        }
    }

    pub fn from_config(config: &SdkConfig) -> Self {
        Self {
            server: config.server.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            expires_at: config.token_expires_at,
            proxy: config.proxy.clone(),
            accept_invalid_certs: config.accept_invalid_certs,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

impl AuthenticationProvider for TokenAuthProvider {
    fn server(&self) -> String {
        self.server.clone()
    }

    fn is_token_expired(&self) -> bool {
        self.token.is_empty() || self.expires_at.map(|at| at <= Utc::now()).unwrap_or(false)
    }

    fn authorization_headers(&self, include_content_negotiation: bool) -> Headers {
        let mut headers = Headers::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", self.token));
        if include_content_negotiation {
            headers.insert("Accept".to_string(), "application/json".to_string());
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        headers
    }

    fn proxy(&self) -> Option<String> {
        self.proxy.clone()
    }

    fn accept_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }
}

/// Session credential used by the job-style service: a session cookie plus the
/// anti-forgery token every state-changing request must echo.
#[derive(Debug, Clone)]
pub struct SessionAuthProvider {
    server: String,
    session_id: String,
    xsrf_token: String,
    expires_at: Option<DateTime<Utc>>,
    proxy: Option<String>,
    accept_invalid_certs: bool,
}

/// Header carrying the job-style service's anti-forgery token
pub const XSRF_HEADER: &str = "asc_xsrf_token";

impl SessionAuthProvider {
    pub fn new(server: &str, session_id: &str, xsrf_token: &str) -> Self {
        Self {
            server: server.trim_end_matches('/').to_string(),
            session_id: session_id.to_string(),
            xsrf_token: xsrf_token.to_string(),
            expires_at: None,
            proxy: None,
            accept_invalid_certs: false,
        }
    }

    pub fn from_config(config: &SdkConfig) -> Self {
        Self {
            server: config.server.trim_end_matches('/').to_string(),
            session_id: config.token.clone(),
            xsrf_token: config.xsrf_token.clone().unwrap_or_default(),
            expires_at: config.token_expires_at,
            proxy: config.proxy.clone(),
            accept_invalid_certs: config.accept_invalid_certs,
        }
    }
}

impl AuthenticationProvider for SessionAuthProvider {
    fn server(&self) -> String {
        self.server.clone()
    }

    fn is_token_expired(&self) -> bool {
        self.session_id.is_empty() || self.expires_at.map(|at| at <= Utc::now()).unwrap_or(false)
    }

    fn authorization_headers(&self, include_content_negotiation: bool) -> Headers {
        let mut headers = Headers::new();
        headers.insert("Cookie".to_string(), format!("asc_session_id={}", self.session_id));
        headers.insert(XSRF_HEADER.to_string(), self.xsrf_token.clone());
        if include_content_negotiation {
            headers.insert("Accept".to_string(), "application/json".to_string());
        }
        headers
    }

    fn proxy(&self) -> Option<String> {
        self.proxy.clone()
    }

    fn accept_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_token_expiry() {
        let auth = TokenAuthProvider::new("https://cloud.test/", "abc");
        assert!(!auth.is_token_expired());
        assert_eq!(auth.server(), "https://cloud.test");

        let expired = auth.clone().with_expiry(Utc::now() - Duration::minutes(1));
        assert!(expired.is_token_expired());

        let valid = auth.with_expiry(Utc::now() + Duration::hours(1));
        assert!(!valid.is_token_expired());
    }

    #[test]
    fn test_empty_token_counts_as_expired() {
        assert!(TokenAuthProvider::new("https://cloud.test", "").is_token_expired());
        assert!(SessionAuthProvider::new("https://ase.test", "", "x").is_token_expired());
    }

    #[test]
    fn test_bearer_headers() {
        let auth = TokenAuthProvider::new("https://cloud.test", "abc");
        let headers = auth.authorization_headers(false);
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer abc");
        assert!(!headers.contains_key("Accept"));

        let headers = auth.authorization_headers(true);
        assert_eq!(headers.get("Accept").unwrap(), "application/json");
    }

    #[test]
    fn test_session_headers_carry_xsrf_token() {
        let auth = SessionAuthProvider::new("https://ase.test/ase", "s1", "x1");
        let headers = auth.authorization_headers(true);
        assert_eq!(headers.get("Cookie").unwrap(), "asc_session_id=s1");
        assert_eq!(headers.get(XSRF_HEADER).unwrap(), "x1");
    }
}
