//! Authenticated Overcast session.
//!
//! Cookies from a successful login are saved to the session path and reused
//! by later runs until the file is removed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use log::{info, warn};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::PalError;
use crate::http::{HttpResponse, HttpTransport};

pub const OVERCAST_BASE_URL: &str = "https://overcast.fm";
pub const OVERCAST_LOGIN_PATH: &str = "/login";

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Result<Self, PalError> {
        let (email, password) = (email.into(), password.into());
        if email.trim().is_empty() || password.is_empty() {
            return Err(PalError::AuthenticationError(
                "Missing EMAIL or PASSWORD environment variables".to_string(),
            ));
        }
        Ok(Self { email, password })
    }
}

/// What gets written to the session file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSession {
    pub base_url: String,
    pub cookies: Vec<String>,
}

/// Cookie-carrying HTTP client for overcast.fm.
#[derive(Clone)]
pub struct OvercastSession {
    client: Client,
    jar: Arc<Jar>,
    base_url: Url,
}

impl OvercastSession {
    fn build(base_url: Url, jar: Arc<Jar>, timeout: Duration) -> Result<Self, PalError> {
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(timeout)
            .user_agent(concat!("podcast-pal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PalError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, jar, base_url })
    }

    pub fn restore(saved: &SavedSession, timeout: Duration) -> Result<Self, PalError> {
        let base_url = Url::parse(&saved.base_url)
            .map_err(|e| PalError::AuthenticationError(format!("Saved session has a bad URL: {}", e)))?;
        let jar = Arc::new(Jar::default());
        for cookie in &saved.cookies {
            jar.add_cookie_str(cookie, &base_url);
        }
        Self::build(base_url, jar, timeout)
    }

    pub fn snapshot(&self) -> SavedSession {
        let cookies = self
            .jar
            .cookies(&self.base_url)
            .and_then(|header| header.to_str().ok().map(str::to_string))
            .map(|header| header.split("; ").map(str::to_string).collect())
            .unwrap_or_default();
        SavedSession { base_url: self.base_url.to_string(), cookies }
    }

    pub fn has_cookies(&self) -> bool {
        !self.snapshot().cookies.is_empty()
    }
}

#[async_trait]
impl HttpTransport for OvercastSession {
    async fn get(&self, url: &str) -> anyhow::Result<HttpResponse> {
        let response = self.client.get(url).send().await.with_context(|| format!("GET {}", url))?;
        let status = response.status().as_u16();
        let body = response.text().await.with_context(|| format!("reading body of {}", url))?;
        Ok(HttpResponse::new(status, body))
    }
}

pub struct SessionManager {
    credentials: Credentials,
    session_path: PathBuf,
    base_url: Url,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(
        credentials: Credentials,
        session_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, PalError> {
        let base_url = Url::parse(OVERCAST_BASE_URL)
            .map_err(|e| PalError::ConfigError(format!("Bad Overcast URL: {}", e)))?;
        Ok(Self {
            credentials,
            session_path: session_path.into(),
            base_url,
            timeout,
        })
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// Restores the saved session if there is one, otherwise logs in.
    pub async fn get_session(&self) -> Result<OvercastSession, PalError> {
        if let Some(saved) = self.load_saved() {
            info!("Found saved session. Restoring!");
            return OvercastSession::restore(&saved, self.timeout);
        }
        info!("No saved session. Authenticating!");
        self.login().await
    }

    fn load_saved(&self) -> Option<SavedSession> {
        let raw = std::fs::read_to_string(&self.session_path).ok()?;
        match serde_json::from_str::<SavedSession>(&raw) {
            Ok(saved) if !saved.cookies.is_empty() => Some(saved),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {}", self.session_path.display(), e);
                None
            }
        }
    }

    pub async fn login(&self) -> Result<OvercastSession, PalError> {
        let session = OvercastSession::build(self.base_url.clone(), Arc::new(Jar::default()), self.timeout)?;
        let login_url = self
            .base_url
            .join(OVERCAST_LOGIN_PATH)
            .map_err(|e| PalError::ConfigError(format!("Bad login URL: {}", e)))?;

        let response = session
            .client
            .post(login_url)
            .form(&[
                ("email", self.credentials.email.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PalError::AuthenticationError(format!("Login request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PalError::AuthenticationError(format!(
                "Authentication failed: HTTP {}",
                response.status()
            )));
        }
        info!("Authenticated successfully. Saving session.");

        if let Err(e) = self.save(&session.snapshot()) {
            warn!("Could not persist session to {}: {}", self.session_path.display(), e);
        }
        Ok(session)
    }

    fn save(&self, saved: &SavedSession) -> Result<(), PalError> {
        let json = serde_json::to_string_pretty(saved)?;
        std::fs::write(&self.session_path, json)?;
        Ok(())
    }
}
