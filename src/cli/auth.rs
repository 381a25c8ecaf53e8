//! Server login stored in the system keyring
//!
//! The credentials live in a single keyring entry as JSON. The entry name
//! is fixed, so one machine user has one stored server at a time.

use anyhow::{Context, Result, bail};
use dialoguer::{Input, Password};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::api::HttpClient;

const KEYRING_SERVICE: &str = "tunemirror";
const KEYRING_ENTRY: &str = "server";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCredentials {
    pub url: String,
    pub login: String,
    pub password: String,
}

impl ServerCredentials {
    /// Build credentials from user input, normalizing the server URL
    pub fn new(url: &str, login: String, password: String) -> Result<Self> {
        let parsed = Url::parse(url.trim()).with_context(|| format!("Invalid server URL: {}", url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("Server URL must use http or https: {}", url);
        }
        if login.is_empty() {
            bail!("Login must not be empty");
        }

        Ok(Self {
            url: parsed.as_str().trim_end_matches('/').to_string(),
            login,
            password,
        })
    }
}

pub struct AuthManager;

impl AuthManager {
    /// Reuse the stored login unless `force` is set; otherwise prompt for
    /// whatever was not given, verify it against the server and store it.
    pub async fn authenticate(
        url: Option<String>,
        login: Option<String>,
        password: Option<String>,
        force: bool,
    ) -> Result<ServerCredentials> {
        if force {
            debug!("Ignoring stored credentials");
        } else if let Ok(creds) = Self::load() {
            info!("Using stored credentials for {}", creds.url);
            return Ok(creds);
        }

        let url = url.map_or_else(|| prompt("Server URL"), Ok)?;
        let login = login.map_or_else(|| prompt("Login"), Ok)?;
        let password = match password {
            Some(password) => password,
            None => Password::new()
                .with_prompt("Password")
                .interact()
                .context("Failed to read password")?,
        };

        let creds = ServerCredentials::new(&url, login, password)?;
        Self::connect(&creds).await?;
        Self::store(&creds)?;

        Ok(creds)
    }

    pub fn load() -> Result<ServerCredentials> {
        let raw = entry()?
            .get_password()
            .context("No stored credentials")?;
        serde_json::from_str(&raw).context("Stored credentials are corrupt")
    }

    pub fn store(creds: &ServerCredentials) -> Result<()> {
        let raw = serde_json::to_string(creds)?;
        entry()?
            .set_password(&raw)
            .context("Failed to write credentials to keyring")?;
        info!("Saved credentials for {} to keyring", creds.url);
        Ok(())
    }

    pub fn clear() -> Result<()> {
        match entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => warn!("Could not remove keyring entry: {}", e),
        }
        Ok(())
    }

    /// Log in and return a client carrying the session cookie
    pub async fn connect(creds: &ServerCredentials) -> Result<HttpClient> {
        debug!("Logging in to {} as {}", creds.url, creds.login);

        let client = HttpClient::new(&creds.url)?;
        client
            .login(&creds.login, &creds.password)
            .await
            .with_context(|| format!("Login to {} failed", creds.url))?;

        info!("Logged in as {}", creds.login);
        Ok(client)
    }
}

fn entry() -> Result<Entry> {
    Entry::new(KEYRING_SERVICE, KEYRING_ENTRY).context("Failed to access keyring")
}

fn prompt(label: &str) -> Result<String> {
    Input::new()
        .with_prompt(label)
        .interact_text()
        .with_context(|| format!("Failed to read {}", label.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_is_normalized() {
        let creds = ServerCredentials::new(" https://music.example.org/app/ ", "me".into(), "pw".into()).unwrap();
        assert_eq!(creds.url, "https://music.example.org/app");
    }

    #[test]
    fn test_bad_input_is_rejected() {
        assert!(ServerCredentials::new("ftp://host", "me".into(), "pw".into()).is_err());
        assert!(ServerCredentials::new("not a url", "me".into(), "pw".into()).is_err());
        assert!(ServerCredentials::new("http://host", String::new(), "pw".into()).is_err());
    }
}
