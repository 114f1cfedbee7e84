//! Command handlers.

use anyhow::{bail, Context};
use auth_session::{
    AuthError, AuthSession, AuthStateChangedPayload, AuthenticatedClient, Credentials,
    HttpTransport, LoginOutcome, MemoryNavigator, PasswordGrantStrategy, RefreshOutcome,
    RequestConfig, ReqwestTransport, SessionRouter,
};
use session_config_and_utils::{Config, Paths};
use session_storage::FileStorage;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// A password-grant session persisted under the state directory, plus a
/// client that routes responses back through it.
pub struct SessionClient {
    session: AuthSession,
    client: AuthenticatedClient,
    host: Url,
}

impl SessionClient {
    pub fn open(config: &Config, paths: &Paths) -> anyhow::Result<Self> {
        let host = config.host_url()?;
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());

        let strategy = Arc::new(PasswordGrantStrategy::new(
            transport.clone(),
            host.as_str(),
            config.client_id.as_str(),
            config.client_secret.as_str(),
        ));
        let storage = Arc::new(
            FileStorage::new(paths.state_dir()).context("Failed to open session state directory")?,
        );

        let session = AuthSession::new(
            strategy,
            storage,
            Arc::new(MemoryNavigator::default()),
            transport.clone(),
            config.session.clone(),
        );
        debug!(key = %session.storage_key(), logged_in = session.logged_in(), "Session opened");

        let router = SessionRouter::new();
        router.register(&session);

        Ok(Self {
            session,
            client: AuthenticatedClient::new(transport, router),
            host,
        })
    }

    pub async fn login(&self, user: String, password: String) -> anyhow::Result<()> {
        let outcome = self
            .session
            .login(Credentials::password(user, password))
            .await?;

        match outcome {
            LoginOutcome::Accepted => {
                println!(
                    "Logged in as {}",
                    self.session.user_name().unwrap_or_default()
                );
                Ok(())
            }
            LoginOutcome::Denied(message) => bail!("Login denied: {}", message),
            LoginOutcome::Error(message) => bail!("Login failed: {}", message),
            LoginOutcome::Superseded => bail!("Login was cancelled"),
        }
    }

    pub fn status(&self, json: bool) -> anyhow::Result<()> {
        let payload = AuthStateChangedPayload {
            state: self.session.auth_state(),
            user: self.session.user_name(),
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            return Ok(());
        }

        match payload.user {
            Some(user) if payload.state.is_authenticated() => println!("Logged in as {}", user),
            _ if payload.state.is_authenticated() => println!("Logged in"),
            _ => println!("Not logged in"),
        }
        Ok(())
    }

    pub async fn refresh(&self) -> anyhow::Result<()> {
        match self.session.refresh_login().await {
            Ok(RefreshOutcome::Refreshed) => {
                println!("Session refreshed");
                Ok(())
            }
            Ok(RefreshOutcome::Denied(message)) => bail!("Refresh denied: {}", message),
            Ok(RefreshOutcome::Error(message)) => bail!("Refresh failed: {}", message),
            Ok(RefreshOutcome::Superseded) => bail!("Session changed during refresh"),
            Err(AuthError::NotLoggedIn) => bail!("Not logged in"),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn logout(&self) -> anyhow::Result<()> {
        if !self.session.logged_in() {
            println!("Not logged in");
            return Ok(());
        }

        if let Some(pending) = self.session.logout() {
            // Let the logout request finish before the runtime shuts down
            if let Err(e) = pending.await {
                debug!(error = %e, "Logout request task failed");
            }
        }
        info!("Logged out");
        println!("Logged out");
        Ok(())
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<()> {
        let url = self
            .host
            .join(path)
            .with_context(|| format!("Invalid path: {}", path))?;
        let managed = self.session.manage_request_config(
            RequestConfig::get(url.as_str()).with_header("Accept", "application/json"),
        );

        match self.client.send(&managed).await {
            Ok(response) => {
                println!("{}", response.body);
                if !response.is_success() {
                    bail!("HTTP Status {}", response.status);
                }
                Ok(())
            }
            Err(AuthError::AuthFailure(response)) => bail!(
                "Session rejected by server (HTTP {}), log in again",
                response.status
            ),
            Err(e) => Err(e.into()),
        }
    }
}
