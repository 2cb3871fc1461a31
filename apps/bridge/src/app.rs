//! Wiring of the session manager, state store, dispatcher and HTTP API.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use hmip_device_state::StateStore;
use hmip_hub_connection::SessionManager;
use hmip_hub_control::CommandDispatcher;

use crate::activate::TokenClient;
use crate::config::{BridgeConfig, Requirement};
use crate::http::{self, Credentials, HttpState};

pub type Dispatcher = CommandDispatcher<Arc<SessionManager>>;

/// Long-lived components shared by every entry point.
pub struct Bridge {
    pub manager: Arc<SessionManager>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Bridge {
    pub fn new(config: &BridgeConfig) -> Self {
        let store = Arc::new(match &config.snapshot_path {
            Some(path) => StateStore::with_persistence(path.clone()),
            None => StateStore::new(),
        });
        let manager = SessionManager::new(config.session_config());
        let dispatcher = Arc::new(
            CommandDispatcher::new(
                manager.clone(),
                store,
                config.plugin_id.trim(),
                config.friendly_name.clone(),
            )
            .request_state_on_connect(config.request_state_on_connect),
        );
        Self {
            manager,
            dispatcher,
        }
    }

    /// Runs the session loop on its own task.
    fn spawn_session(&self) -> tokio::task::JoinHandle<Result<(), hmip_hub_connection::SessionError>> {
        let manager = self.manager.clone();
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move { manager.run(dispatcher).await })
    }
}

/// Hub session only, until interrupted.
pub async fn connect(config: BridgeConfig) -> anyhow::Result<()> {
    config.validate(Requirement::Session)?;
    let bridge = Bridge::new(&config);
    tokio::spawn(shutdown_on_signal(bridge.manager.clone()));

    bridge.spawn_session().await.context("session task panicked")??;
    Ok(())
}

/// Hub session plus the HTTP API.
pub async fn serve(config: BridgeConfig) -> anyhow::Result<()> {
    config.validate(Requirement::Session)?;
    let addr = config.http_listen()?;
    let bridge = Bridge::new(&config);

    let credentials = config.http.credentials().map(|(username, password)| {
        Arc::new(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    });
    if credentials.is_none() {
        warn!("HTTP basic auth is not configured; the API is open to the network");
    }
    let router = http::router(HttpState {
        dispatcher: bridge.dispatcher.clone(),
        session: bridge.manager.subscribe(),
        credentials,
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {addr}"))?;
    info!(%addr, "HTTP API listening");

    tokio::spawn(shutdown_on_signal(bridge.manager.clone()));
    let session = bridge.spawn_session();

    let cancel = bridge.manager.cancel_token();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
    });

    let session_result = session.await.context("session task panicked")?;
    // Stops the HTTP server too when the session loop gave up on its own.
    bridge.manager.shutdown();
    server.await.context("HTTP task panicked")??;
    session_result?;
    Ok(())
}

/// Trades an activation key for an auth token and stores it in the config
/// file. An existing token is kept unless `force` is set.
pub async fn activate(
    mut config: BridgeConfig,
    config_path: &Path,
    key: &str,
    force: bool,
) -> anyhow::Result<()> {
    config.validate(Requirement::Activation)?;
    if !config.auth_token.trim().is_empty() && !force {
        info!("auth token already present, nothing to do (use --force to replace it)");
        return Ok(());
    }

    let client = TokenClient::new(config.hub_host.trim(), &config.tls_policy())?;
    let activated = client
        .activate(key, config.plugin_id.trim(), &config.friendly_name)
        .await?;

    config.auth_token = activated.auth_token;
    config
        .save(config_path)
        .with_context(|| format!("failed to store token in {}", config_path.display()))?;
    info!(
        path = %config_path.display(),
        client_id = %activated.client_id,
        "auth token stored"
    );
    Ok(())
}

async fn shutdown_on_signal(manager: Arc<SessionManager>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
    manager.shutdown();
}
