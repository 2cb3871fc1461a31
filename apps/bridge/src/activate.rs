//! One-time plugin token activation against the hub's auth endpoint.
//!
//! The user reads an activation key off the hub's app; the bridge trades it
//! for an auth token (`requestConnectApiAuthToken`) and then confirms that
//! token (`confirmConnectApiAuthToken`) before storing it.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use hmip_hub_connection::TlsPolicy;
use hmip_protocol::constants::HUB_AUTH_PORT;

/// Shortest activation key the hub issues.
pub const MIN_KEY_LEN: usize = 6;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from token activation.
#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error("activation key must be at least {MIN_KEY_LEN} characters")]
    InvalidKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("hub answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("hub response is missing `{0}`")]
    MissingField(&'static str),

    #[error("cannot read CA bundle: {0}")]
    CaBundle(#[from] std::io::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    activation_key: &'a str,
    plugin_id: &'a str,
    friendly_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmRequest<'a> {
    activation_key: &'a str,
    auth_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    auth_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmResponse {
    client_id: Option<String>,
}

/// A confirmed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activated {
    pub auth_token: String,
    pub client_id: String,
}

/// Client for the hub's `/hmip/auth` endpoints.
pub struct TokenClient {
    http: reqwest::Client,
    base_url: String,
}

impl TokenClient {
    /// Client for the hub at `host`, verifying TLS per `tls`.
    pub fn new(host: &str, tls: &TlsPolicy) -> Result<Self, ActivationError> {
        Self::with_base_url(format!("https://{host}:{HUB_AUTH_PORT}/hmip/auth"), tls)
    }

    pub fn with_base_url(base_url: String, tls: &TlsPolicy) -> Result<Self, ActivationError> {
        let mut headers = HeaderMap::new();
        headers.insert("VERSION", HeaderValue::from_static("12"));

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("hmip-bridge/", env!("CARGO_PKG_VERSION")));
        builder = match tls {
            TlsPolicy::NoVerify => {
                warn!("TLS certificate verification is disabled for token activation");
                builder.danger_accept_invalid_certs(true)
            }
            TlsPolicy::SystemTrust => builder,
            TlsPolicy::CustomCa(path) => {
                info!(path = %path.display(), "verifying hub certificate against CA bundle");
                let pem = std::fs::read(path)?;
                reqwest::Certificate::from_pem_bundle(&pem)?
                    .into_iter()
                    .fold(builder, |b, cert| b.add_root_certificate(cert))
            }
        };

        Ok(Self {
            http: builder.build()?,
            base_url,
        })
    }

    /// Trades `key` for a token and confirms it.
    pub async fn activate(
        &self,
        key: &str,
        plugin_id: &str,
        friendly_name: &str,
    ) -> Result<Activated, ActivationError> {
        let key = key.trim();
        if key.len() < MIN_KEY_LEN {
            return Err(ActivationError::InvalidKey);
        }

        let auth_token = self.request_token(key, plugin_id, friendly_name).await?;
        info!("auth token received, confirming");
        let client_id = self.confirm_token(key, &auth_token).await?;
        info!(%client_id, "auth token confirmed");
        Ok(Activated {
            auth_token,
            client_id,
        })
    }

    async fn request_token(
        &self,
        key: &str,
        plugin_id: &str,
        friendly_name: &str,
    ) -> Result<String, ActivationError> {
        let body = TokenRequest {
            activation_key: key,
            plugin_id,
            friendly_name,
        };
        let response: TokenResponse = self.post("requestConnectApiAuthToken", &body).await?;
        response
            .auth_token
            .filter(|t| !t.is_empty())
            .ok_or(ActivationError::MissingField("authToken"))
    }

    async fn confirm_token(&self, key: &str, auth_token: &str) -> Result<String, ActivationError> {
        let body = ConfirmRequest {
            activation_key: key,
            auth_token,
        };
        let response: ConfirmResponse = self.post("confirmConnectApiAuthToken", &body).await?;
        response
            .client_id
            .ok_or(ActivationError::MissingField("clientId"))
    }

    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R, ActivationError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ActivationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    #[derive(Default)]
    struct Seen {
        requests: Mutex<Vec<(String, Option<String>, Value)>>,
    }

    async fn fake_hub(confirm_status: StatusCode) -> (String, Arc<Seen>) {
        let seen = Arc::new(Seen::default());

        let s1 = seen.clone();
        let s2 = seen.clone();
        let app = Router::new()
            .route(
                "/hmip/auth/requestConnectApiAuthToken",
                post(move |headers: AxumHeaders, Json(body): Json<Value>| async move {
                    let version = headers
                        .get("version")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    s1.requests
                        .lock()
                        .unwrap()
                        .push(("request".into(), version, body));
                    Json(json!({"authToken": "TOKEN-42"}))
                }),
            )
            .route(
                "/hmip/auth/confirmConnectApiAuthToken",
                post(move |Json(body): Json<Value>| async move {
                    s2.requests
                        .lock()
                        .unwrap()
                        .push(("confirm".into(), None, body));
                    (confirm_status, Json(json!({"clientId": "client-7"})))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hmip/auth"), seen)
    }

    #[tokio::test]
    async fn activation_requests_then_confirms() {
        let (url, seen) = fake_hub(StatusCode::OK).await;
        let client = TokenClient::with_base_url(url, &TlsPolicy::NoVerify).unwrap();

        let activated = client
            .activate(" 697CC4 ", "de.example.bridge", "Bridge")
            .await
            .unwrap();
        assert_eq!(activated.auth_token, "TOKEN-42");
        assert_eq!(activated.client_id, "client-7");

        let requests = seen.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let (kind, version, body) = &requests[0];
        assert_eq!(kind, "request");
        assert_eq!(version.as_deref(), Some("12"));
        assert_eq!(
            *body,
            json!({"activationKey": "697CC4", "pluginId": "de.example.bridge", "friendlyName": "Bridge"})
        );
        assert_eq!(
            requests[1].2,
            json!({"activationKey": "697CC4", "authToken": "TOKEN-42"})
        );
    }

    #[tokio::test]
    async fn failed_confirmation_is_reported() {
        let (url, _seen) = fake_hub(StatusCode::FORBIDDEN).await;
        let client = TokenClient::with_base_url(url, &TlsPolicy::NoVerify).unwrap();

        let err = client
            .activate("697CC4", "de.example.bridge", "Bridge")
            .await
            .unwrap_err();
        assert!(matches!(err, ActivationError::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn short_key_is_rejected_without_network() {
        let client =
            TokenClient::with_base_url("http://127.0.0.1:9/hmip/auth".into(), &TlsPolicy::NoVerify)
                .unwrap();
        let err = client.activate("12345", "p", "n").await.unwrap_err();
        assert!(matches!(err, ActivationError::InvalidKey));
    }

    #[test]
    fn missing_ca_bundle_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = TlsPolicy::CustomCa(tmp.path().join("missing.pem"));
        assert!(matches!(
            TokenClient::new("hub", &policy),
            Err(ActivationError::CaBundle(_))
        ));
    }
}
