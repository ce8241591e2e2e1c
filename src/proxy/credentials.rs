//! Credential injection for outbound requests
//!
//! Plaintext is fetched per attempt and copied into sensitive header values;
//! the resolved [`SecretString`] is zeroed when it drops at the end of the
//! call.

use super::error::GatewayError;
use super::upstream::{UpstreamClient, UpstreamRequest};
use crate::domain::{AuthType, Connector, HttpMethod};
use crate::secrets::{SecretResolver, SecretString};
use crate::ssrf::SsrfGuard;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: SecretString,
}

#[derive(Clone)]
pub struct CredentialInjector {
    secrets: SecretResolver,
    guard: Arc<SsrfGuard>,
    client: Arc<dyn UpstreamClient>,
}

impl CredentialInjector {
    pub fn new(
        secrets: SecretResolver,
        guard: Arc<SsrfGuard>,
        client: Arc<dyn UpstreamClient>,
    ) -> Self {
        Self { secrets, guard, client }
    }

    /// Headers authenticating a call to `connector`, empty for `AuthType::None`
    pub async fn headers_for(
        &self,
        connector: &Connector,
        timeout: Duration,
    ) -> Result<HeaderMap, GatewayError> {
        let mut headers = HeaderMap::new();
        let Some(secret_type) = connector.auth_type.required_secret() else {
            return Ok(headers);
        };

        let secret = self.secrets.resolve(&connector.id, secret_type).await?;

        match connector.auth_type {
            AuthType::None => {}
            AuthType::ApiKey | AuthType::Custom => {
                let name = HeaderName::from_bytes(connector.auth.header_name().as_bytes())
                    .map_err(|_| GatewayError::internal("connector auth header name is invalid"))?;
                headers.insert(name, sensitive(secret.expose_secret())?);
            }
            AuthType::Bearer => {
                let value = sensitive(&format!("Bearer {}", secret.expose_secret()))?;
                headers.insert(AUTHORIZATION, value);
            }
            AuthType::Basic => {
                let username = connector.auth.username.as_deref().unwrap_or_default();
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, secret.expose_secret()));
                headers.insert(AUTHORIZATION, sensitive(&format!("Basic {}", encoded))?);
            }
            AuthType::OAuth2ClientCredentials => {
                let token = self.exchange_client_credentials(connector, &secret, timeout).await?;
                let value = sensitive(&format!("Bearer {}", token.expose_secret()))?;
                headers.insert(AUTHORIZATION, value);
            }
        }

        debug!(
            connector_id = %connector.id,
            auth_type = ?connector.auth_type,
            "Injected upstream credentials"
        );
        Ok(headers)
    }

    /// Client-credentials grant against the connector's token URL
    async fn exchange_client_credentials(
        &self,
        connector: &Connector,
        client_secret: &SecretString,
        timeout: Duration,
    ) -> Result<SecretString, GatewayError> {
        let token_url = connector
            .auth
            .token_url
            .as_deref()
            .ok_or_else(|| GatewayError::internal("OAuth2 connector without token URL"))?;
        let client_id = connector
            .auth
            .client_id
            .as_deref()
            .ok_or_else(|| GatewayError::internal("OAuth2 connector without client id"))?;

        let url = self.guard.validate(token_url).await?;

        // Serializer is !Send, keep it out of scope at the await below
        let body = {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            form.append_pair("grant_type", "client_credentials");
            form.append_pair("client_id", client_id);
            form.append_pair("client_secret", client_secret.expose_secret());
            if let Some(scope) = connector.auth.scope.as_deref() {
                form.append_pair("scope", scope);
            }
            SecretString::new(form.finish())
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"));
        headers.insert(axum::http::header::ACCEPT, HeaderValue::from_static("application/json"));

        let request = UpstreamRequest {
            method: HttpMethod::Post,
            url,
            headers,
            body: Some(Bytes::copy_from_slice(body.expose_secret().as_bytes())),
            timeout,
        };

        let unreachable = |reason: String| GatewayError::UpstreamUnreachable {
            connector_id: connector.id.clone(),
            reason,
        };

        let response = tokio::time::timeout(timeout, self.client.send(request))
            .await
            .map_err(|_| GatewayError::UpstreamTimeout { connector_id: connector.id.clone() })?
            .map_err(|e| unreachable(format!("token endpoint: {}", e)))?;

        if !(200..300).contains(&response.status) {
            warn!(
                connector_id = %connector.id,
                status = response.status,
                "OAuth2 token exchange rejected"
            );
            return Err(unreachable(format!("token endpoint returned {}", response.status)));
        }

        let token: TokenResponse = serde_json::from_slice(&response.body)
            .map_err(|_| unreachable("token endpoint returned no access_token".to_string()))?;
        Ok(token.access_token)
    }
}

fn sensitive(value: &str) -> Result<HeaderValue, GatewayError> {
    let mut header = HeaderValue::from_str(value)
        .map_err(|_| GatewayError::internal("credential is not a valid header value"))?;
    header.set_sensitive(true);
    Ok(header)
}

impl std::fmt::Debug for CredentialInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialInjector").field("secrets", &self.secrets).finish_non_exhaustive()
    }
}
