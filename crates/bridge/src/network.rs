use std::time::Duration;

use async_trait::async_trait;
use url::form_urlencoded;

use pb_domain::config::BridgeConfig;
use pb_domain::error::{Error, Result};
use pb_domain::PhoneNumber;
use pb_sessions::{Connection, ConnectRequest, MessagingNetwork};

use crate::connection::BridgeHandle;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Connects phone numbers through the sidecar at `url`.
#[derive(Debug, Clone)]
pub struct BridgeNetwork {
    url: String,
    token: Option<String>,
    pub(crate) request_timeout: Duration,
    pub(crate) connect_timeout: Duration,
}

impl BridgeNetwork {
    pub fn new(config: &BridgeConfig, token: Option<String>) -> Self {
        Self {
            url: config.url.clone(),
            token: token.filter(|t| !t.is_empty()),
            request_timeout: config.request_timeout(),
            connect_timeout: config.connect_timeout(),
        }
    }

    /// Read the token from the environment variable named in `config`.
    pub fn from_env(config: &BridgeConfig) -> Self {
        let token = std::env::var(&config.token_env).ok();
        if token.is_none() {
            tracing::debug!(var = %config.token_env, "no bridge token set");
        }
        Self::new(config, token)
    }

    /// Full connection URL with auth and phone params, form-encoded.
    pub(crate) fn build_url(&self, phone: &PhoneNumber) -> String {
        let base = &self.url;
        let sep = if base.contains('?') { "&" } else { "?" };
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(token) = &self.token {
            query.append_pair("token", token);
        }
        query.append_pair("phone", phone.as_str());
        format!("{base}{sep}{}", query.finish())
    }
}

#[async_trait]
impl MessagingNetwork for BridgeNetwork {
    async fn connect(&self, request: ConnectRequest) -> Result<Connection> {
        let url = self.build_url(&request.phone);
        let (handle, events) = BridgeHandle::open(self, &url, &request)
            .await
            .map_err(|e| Error::network(&request.phone, e))?;
        Ok(Connection {
            handle: std::sync::Arc::new(handle),
            events,
        })
    }
}
