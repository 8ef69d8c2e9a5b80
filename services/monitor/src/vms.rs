//! REST client for the upstream video-management system.
//!
//! Every call carries a bearer token. Calls are never retried here; the one
//! exception is the startup login, which backs off until the VMS is reachable.

use crate::config::VmsConfig;
use backoff::ExponentialBackoff;
use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors returned by VMS calls.
#[derive(Debug, Error)]
pub enum VmsError {
    #[error("VMS request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("VMS returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("VMS authentication failed: {0}")]
    Auth(String),
}

/// Body of the fullscreen-camera event action.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FullscreenAction {
    pub enabled: bool,
    pub server_guid: String,
    pub camera_id: i64,
    pub monitor_id: u32,
    pub should_force_monitor: bool,
    pub show_legend: bool,
    pub legend_text: String,
    pub legend_position: u32,
    pub legend_font_code: u32,
    pub legend_font_size: u32,
    pub legend_font_color: String,
    pub legend_shadow_color: String,
}

impl FullscreenAction {
    pub fn new(server_guid: &str, camera_id: i64, monitor_id: u32, legend_text: &str) -> Self {
        Self {
            enabled: true,
            server_guid: server_guid.to_string(),
            camera_id,
            monitor_id,
            should_force_monitor: true,
            show_legend: true,
            legend_text: legend_text.to_string(),
            legend_position: 0,
            legend_font_code: 0,
            legend_font_size: 0,
            legend_font_color: "FFFFFF".to_string(),
            legend_shadow_color: "FF0000".to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduledTimeBody<'a> {
    scheduled_time: &'a str,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    login: LoginToken,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginToken {
    user_token: String,
}

/// Authenticated client for the VMS REST API.
pub struct VmsClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<String>,
}

impl VmsClient {
    pub fn new(config: &VmsConfig) -> Result<Self, VmsError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(config.token.clone().unwrap_or_default()),
        })
    }

    pub fn has_token(&self) -> bool {
        !self.token.read().is_empty()
    }

    /// Obtain a token unless a static one is configured, retrying with exponential backoff.
    pub async fn authenticate(&self, config: &VmsConfig) -> Result<(), VmsError> {
        if self.has_token() {
            debug!("Using configured VMS token");
            return Ok(());
        }

        let username = config
            .username
            .clone()
            .ok_or_else(|| VmsError::Auth("no username configured".to_string()))?;
        let password = config.password.clone().unwrap_or_default();

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(config.login_max_elapsed()),
            ..Default::default()
        };

        let token = backoff::future::retry(policy, || async {
            self.login(&username, &password).await.map_err(|e| match e {
                VmsError::Status { status, .. } if status == 401 || status == 403 => {
                    backoff::Error::permanent(e)
                }
                other => {
                    warn!(error = %other, "VMS login failed, retrying");
                    backoff::Error::transient(other)
                }
            })
        })
        .await?;

        *self.token.write() = token;
        info!(base_url = %self.base_url, "Authenticated with VMS");
        Ok(())
    }

    async fn login(&self, username: &str, password: &str) -> Result<String, VmsError> {
        let response = self
            .http
            .post(format!("{}/login", self.base_url))
            .json(&LoginBody { username, password })
            .send()
            .await?;
        let response = expect_status(response, &[StatusCode::OK, StatusCode::CREATED]).await?;
        let parsed: LoginResponse = response.json().await?;
        Ok(parsed.login.user_token)
    }

    /// `POST /custom-events/{event_id}/scheduled-times`
    pub async fn schedule_event(&self, event_id: &str, scheduled_time: &str) -> Result<(), VmsError> {
        let url = format!("{}/custom-events/{}/scheduled-times", self.base_url, event_id);
        let response = self
            .request(Method::POST, &url)
            .json(&ScheduledTimeBody { scheduled_time })
            .send()
            .await?;
        expect_status(response, &[StatusCode::OK, StatusCode::CREATED]).await?;
        Ok(())
    }

    /// `DELETE /custom-events/{event_id}/scheduled-times/{time}`
    pub async fn delete_scheduled_event(&self, event_id: &str, scheduled_time: &str) -> Result<(), VmsError> {
        let url = format!(
            "{}/custom-events/{}/scheduled-times/{}",
            self.base_url, event_id, scheduled_time
        );
        let response = self.request(Method::DELETE, &url).send().await?;
        expect_status(response, &[StatusCode::NO_CONTENT]).await?;
        Ok(())
    }

    /// `PUT /event-actions/sources/{source_id}/actions/fullscreen-camera`
    pub async fn fullscreen_camera(&self, source_id: &str, action: &FullscreenAction) -> Result<(), VmsError> {
        let url = format!(
            "{}/event-actions/sources/{}/actions/fullscreen-camera",
            self.base_url, source_id
        );
        let response = self.request(Method::PUT, &url).json(action).send().await?;
        expect_status(response, &[StatusCode::OK, StatusCode::CREATED]).await?;
        Ok(())
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let token = self.token.read().clone();
        self.http.request(method, url).bearer_auth(token)
    }
}

async fn expect_status(
    response: reqwest::Response,
    accepted: &[StatusCode],
) -> Result<reqwest::Response, VmsError> {
    let status = response.status();
    if accepted.contains(&status) {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(VmsError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_vms_config;

    #[test]
    fn test_fullscreen_action_serialization() {
        let action = FullscreenAction::new("{GUID}", 7, 9, "$event.name$");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["serverGuid"], "{GUID}");
        assert_eq!(json["cameraId"], 7);
        assert_eq!(json["monitorId"], 9);
        assert_eq!(json["shouldForceMonitor"], true);
        assert_eq!(json["legendFontColor"], "FFFFFF");
        assert_eq!(json["legendShadowColor"], "FF0000");
    }

    #[test]
    fn test_static_token() {
        let client = VmsClient::new(&test_vms_config("https://vms.local/api/")).unwrap();
        assert!(client.has_token());
        assert_eq!(client.base_url, "https://vms.local/api");
    }

    #[tokio::test]
    async fn test_authenticate_without_username_fails() {
        let mut config = test_vms_config("http://127.0.0.1:1");
        config.token = None;
        let client = VmsClient::new(&config).unwrap();
        assert!(matches!(
            client.authenticate(&config).await,
            Err(VmsError::Auth(_))
        ));
    }
}
