//! HTTP client for the server's item and thing resources

use oh_config::ClientConfig;
use oh_core::{ItemInfo, ThingStatus};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RestError, RestResult};

/// Thing as returned by `GET /rest/things/{uid}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingInfo {
    #[serde(rename = "UID")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "thingTypeUID", default)]
    pub thing_type_uid: String,
    #[serde(rename = "bridgeUID", default, skip_serializing_if = "Option::is_none")]
    pub bridge_uid: Option<String>,
    #[serde(rename = "statusInfo", default)]
    pub status_info: ThingStatus,
}

/// Client for the item and thing REST resources
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    credentials: Option<(String, Option<String>)>,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> RestResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(RestError::Client)?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            token: config.api_token.clone(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch one item
    pub async fn get_item(&self, name: &str) -> RestResult<ItemInfo> {
        let request = self.client.get(self.url(&format!("/rest/items/{name}")));
        let response = self.send(request, name).await?;
        Ok(response.json().await?)
    }

    /// Fetch every item
    pub async fn get_items(&self) -> RestResult<Vec<ItemInfo>> {
        let request = self.client.get(self.url("/rest/items"));
        let response = self.send(request, "items").await?;
        Ok(response.json().await?)
    }

    /// Fetch an item's state as the bare string the server returns
    pub async fn get_item_state(&self, name: &str) -> RestResult<String> {
        let request = self
            .client
            .get(self.url(&format!("/rest/items/{name}/state")))
            .header(header::ACCEPT, "text/plain");
        let response = self.send(request, name).await?;
        Ok(response.text().await?)
    }

    /// Send a command to an item
    pub async fn send_command(&self, name: &str, command: &str) -> RestResult<()> {
        debug!(item = name, command, "Sending command");
        let request = self
            .client
            .post(self.url(&format!("/rest/items/{name}")))
            .header(header::CONTENT_TYPE, "text/plain")
            .body(command.to_string());
        self.send(request, name).await?;
        Ok(())
    }

    /// Set an item's state without sending a command
    pub async fn post_update(&self, name: &str, state: &str) -> RestResult<()> {
        debug!(item = name, state, "Posting state update");
        let request = self
            .client
            .put(self.url(&format!("/rest/items/{name}/state")))
            .header(header::CONTENT_TYPE, "text/plain")
            .body(state.to_string());
        self.send(request, name).await?;
        Ok(())
    }

    /// Fetch one thing
    pub async fn get_thing(&self, uid: &str) -> RestResult<ThingInfo> {
        let request = self.client.get(self.url(&format!("/rest/things/{uid}")));
        let response = self.send(request, uid).await?;
        Ok(response.json().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, mut request: RequestBuilder, resource: &str) -> RestResult<Response> {
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        } else if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request.send().await?;
        check_status(response, resource)
    }
}

fn check_status(response: Response, resource: &str) -> RestResult<Response> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(RestError::NotFound(resource.to_string()));
    }
    if status.is_client_error() || status.is_server_error() {
        return Err(RestError::RequestFailed {
            url: response.url().to_string(),
            status,
        });
    }
    Ok(response)
}
