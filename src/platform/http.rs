use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{MediaRef, PlatformChannel, PlatformClient, PlatformError, PlatformMessage};
use crate::config::PlatformConfig;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    media: &'a [MediaRef],
    caption: &'a str,
}

/// Client for the platform gateway's JSON API.
pub struct HttpPlatformClient {
    client: Client,
    base_url: Url,
    api_token: SecretString,
}

impl HttpPlatformClient {
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let base_url = Url::parse(&config.api_url)
            .map_err(|e| PlatformError::Transport(format!("invalid api url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PlatformError::Transport(format!(
                "api url cannot be used as a base: {base_url}"
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_token: SecretString::from(config.api_token.clone()),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // checked in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.api_token.expose_secret();
        if token.is_empty() {
            request
        } else {
            request.bearer_auth(token)
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, PlatformError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(map_error(status, retry_after, &body))
    }

    async fn read_channel(response: Response) -> Result<PlatformChannel, PlatformError> {
        response
            .json::<PlatformChannel>()
            .await
            .map_err(|e| PlatformError::Transport(format!("invalid channel payload: {e}")))
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn resolve_channel(&self, identifier: &str) -> Result<PlatformChannel, PlatformError> {
        let mut url = self.endpoint(&["channels", "resolve"]);
        url.query_pairs_mut().append_pair("identifier", identifier);
        debug!("resolving channel {}", identifier);

        let response = self.send(self.client.get(url)).await?;
        Self::read_channel(response).await
    }

    async fn accept_invite(&self, invite_hash: &str) -> Result<PlatformChannel, PlatformError> {
        let url = self.endpoint(&["invites", invite_hash, "accept"]);
        let response = self.send(self.client.post(url)).await?;
        Self::read_channel(response).await
    }

    async fn join_channel(&self, channel: &PlatformChannel) -> Result<(), PlatformError> {
        let id = channel.id.to_string();
        let url = self.endpoint(&["channels", &id, "join"]);
        self.send(self.client.post(url)).await.map(|_| ())
    }

    async fn list_messages_since(
        &self,
        channel: &PlatformChannel,
        cursor: i64,
        limit: usize,
    ) -> Result<BoxStream<'static, Result<PlatformMessage, PlatformError>>, PlatformError> {
        let id = channel.id.to_string();
        let mut url = self.endpoint(&["channels", &id, "messages"]);
        url.query_pairs_mut()
            .append_pair("min_id", &cursor.to_string())
            .append_pair("limit", &limit.to_string());

        let response = self.send(self.client.get(url)).await?;
        let messages = response
            .json::<Vec<PlatformMessage>>()
            .await
            .map_err(|e| PlatformError::Transport(format!("invalid messages payload: {e}")))?;
        debug!(
            "channel {} returned {} message(s) after {}",
            channel.id,
            messages.len(),
            cursor
        );

        Ok(stream::iter(messages.into_iter().map(Ok)).boxed())
    }

    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>, PlatformError> {
        let url = self.endpoint(&["media", media.as_str()]);
        let response = self.send(self.client.get(url)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlatformError::Transport(format!("failed to read media body: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn publish(
        &self,
        destination: &PlatformChannel,
        media: &[MediaRef],
        caption: &str,
    ) -> Result<(), PlatformError> {
        let id = destination.id.to_string();
        let url = self.endpoint(&["channels", &id, "publish"]);
        let body = PublishRequest { media, caption };
        self.send(self.client.post(url).json(&body)).await.map(|_| ())
    }
}

fn map_error(status: StatusCode, retry_after_secs: Option<u64>, body: &str) -> PlatformError {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok();
    let detail = parsed
        .as_ref()
        .and_then(|b| b.message.clone())
        .unwrap_or_else(|| body.trim().to_string());

    if let Some(ErrorBody { error, .. }) = &parsed {
        match error.as_str() {
            "not_found" => return PlatformError::NotFound(detail),
            "already_member" => return PlatformError::AlreadyMember,
            "too_many_channels" => return PlatformError::TooManyChannels,
            "channel_private" => return PlatformError::PrivateForbidden,
            "invite_request_sent" => return PlatformError::InviteAlreadyPending,
            "invite_invalid" => return PlatformError::InviteInvalid(detail),
            "unsupported_media" => return PlatformError::UnsupportedMedia(detail),
            _ => {}
        }
    }

    match status {
        StatusCode::NOT_FOUND => PlatformError::NotFound(detail),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited { retry_after_secs },
        s if s.is_client_error() => PlatformError::BadRequest(format!("{s}: {detail}")),
        s => PlatformError::Transport(format!("{s}: {detail}")),
    }
}
