//! REST client for the channel-management platform
//!
//! Implements [`ChannelDirectory`], [`EpgProvider`] and [`ProfileStore`] over
//! the platform's JSON API. Transport failures and 5xx answers surface as
//! `UpstreamUnavailable` so the engine can tell an outage from a bad request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::traits::{ChannelDirectory, EpgProvider, ProfileStore};
use crate::config::PlatformConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AccountId, Channel, ChannelGroup, ChannelId, EpgProgram, M3uAccount, Profile, ProfileChannel,
    ProfileId, Stream, StreamId,
};

const SERVICE: &str = "platform";
/// Page size requested from paginated list endpoints
const PAGE_SIZE: usize = 500;

/// List endpoints answer either a bare array or a paginated envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListPayload<T> {
    Plain(Vec<T>),
    Paged {
        results: Vec<T>,
        #[serde(default)]
        next: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct ChannelDto {
    id: ChannelId,
    name: String,
    #[serde(default)]
    channel_number: Option<f64>,
    #[serde(default, alias = "channel_group_id")]
    channel_group: Option<i64>,
    #[serde(default)]
    streams: Vec<StreamId>,
}

impl From<ChannelDto> for Channel {
    fn from(dto: ChannelDto) -> Self {
        Channel {
            id: dto.id,
            name: dto.name,
            channel_number: dto.channel_number,
            group_id: dto.channel_group,
            stream_ids: dto.streams,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamDto {
    id: StreamId,
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, alias = "m3u_account_id")]
    m3u_account: Option<AccountId>,
}

impl From<StreamDto> for Stream {
    fn from(dto: StreamDto) -> Self {
        Stream {
            id: dto.id,
            name: dto.name,
            url: dto.url.unwrap_or_default(),
            account_id: dto.m3u_account,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProfileChannelDto {
    #[serde(alias = "channel_id")]
    id: ChannelId,
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct ProfileDto {
    id: ProfileId,
    name: String,
    #[serde(default)]
    channels: Vec<ProfileChannelDto>,
}

impl From<ProfileDto> for Profile {
    fn from(dto: ProfileDto) -> Self {
        Profile {
            id: dto.id,
            name: dto.name,
            channels: dto
                .channels
                .into_iter()
                .map(|c| ProfileChannel {
                    channel_id: c.id,
                    enabled: c.enabled,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProgramDto {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(alias = "start")]
    start_time: DateTime<Utc>,
    #[serde(alias = "end")]
    end_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ProgramQuery {
    channel_id: ChannelId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// HTTP client for the channel-management platform
#[derive(Clone)]
pub struct PlatformClient {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig) -> AppResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| AppError::configuration(format!("platform.base_url '{}': {}", config.base_url, e)))?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("stream-curator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_token: config.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> AppResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::internal(format!("Invalid platform path '{}': {}", path, e)))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> AppResult<Response> {
        let response = builder.send().await.map_err(|e| {
            warn!("Platform request for {} failed: {}", what, e);
            AppError::upstream(SERVICE, format!("{}: {}", what, e))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("Platform answered {} for {}: {}", status, what, body);
        Err(match status {
            StatusCode::NOT_FOUND => AppError::not_found(SERVICE, what),
            s if s.is_server_error() => AppError::upstream(SERVICE, format!("{} returned {}", what, s)),
            s => AppError::validation(format!("Platform rejected {} ({}): {}", what, s, body)),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let response = self.send(self.request(Method::GET, self.url(path)?), path).await?;
        Ok(response.json().await?)
    }

    /// Collect every page of a list endpoint
    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> AppResult<Vec<T>> {
        let mut url = self.url(path)?;
        url.query_pairs_mut().append_pair("page_size", &PAGE_SIZE.to_string());

        let mut items = Vec::new();
        loop {
            let response = self.send(self.request(Method::GET, url.clone()), path).await?;
            match response.json::<ListPayload<T>>().await? {
                ListPayload::Plain(page) => {
                    items.extend(page);
                    break;
                }
                ListPayload::Paged { results, next } => {
                    items.extend(results);
                    match next {
                        Some(next) => {
                            url = Url::parse(&next).or_else(|_| self.url(&next)).map_err(|_| {
                                AppError::upstream(SERVICE, format!("bad pagination link '{}'", next))
                            })?;
                        }
                        None => break,
                    }
                }
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl ChannelDirectory for PlatformClient {
    async fn list_channels(&self) -> AppResult<Vec<Channel>> {
        let channels: Vec<ChannelDto> = self.get_list("/api/channels/channels/").await?;
        Ok(channels.into_iter().map(Channel::from).collect())
    }

    async fn list_groups(&self) -> AppResult<Vec<ChannelGroup>> {
        self.get_list("/api/channels/groups/").await
    }

    async fn get_channel(&self, channel_id: ChannelId) -> AppResult<Channel> {
        let channel: ChannelDto = self
            .get_json(&format!("/api/channels/channels/{}/", channel_id))
            .await
            .map_err(|e| match e {
                AppError::NotFound { .. } => AppError::not_found("channel", channel_id),
                other => other,
            })?;
        Ok(channel.into())
    }

    async fn channel_streams(&self, channel_id: ChannelId) -> AppResult<Vec<Stream>> {
        let streams: Vec<StreamDto> = self
            .get_json(&format!("/api/channels/channels/{}/streams/", channel_id))
            .await?;
        Ok(streams.into_iter().map(Stream::from).collect())
    }

    async fn list_streams(&self) -> AppResult<Vec<Stream>> {
        let streams: Vec<StreamDto> = self.get_list("/api/channels/streams/").await?;
        Ok(streams.into_iter().map(Stream::from).collect())
    }

    async fn set_channel_streams(&self, channel_id: ChannelId, stream_ids: &[StreamId]) -> AppResult<()> {
        let path = format!("/api/channels/channels/{}/", channel_id);
        let builder = self
            .request(Method::PATCH, self.url(&path)?)
            .json(&json!({ "streams": stream_ids }));
        self.send(builder, &path).await?;
        debug!("Channel {} stream order set to {:?}", channel_id, stream_ids);
        Ok(())
    }

    async fn list_accounts(&self) -> AppResult<Vec<M3uAccount>> {
        self.get_list("/api/m3u/accounts/").await
    }

    async fn refresh_account(&self, account_id: AccountId) -> AppResult<()> {
        let path = format!("/api/m3u/refresh/{}/", account_id);
        self.send(self.request(Method::POST, self.url(&path)?), &path).await?;
        Ok(())
    }
}

#[async_trait]
impl EpgProvider for PlatformClient {
    async fn programs(
        &self,
        channel_id: ChannelId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<EpgProgram>> {
        let path = "/api/epg/programs/";
        let builder = self.request(Method::GET, self.url(path)?).query(&ProgramQuery {
            channel_id,
            start: from,
            end: to,
        });
        let programs: ListPayload<ProgramDto> = self.send(builder, path).await?.json().await?;
        let programs = match programs {
            ListPayload::Plain(items) | ListPayload::Paged { results: items, .. } => items,
        };

        Ok(programs
            .into_iter()
            .filter(|p| p.end_time > from && p.start_time < to)
            .map(|p| EpgProgram {
                channel_id,
                title: p.title,
                description: p.description,
                start_time: p.start_time,
                end_time: p.end_time,
            })
            .collect())
    }
}

#[async_trait]
impl ProfileStore for PlatformClient {
    async fn list_profiles(&self) -> AppResult<Vec<Profile>> {
        let profiles: Vec<ProfileDto> = self.get_list("/api/channels/profiles/").await?;
        Ok(profiles.into_iter().map(Profile::from).collect())
    }

    async fn get_profile(&self, profile_id: ProfileId) -> AppResult<Profile> {
        let profile: ProfileDto = self
            .get_json(&format!("/api/channels/profiles/{}/", profile_id))
            .await
            .map_err(|e| match e {
                AppError::NotFound { .. } => AppError::not_found("profile", profile_id),
                other => other,
            })?;
        Ok(profile.into())
    }

    async fn set_channel_enabled(
        &self,
        profile_id: ProfileId,
        channel_id: ChannelId,
        enabled: bool,
    ) -> AppResult<()> {
        let path = format!("/api/channels/profiles/{}/channels/{}/", profile_id, channel_id);
        let builder = self
            .request(Method::PATCH, self.url(&path)?)
            .json(&json!({ "enabled": enabled }));
        self.send(builder, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_payload_accepts_both_shapes() {
        let plain: ListPayload<ChannelGroup> =
            serde_json::from_str(r#"[{"id": 1, "name": "Sports"}]"#).unwrap();
        assert!(matches!(plain, ListPayload::Plain(ref groups) if groups.len() == 1));

        let paged: ListPayload<ChannelGroup> = serde_json::from_str(
            r#"{"count": 2, "next": "http://platform/api/channels/groups/?page=2", "results": [{"id": 2, "name": "News"}]}"#,
        )
        .unwrap();
        match paged {
            ListPayload::Paged { results, next } => {
                assert_eq!(results[0].name, "News");
                assert!(next.is_some());
            }
            ListPayload::Plain(_) => panic!("expected paginated payload"),
        }
    }

    #[test]
    fn test_channel_dto_mapping() {
        let dto: ChannelDto = serde_json::from_str(
            r#"{"id": 7, "name": "Sports HD", "channel_number": 101.0, "channel_group_id": 3, "streams": [5, 9]}"#,
        )
        .unwrap();
        let channel = Channel::from(dto);
        assert_eq!(channel.group_id, Some(3));
        assert_eq!(channel.stream_ids, vec![5, 9]);
    }

    #[test]
    fn test_client_rejects_bad_base_url() {
        let config = PlatformConfig {
            base_url: "not a url".to_string(),
            ..PlatformConfig::default()
        };
        assert!(matches!(
            PlatformClient::new(&config),
            Err(AppError::Configuration { .. })
        ));
    }
}
