//! Discord REST v10 adapter.
//!
//! Stateless apart from the shared `reqwest::Client`; every trait call is
//! one or more HTTP round-trips.  Discord wire types are private to this
//! module.  Snowflakes arrive as JSON strings and are parsed into the id
//! newtypes here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{
    ChannelEdit, ChannelInfo, ChannelKind, ChannelSpec, Embed, OverwriteTarget, Platform,
    PlatformError, RoleInfo,
};
use crate::model::{ChannelId, GuildId, MessageId, RoleId, UserId};

pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";

/// Page size for member listing; Discord's maximum.
const MEMBER_PAGE: usize = 1000;

#[derive(Debug, Clone)]
pub struct DiscordPlatform {
    client: Client,
    api_base_url: Url,
    token: String,
}

impl DiscordPlatform {
    pub fn new(api_base_url: &str, token: String, timeout: Duration) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("DiscordBot (ta-bot, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()
            .map_err(|e| PlatformError::Http(format!("failed to build HTTP client: {e}")))?;
        let api_base_url = Url::parse(api_base_url)
            .map_err(|e| PlatformError::Http(format!("bad api base url {api_base_url}: {e}")))?;
        Ok(Self { client, api_base_url, token })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.api_base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PlatformError::Http(format!("api base url cannot be a base: {}", self.api_base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, PlatformError> {
        debug!(%method, %url, "discord request");
        let mut req = self
            .client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                PlatformError::Timeout
            } else {
                PlatformError::Http(e.to_string())
            }
        })?;
        check_status(response).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<serde_json::Value>,
    ) -> Result<T, PlatformError> {
        let url = self.url(segments)?;
        self.send(method, url, body)
            .await?
            .json::<T>()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))
    }

    async fn call_empty(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<serde_json::Value>,
    ) -> Result<(), PlatformError> {
        let url = self.url(segments)?;
        self.send(method, url, body).await.map(|_| ())
    }

    async fn create_guild_channel(&self, guild: GuildId, body: serde_json::Value) -> Result<ChannelId, PlatformError> {
        let created: WireChannel = self
            .call(Method::POST, &["guilds", &guild.to_string(), "channels"], Some(body))
            .await?;
        Ok(ChannelId(created.id))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_ms = serde_json::from_str::<RateLimitBody>(&body)
                .map(|b| (b.retry_after * 1000.0) as u64)
                .unwrap_or(1000);
            warn!(retry_after_ms, "discord rate limit hit");
            PlatformError::RateLimited { retry_after_ms }
        }
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => PlatformError::Forbidden(body),
        StatusCode::NOT_FOUND => PlatformError::NotFound(body),
        other => PlatformError::Http(format!("HTTP {other}: {body}")),
    })
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

#[derive(Deserialize)]
struct WireUser {
    #[serde(deserialize_with = "snowflake")]
    id: u64,
}

#[derive(Deserialize)]
struct WireChannel {
    #[serde(deserialize_with = "snowflake")]
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, deserialize_with = "opt_snowflake")]
    parent_id: Option<u64>,
}

#[derive(Deserialize)]
struct WireRole {
    #[serde(deserialize_with = "snowflake")]
    id: u64,
    name: String,
}

#[derive(Deserialize)]
struct WireMember {
    #[serde(default)]
    user: Option<WireUser>,
    #[serde(deserialize_with = "snowflakes")]
    roles: Vec<u64>,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(deserialize_with = "snowflake")]
    id: u64,
}

#[derive(Serialize)]
struct WireOverwrite {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    allow: String,
    deny: String,
}

const CHANNEL_TEXT: u8 = 0;
const CHANNEL_VOICE: u8 = 2;
const CHANNEL_CATEGORY: u8 = 4;

fn kind_code(kind: ChannelKind) -> u8 {
    match kind {
        ChannelKind::Text => CHANNEL_TEXT,
        ChannelKind::Voice => CHANNEL_VOICE,
        ChannelKind::Category => CHANNEL_CATEGORY,
    }
}

fn kind_from_code(code: u8) -> Option<ChannelKind> {
    match code {
        CHANNEL_TEXT => Some(ChannelKind::Text),
        CHANNEL_VOICE => Some(ChannelKind::Voice),
        CHANNEL_CATEGORY => Some(ChannelKind::Category),
        _ => None,
    }
}

fn snowflake<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let s = String::deserialize(d)?;
    s.parse().map_err(serde::de::Error::custom)
}

fn opt_snowflake<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Option::<String>::deserialize(d)?
        .map(|s| s.parse().map_err(serde::de::Error::custom))
        .transpose()
}

fn snowflakes<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u64>, D::Error> {
    Vec::<String>::deserialize(d)?
        .into_iter()
        .map(|s| s.parse().map_err(serde::de::Error::custom))
        .collect()
}

fn embed_json(embed: &Embed) -> serde_json::Value {
    let fields: Vec<serde_json::Value> = embed
        .fields
        .iter()
        .map(|f| json!({ "name": f.name, "value": f.value, "inline": f.inline }))
        .collect();
    let mut body = json!({ "title": embed.title, "fields": fields });
    if let Some(color) = embed.color {
        body["color"] = json!(color);
    }
    json!({ "embeds": [body] })
}

#[async_trait]
impl Platform for DiscordPlatform {
    async fn current_user(&self) -> Result<UserId, PlatformError> {
        let me: WireUser = self.call(Method::GET, &["users", "@me"], None).await?;
        Ok(UserId(me.id))
    }

    async fn create_category(&self, guild: GuildId, name: &str) -> Result<ChannelId, PlatformError> {
        self.create_guild_channel(guild, json!({ "name": name, "type": CHANNEL_CATEGORY }))
            .await
    }

    async fn create_channel(&self, guild: GuildId, spec: ChannelSpec) -> Result<ChannelId, PlatformError> {
        let overwrites: Vec<WireOverwrite> = spec
            .overwrites
            .iter()
            .map(|o| {
                let (id, kind) = match o.target {
                    OverwriteTarget::Role(r) => (r.to_string(), 0),
                    OverwriteTarget::Member(u) => (u.to_string(), 1),
                };
                WireOverwrite {
                    id,
                    kind,
                    allow: o.allow.bits().to_string(),
                    deny: o.deny.bits().to_string(),
                }
            })
            .collect();
        let mut body = json!({
            "name": spec.name,
            "type": kind_code(spec.kind),
            "permission_overwrites": overwrites,
        });
        if let Some(parent) = spec.parent {
            body["parent_id"] = json!(parent.to_string());
        }
        self.create_guild_channel(guild, body).await
    }

    async fn edit_channel(&self, channel: ChannelId, edit: ChannelEdit) -> Result<(), PlatformError> {
        let mut body = json!({});
        if let Some(name) = edit.name {
            body["name"] = json!(name);
        }
        if let Some(parent) = edit.parent {
            body["parent_id"] = json!(parent.to_string());
        }
        self.call_empty(Method::PATCH, &["channels", &channel.to_string()], Some(body))
            .await
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), PlatformError> {
        self.call_empty(Method::DELETE, &["channels", &channel.to_string()], None)
            .await
    }

    async fn channels(&self, guild: GuildId) -> Result<Vec<ChannelInfo>, PlatformError> {
        let wire: Vec<WireChannel> = self
            .call(Method::GET, &["guilds", &guild.to_string(), "channels"], None)
            .await?;
        Ok(wire
            .into_iter()
            .filter_map(|c| {
                Some(ChannelInfo {
                    id: ChannelId(c.id),
                    name: c.name.unwrap_or_default(),
                    kind: kind_from_code(c.kind)?,
                    parent: c.parent_id.map(ChannelId),
                })
            })
            .collect())
    }

    async fn create_role(&self, guild: GuildId, name: &str) -> Result<RoleId, PlatformError> {
        let role: WireRole = self
            .call(Method::POST, &["guilds", &guild.to_string(), "roles"], Some(json!({ "name": name })))
            .await?;
        Ok(RoleId(role.id))
    }

    async fn rename_role(&self, guild: GuildId, role: RoleId, name: &str) -> Result<(), PlatformError> {
        self.call_empty(
            Method::PATCH,
            &["guilds", &guild.to_string(), "roles", &role.to_string()],
            Some(json!({ "name": name })),
        )
        .await
    }

    async fn delete_role(&self, guild: GuildId, role: RoleId) -> Result<(), PlatformError> {
        self.call_empty(
            Method::DELETE,
            &["guilds", &guild.to_string(), "roles", &role.to_string()],
            None,
        )
        .await
    }

    async fn roles(&self, guild: GuildId) -> Result<Vec<RoleInfo>, PlatformError> {
        let wire: Vec<WireRole> = self
            .call(Method::GET, &["guilds", &guild.to_string(), "roles"], None)
            .await?;
        Ok(wire.into_iter().map(|r| RoleInfo { id: RoleId(r.id), name: r.name }).collect())
    }

    async fn role_members(&self, guild: GuildId, role: RoleId) -> Result<Vec<UserId>, PlatformError> {
        // No role-membership endpoint; page through the member list.
        let mut found = Vec::new();
        let mut after = 0u64;
        loop {
            let mut url = self.url(&["guilds", &guild.to_string(), "members"])?;
            url.query_pairs_mut()
                .append_pair("limit", &MEMBER_PAGE.to_string())
                .append_pair("after", &after.to_string());
            let page: Vec<WireMember> = self
                .send(Method::GET, url, None)
                .await?
                .json()
                .await
                .map_err(|e| PlatformError::Decode(e.to_string()))?;
            let page_len = page.len();
            for member in page {
                let Some(user) = member.user else { continue };
                after = after.max(user.id);
                if member.roles.contains(&role.get()) {
                    found.push(UserId(user.id));
                }
            }
            if page_len < MEMBER_PAGE {
                break;
            }
        }
        Ok(found)
    }

    async fn member_roles(&self, guild: GuildId, user: UserId) -> Result<Vec<RoleId>, PlatformError> {
        let member: WireMember = self
            .call(
                Method::GET,
                &["guilds", &guild.to_string(), "members", &user.to_string()],
                None,
            )
            .await?;
        Ok(member.roles.into_iter().map(RoleId).collect())
    }

    async fn add_member_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        self.call_empty(
            Method::PUT,
            &["guilds", &guild.to_string(), "members", &user.to_string(), "roles", &role.to_string()],
            None,
        )
        .await
    }

    async fn remove_member_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        self.call_empty(
            Method::DELETE,
            &["guilds", &guild.to_string(), "members", &user.to_string(), "roles", &role.to_string()],
            None,
        )
        .await
    }

    async fn send_embed(&self, channel: ChannelId, embed: Embed) -> Result<MessageId, PlatformError> {
        let msg: WireMessage = self
            .call(
                Method::POST,
                &["channels", &channel.to_string(), "messages"],
                Some(embed_json(&embed)),
            )
            .await?;
        Ok(MessageId(msg.id))
    }

    async fn add_reaction(&self, channel: ChannelId, message: MessageId, emoji: &str) -> Result<(), PlatformError> {
        self.call_empty(
            Method::PUT,
            &[
                "channels",
                &channel.to_string(),
                "messages",
                &message.to_string(),
                "reactions",
                emoji,
                "@me",
            ],
            None,
        )
        .await
    }
}
