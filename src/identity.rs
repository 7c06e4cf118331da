use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;
use crate::http_client::http_client_with_timeout;
use crate::local_store::{LocalStore, MirroredIdentity};

pub const PLAYER_ID_MAX_CHANGES: u32 = 3;

const PLAYER_ID_PATH: &str = "/api/user/player-id";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("player id must be a non-negative integer, got {0:?}")]
    InvalidInput(String),
    #[error("player id is locked after {} changes", PLAYER_ID_MAX_CHANGES)]
    Locked,
    #[error("no player id changes remaining")]
    QuotaExceeded,
    #[error("failed to save player id: {0}")]
    RemoteWriteFailure(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerIdentity {
    player_id: Option<String>,
    change_count: u32,
    locked: bool,
}

impl PlayerIdentity {
    /// `locked` comes from the remote record when it reports one; otherwise it follows the count.
    pub fn new(player_id: Option<String>, change_count: u32, locked: Option<bool>) -> Self {
        Self {
            player_id,
            change_count,
            locked: locked.unwrap_or(change_count >= PLAYER_ID_MAX_CHANGES),
        }
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn change_count(&self) -> u32 {
        self.change_count
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn changes_remaining(&self) -> u32 {
        PLAYER_ID_MAX_CHANGES.saturating_sub(self.change_count)
    }

    pub fn view(&self) -> IdentityView {
        IdentityView {
            player_id: self.player_id.clone(),
            change_count: self.change_count,
            is_locked: self.is_locked(),
            changes_remaining: self.changes_remaining(),
        }
    }

    fn mirrored(&self) -> MirroredIdentity {
        MirroredIdentity {
            player_id: self.player_id.clone(),
            change_count: self.change_count,
            is_locked: self.locked,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentityView {
    pub player_id: Option<String>,
    pub change_count: u32,
    pub is_locked: bool,
    pub changes_remaining: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl SessionTokens {
    pub fn from_config(config: &Config) -> Self {
        Self {
            access_token: config.access_token.clone(),
            refresh_token: config.refresh_token.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIdentity {
    #[serde(default, deserialize_with = "de_opt_player_id")]
    pub player_id: Option<String>,
    #[serde(default)]
    pub change_count: u32,
    #[serde(default)]
    pub is_locked: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub change_count: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    player_id: Option<&'a str>,
    access_token: &'a str,
    refresh_token: &'a str,
}

/// Authoritative read/write path for the player id.
pub trait IdentityBackend {
    fn get_player_id(&self, tokens: &SessionTokens) -> Result<RemoteIdentity>;

    fn update_player_id(&self, new_id: Option<&str>, tokens: &SessionTokens)
    -> Result<UpdateResponse>;
}

pub struct HttpIdentityBackend {
    url: String,
    client: &'static Client,
}

impl HttpIdentityBackend {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            url: format!("{}{PLAYER_ID_PATH}", config.api_base),
            client: http_client_with_timeout(config.request_timeout)?,
        })
    }
}

impl IdentityBackend for HttpIdentityBackend {
    fn get_player_id(&self, tokens: &SessionTokens) -> Result<RemoteIdentity> {
        let resp = self
            .client
            .get(&self.url)
            .bearer_auth(&tokens.access_token)
            .send()
            .context("player id request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading player id body")?;
        if !status.is_success() {
            return Err(anyhow!("http {status}: {body}"));
        }
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(RemoteIdentity::default());
        }
        serde_json::from_str(trimmed).context("invalid player id json")
    }

    fn update_player_id(
        &self,
        new_id: Option<&str>,
        tokens: &SessionTokens,
    ) -> Result<UpdateResponse> {
        let request = UpdateRequest {
            player_id: new_id,
            access_token: &tokens.access_token,
            refresh_token: &tokens.refresh_token,
        };
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&tokens.access_token)
            .json(&request)
            .send()
            .context("player id update failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading update body")?;
        match serde_json::from_str::<UpdateResponse>(body.trim()) {
            Ok(parsed) if status.is_success() || parsed.error.is_some() => Ok(parsed),
            _ if status.is_success() => Err(anyhow!("invalid update response: {body}")),
            _ => Err(anyhow!("http {status}: {body}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Remote,
    Mirror,
    Empty,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub source: IdentitySource,
    pub remote_error: Option<String>,
    pub mirror_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityUpdate {
    pub message: String,
    pub consumed_change: bool,
    pub identity: IdentityView,
    /// The remote write succeeded but the local mirror could not be written.
    pub mirror_error: Option<String>,
}

/// Gate for player id changes: at most [`PLAYER_ID_MAX_CHANGES`] changes, every rejection
/// decided before the backend is called.
pub struct IdentityStore<B> {
    backend: B,
    mirror: LocalStore,
    tokens: SessionTokens,
    identity: PlayerIdentity,
}

impl<B: IdentityBackend> IdentityStore<B> {
    pub fn new(backend: B, mirror: LocalStore, tokens: SessionTokens) -> Self {
        Self {
            backend,
            mirror,
            tokens,
            identity: PlayerIdentity::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn identity(&self) -> IdentityView {
        self.identity.view()
    }

    pub fn player_id(&self) -> Option<&str> {
        self.identity.player_id()
    }

    /// Remote record first; the mirror only stands in when the remote read fails.
    pub fn load(&mut self) -> LoadReport {
        match self.backend.get_player_id(&self.tokens) {
            Ok(remote) => {
                self.identity =
                    PlayerIdentity::new(remote.player_id, remote.change_count, remote.is_locked);
                LoadReport {
                    source: IdentitySource::Remote,
                    remote_error: None,
                    mirror_error: self.save_mirror(),
                }
            }
            Err(err) => {
                let remote_error = Some(format!("{err:#}"));
                let mirrored = self.mirror.identity();
                if mirrored.player_id.is_none() && mirrored.change_count == 0 {
                    return LoadReport {
                        source: IdentitySource::Empty,
                        remote_error,
                        mirror_error: None,
                    };
                }
                // Quota and lock come back with the id so a locked account stays locked offline.
                self.identity = PlayerIdentity::new(
                    mirrored.player_id,
                    mirrored.change_count,
                    Some(mirrored.is_locked),
                );
                LoadReport {
                    source: IdentitySource::Mirror,
                    remote_error,
                    mirror_error: None,
                }
            }
        }
    }

    fn save_mirror(&self) -> Option<String> {
        self.mirror
            .save_identity(&self.identity.mirrored())
            .err()
            .map(|err| format!("{err:#}"))
    }

    pub fn set_identity(&mut self, new_id: Option<&str>) -> Result<IdentityUpdate, IdentityError> {
        let new_id = new_id.map(validate_player_id).transpose()?;
        if self.identity.is_locked() {
            return Err(IdentityError::Locked);
        }
        if self.identity.player_id == new_id {
            return Ok(IdentityUpdate {
                message: "Player ID unchanged".to_string(),
                consumed_change: false,
                identity: self.identity.view(),
                mirror_error: None,
            });
        }

        // Replacing or clearing an existing id is a change; a first-time set is not.
        let is_change = self.identity.player_id.is_some();
        if is_change && self.identity.change_count >= PLAYER_ID_MAX_CHANGES {
            return Err(IdentityError::QuotaExceeded);
        }

        let response = self
            .backend
            .update_player_id(new_id.as_deref(), &self.tokens)
            .map_err(|err| IdentityError::RemoteWriteFailure(format!("{err:#}")))?;
        if !response.success {
            let reason = response
                .error
                .or(response.message)
                .unwrap_or_else(|| "update rejected".to_string());
            return Err(IdentityError::RemoteWriteFailure(reason));
        }

        let change_count = response.change_count.unwrap_or(if is_change {
            self.identity.change_count + 1
        } else {
            self.identity.change_count
        });
        self.identity = PlayerIdentity::new(new_id, change_count, None);
        let mirror_error = self.save_mirror();

        let message = response.message.unwrap_or_else(|| match self.identity.player_id() {
            Some(id) => format!("Player ID set to {id}"),
            None => "Player ID removed".to_string(),
        });
        Ok(IdentityUpdate {
            message,
            consumed_change: is_change,
            identity: self.identity.view(),
            mirror_error,
        })
    }

    /// Same path as `set_identity(None)`, so clearing an existing id consumes a change.
    pub fn clear_identity(&mut self) -> Result<IdentityUpdate, IdentityError> {
        self.set_identity(None)
    }
}

/// Trims and canonicalises a player id (`"007"` becomes `"7"`).
pub fn validate_player_id(raw: &str) -> Result<String, IdentityError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdentityError::InvalidInput(raw.to_string()));
    }
    trimmed
        .parse::<u64>()
        .map(|id| id.to_string())
        .map_err(|_| IdentityError::InvalidInput(raw.to_string()))
}

fn de_opt_player_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => n.as_u64().map(|id| id.to_string()),
        _ => None,
    })
}
