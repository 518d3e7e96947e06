//! Regex stream matching backed by a JSON pattern file
//!
//! The file maps channel ids to stream-name patterns:
//!
//! ```json
//! { "patterns": { "12": { "name": "Sports HD", "regex": ["sports\\s*hd"], "enabled": true } } }
//! ```
//!
//! Patterns are compiled case-insensitively once per load. A stream belongs
//! to a channel when any of the channel's enabled patterns matches its name.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::traits::MatchProvider;
use crate::errors::{AppError, AppResult};
use crate::models::{Channel, ChannelId, Stream, StreamId};

#[derive(Debug, Deserialize)]
struct PatternFile {
    #[serde(default)]
    patterns: HashMap<String, PatternEntry>,
}

#[derive(Debug, Deserialize)]
struct PatternEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    regex: Vec<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Compiled patterns of one channel
#[derive(Debug)]
struct ChannelPatterns {
    name: Option<String>,
    regexes: Vec<Regex>,
}

impl ChannelPatterns {
    fn matches(&self, stream_name: &str) -> bool {
        self.regexes.iter().any(|re| re.is_match(stream_name))
    }
}

fn compile(contents: &str) -> AppResult<HashMap<ChannelId, ChannelPatterns>> {
    let file: PatternFile = serde_json::from_str(contents)?;
    let mut compiled = HashMap::with_capacity(file.patterns.len());

    for (key, entry) in file.patterns {
        let channel_id: ChannelId = key
            .trim()
            .parse()
            .map_err(|_| AppError::validation(format!("Pattern key '{}' is not a channel id", key)))?;
        if !entry.enabled || entry.regex.is_empty() {
            continue;
        }

        let regexes = entry
            .regex
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern).case_insensitive(true).build().map_err(|e| {
                    AppError::validation(format!("Invalid pattern for channel {}: {}", channel_id, e))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        compiled.insert(
            channel_id,
            ChannelPatterns {
                name: entry.name,
                regexes,
            },
        );
    }

    Ok(compiled)
}

/// [`MatchProvider`] over a pattern file
pub struct RegexMatchProvider {
    source: Option<PathBuf>,
    patterns: RwLock<HashMap<ChannelId, ChannelPatterns>>,
}

impl RegexMatchProvider {
    /// Load patterns from `path`. A missing file yields a provider with no patterns.
    pub async fn load(path: &Path) -> AppResult<Self> {
        let patterns = Self::read(path).await?;
        info!("Loaded stream patterns for {} channels from {:?}", patterns.len(), path);
        Ok(Self {
            source: Some(path.to_path_buf()),
            patterns: RwLock::new(patterns),
        })
    }

    pub fn from_json(contents: &str) -> AppResult<Self> {
        Ok(Self {
            source: None,
            patterns: RwLock::new(compile(contents)?),
        })
    }

    async fn read(path: &Path) -> AppResult<HashMap<ChannelId, ChannelPatterns>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => compile(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Pattern file {:?} not found, stream matching has no patterns", path);
                Ok(HashMap::new())
            }
            Err(e) => Err(AppError::configuration(format!("Cannot read pattern file {:?}: {}", path, e))),
        }
    }

    /// Re-read the pattern file. The previous patterns stay active on error.
    pub async fn reload(&self) -> AppResult<usize> {
        let Some(path) = &self.source else {
            return Ok(self.patterns.read().await.len());
        };
        let patterns = Self::read(path).await?;
        let count = patterns.len();
        *self.patterns.write().await = patterns;
        info!("Reloaded stream patterns for {} channels", count);
        Ok(count)
    }
}

#[async_trait]
impl MatchProvider for RegexMatchProvider {
    async fn match_streams(&self, channel: &Channel, candidates: &[Stream]) -> AppResult<Vec<StreamId>> {
        let patterns = self.patterns.read().await;
        let Some(channel_patterns) = patterns.get(&channel.id) else {
            return Ok(Vec::new());
        };

        let matched: Vec<StreamId> = candidates
            .iter()
            .filter(|s| channel_patterns.matches(&s.name))
            .map(|s| s.id)
            .collect();
        debug!(
            "Channel {} ({}) matched {} of {} streams",
            channel.id,
            channel_patterns.name.as_deref().unwrap_or(&channel.name),
            matched.len(),
            candidates.len()
        );
        Ok(matched)
    }

    async fn has_patterns(&self, channel_id: ChannelId) -> bool {
        self.patterns.read().await.contains_key(&channel_id)
    }
}
