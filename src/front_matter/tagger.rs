//! Client for the external title/tag service.
//!
//! The service speaks a chat-message protocol: a `query` goes in, and an
//! `answer` string comes back that is expected to hold a JSON object. Answers
//! are parsed leniently (fences, surrounding prose and raw newlines are fine).

use crate::{
    config::{ConfigError, TaggerConfig},
    utils::json::parse_embedded,
};
use anyhow::Context;
use reqwest::{
    StatusCode,
    blocking::Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Title and tags proposed for an article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Suggestion {
    pub title: String,
    pub tags: Vec<String>,
}

/// Rewritten prose and the tags that came with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rewrite {
    pub content: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Error)]
pub enum TaggerError {
    #[error("tagger request failed")]
    Network(#[source] reqwest::Error),

    #[error("tagger answered {0}")]
    Status(StatusCode),

    #[error("tagger answer is not usable: {0}")]
    Malformed(String),
}

/// Text service that names and tags articles.
pub trait Tagger: Send + Sync {
    /// `{title, tags}` for `input` (a file name or a whole body).
    fn suggest(&self, input: &str) -> Result<Suggestion, TaggerError>;

    /// `{content, tags}`: a reworded version of `text`.
    fn rewrite(&self, text: &str) -> Result<Rewrite, TaggerError>;
}

// ============================================================================
// Answer Parsing
// ============================================================================

/// `tags` arrives either as `"a, b，c"` or as `["a", "b"]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagList {
    Text(String),
    List(Vec<String>),
}

impl TagList {
    fn into_tags(self) -> Vec<String> {
        let raw = match self {
            Self::Text(text) => text.split([',', '，']).map(str::to_owned).collect(),
            Self::List(list) => list,
        };
        let mut tags: Vec<String> = Vec::with_capacity(raw.len());
        for tag in raw {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_owned());
            }
        }
        tags
    }
}

#[derive(Debug, Deserialize)]
struct RawAnswer {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    tags: Option<TagList>,
}

fn parse_answer(answer: &str) -> Result<RawAnswer, TaggerError> {
    parse_embedded(answer).map_err(|err| {
        let preview: String = answer.chars().take(80).collect();
        TaggerError::Malformed(format!("{err}: {preview}"))
    })
}

/// Read a `{title, tags}` answer.
pub fn parse_suggestion(answer: &str) -> Result<Suggestion, TaggerError> {
    let raw = parse_answer(answer)?;
    let title = raw.title.trim().to_owned();
    if title.is_empty() {
        return Err(TaggerError::Malformed("empty title".into()));
    }
    Ok(Suggestion {
        title,
        tags: raw.tags.map(TagList::into_tags).unwrap_or_default(),
    })
}

/// Read a `{content, tags}` answer.
pub fn parse_rewrite(answer: &str) -> Result<Rewrite, TaggerError> {
    let raw = parse_answer(answer)?;
    if raw.content.trim().is_empty() {
        return Err(TaggerError::Malformed("empty content".into()));
    }
    Ok(Rewrite {
        content: raw.content,
        tags: raw.tags.map(TagList::into_tags).unwrap_or_default(),
    })
}

// ============================================================================
// HTTP Client
// ============================================================================

const SUGGEST_PROMPT: &str = "\n\nFor the text above: summarize a title and extract 3 keywords. \
Reply with strict JSON only, shaped like {\"title\": \"Title\", \"tags\": \"one, two, three\"}.";

const REWRITE_PROMPT: &str = "\n\nRewrite the text above in fluent prose, keeping its meaning \
and any markdown links, and extract 3 keywords. Reply with strict JSON only, shaped like \
{\"content\": \"...\", \"tags\": \"one, two, three\"}.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    query: String,
    inputs: serde_json::Map<String, serde_json::Value>,
    response_mode: &'static str,
    user: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    answer: String,
}

/// [`Tagger`] over a Dify-style chat-messages endpoint.
pub struct DifyTagger {
    client: Client,
    endpoint: String,
    user: String,
}

impl DifyTagger {
    pub fn new(config: &TaggerConfig) -> anyhow::Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or(ConfigError::Missing("[tagger.endpoint]"))?;
        let key = config
            .resolve_api_key()
            .ok_or(ConfigError::Missing("[tagger.api_key] or [tagger.api_key_env]"))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", key.trim()))
                .context("invalid tagger API key")?,
        );
        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .context("failed to build tagger HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            user: config.user.clone(),
        })
    }

    fn ask(&self, query: String) -> Result<String, TaggerError> {
        let request = ChatRequest {
            query,
            inputs: serde_json::Map::new(),
            response_mode: "blocking",
            user: &self.user,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(TaggerError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TaggerError::Status(status));
        }
        let body: ChatResponse = response.json().map_err(TaggerError::Network)?;
        if body.answer.trim().is_empty() {
            return Err(TaggerError::Malformed("empty answer".into()));
        }
        Ok(body.answer)
    }
}

impl Tagger for DifyTagger {
    fn suggest(&self, input: &str) -> Result<Suggestion, TaggerError> {
        parse_suggestion(&self.ask(format!("{input}{SUGGEST_PROMPT}"))?)
    }

    fn rewrite(&self, text: &str) -> Result<Rewrite, TaggerError> {
        parse_rewrite(&self.ask(format!("{text}{REWRITE_PROMPT}"))?)
    }
}
