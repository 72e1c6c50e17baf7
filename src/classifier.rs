use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kwtag_types::Tag;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Picks a tag for a term the dictionary does not know.
///
/// Implementations never fail: any error, timeout or unusable answer is `None`.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, term: &str, context: &str) -> Option<Tag>;
}

/// Used when no classifier is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClassifier;

#[async_trait]
impl Classifier for NoClassifier {
    async fn classify(&self, _term: &str, _context: &str) -> Option<Tag> {
        None
    }
}

/// Interpretation of a free-form classifier reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Tag(Tag),
    /// The model explicitly answered "none".
    Abstain,
    Unrecognized(String),
}

pub fn parse_verdict(reply: &str) -> Verdict {
    let cleaned = reply
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '“' | '”' | '「' | '」' | '.' | '。')
        })
        .to_lowercase()
        .replace([' ', '-'], "_");
    if cleaned == "none" {
        return Verdict::Abstain;
    }
    match Tag::from_label(&cleaned).or_else(|| Tag::from_file_id(&cleaned)) {
        Some(tag) => Verdict::Tag(tag),
        None => Verdict::Unrecognized(reply.to_string()),
    }
}

pub fn build_prompt(term: &str, context: &str) -> String {
    let labels: Vec<&str> = Tag::ALL.iter().map(|tag| tag.label()).collect();
    format!(
        "You are an e-commerce search keyword analyst.\n\
         In the search keyword \"{context}\", which category best fits the term \"{term}\"?\n\
         Categories: [{}, none]\n\
         Answer with exactly one category name, or none if no category fits.",
        labels.join(", ")
    )
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl ClassifierConfig {
    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `CLASSIFIER_MODEL` and
    /// `CLASSIFIER_TIMEOUT_SECS`. Returns `None` without an API key.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())?;
        let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = env::var("CLASSIFIER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeout_secs = env::var("CLASSIFIER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Some(Self {
            api_key,
            base_url,
            model,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("classifier reply held no message")]
    EmptyReply,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Classifier backed by an OpenAI-compatible chat completion endpoint.
pub struct ChatClassifier {
    client: reqwest::Client,
    config: ClassifierConfig,
}

impl ChatClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn request_label(&self, term: &str, context: &str) -> Result<String, ClassifierError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let prompt = build_prompt(term, context);
        let body = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: 0.0,
        };

        let response: ChatResponse = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ClassifierError::EmptyReply)
    }
}

#[async_trait]
impl Classifier for ChatClassifier {
    async fn classify(&self, term: &str, context: &str) -> Option<Tag> {
        let reply = match self.request_label(term, context).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!("classifying {term:?} failed: {err}");
                return None;
            }
        };
        match parse_verdict(&reply) {
            Verdict::Tag(tag) => {
                debug!("classifier tagged {term:?} as {tag}");
                Some(tag)
            }
            Verdict::Abstain => None,
            Verdict::Unrecognized(raw) => {
                debug!("ignoring classifier reply {raw:?} for {term:?}");
                None
            }
        }
    }
}

/// Chat classifier when configured, otherwise [`NoClassifier`].
pub fn build_classifier(
    config: Option<ClassifierConfig>,
) -> Result<Arc<dyn Classifier>, ClassifierError> {
    match config {
        Some(config) => {
            info!("classifier enabled (model {}, {}s timeout)", config.model, config.timeout.as_secs());
            Ok(Arc::new(ChatClassifier::new(config)?))
        }
        None => {
            warn!("classifier disabled; unknown terms stay untagged");
            Ok(Arc::new(NoClassifier))
        }
    }
}
