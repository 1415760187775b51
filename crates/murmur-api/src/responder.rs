//! Optional text-completion responder.
//!
//! A message starting with the trigger prefix is forwarded, after it has
//! been stored, to an external service speaking the same `{method, params}`
//! envelope. Whatever comes back (or a fallback line when nothing does) is
//! posted into the conversation by a synthetic bot user.

use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use murmur_db::conversations::PostOutcome;
use murmur_types::ConversationId;

use crate::state::AppState;

pub const BOT_EMAIL: &str = "bot@murmur.local";
pub const BOT_NAME: &str = "Murmur Bot";
/// Never parses as a PHC string, so nobody can log in as the bot.
const BOT_PASS_HASH: &str = "!";

pub const DEFAULT_TRIGGER: &str = "/motivate";
pub const DEFAULT_PROMPT: &str = "Write a short motivational line for the team.";
const FALLBACK_REPLY: &str = "(Murmur Bot) the responder is unavailable right now.";

#[derive(Debug, Clone)]
pub struct ResponderConfig {
    pub url: String,
    pub trigger: String,
    pub timeout: Duration,
}

impl ResponderConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            trigger: DEFAULT_TRIGGER.to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

pub struct Responder {
    client: reqwest::Client,
    config: ResponderConfig,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Reply {
    Envelope {
        ok: bool,
        #[serde(default)]
        reply: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    Bare(String),
}

impl Responder {
    pub fn new(config: ResponderConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build responder http client")?;
        info!(url = %config.url, trigger = %config.trigger, "responder enabled");
        Ok(Self { client, config })
    }

    /// The prompt carried by `content` if it invokes the responder.
    ///
    /// The prefix match ignores ASCII case and must end at whitespace or at
    /// the end of the text, so `/motivated` does not trigger.
    pub fn prompt_for(&self, content: &str) -> Option<String> {
        let text = content.trim();
        let trigger = self.config.trigger.as_str();
        let head = text.get(..trigger.len())?;
        if !head.eq_ignore_ascii_case(trigger) {
            return None;
        }
        let rest = &text[trigger.len()..];
        if rest.chars().next().is_some_and(|c| !c.is_whitespace()) {
            return None;
        }
        let prompt = rest.trim();
        Some(if prompt.is_empty() {
            DEFAULT_PROMPT.to_string()
        } else {
            prompt.to_string()
        })
    }

    pub async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let body = json!({ "method": "generate_message", "params": [prompt] });
        let resp = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .context("responder request failed")?
            .error_for_status()
            .context("responder returned an error status")?;

        let reply = match resp.json::<Reply>().await.context("unreadable responder reply")? {
            Reply::Envelope { ok: true, reply: Some(text), .. } => text,
            Reply::Envelope { error, .. } => {
                bail!("responder declined: {}", error.unwrap_or_else(|| "no reply".into()))
            }
            Reply::Bare(text) => text,
        };

        let reply = reply.trim();
        if reply.is_empty() {
            bail!("responder sent an empty reply");
        }
        Ok(reply.to_string())
    }
}

/// Generate a reply and post it as the bot. Runs detached from the request
/// that triggered it.
pub(crate) async fn reply(state: AppState, conversation_id: ConversationId, prompt: String) {
    let Some(responder) = state.responder.as_ref() else {
        return;
    };

    let text = match responder.generate(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!(conversation_id, "responder failed, posting fallback: {:#}", e);
            FALLBACK_REPLY.to_string()
        }
    };

    let s = state.clone();
    let posted = tokio::task::spawn_blocking(move || -> anyhow::Result<PostOutcome> {
        let bot = s.db.get_or_create_user(BOT_EMAIL, BOT_NAME, BOT_PASS_HASH)?;
        let outcome = s.db.post_message(conversation_id, bot, &text, false)?;
        if let PostOutcome::Posted { recipients, .. } = &outcome {
            s.waiters.notify_users(recipients.iter().copied());
        }
        Ok(outcome)
    })
    .await;

    match posted {
        Ok(Ok(PostOutcome::Posted { message_id, .. })) => {
            debug!(conversation_id, message_id, "responder reply posted");
        }
        Ok(Ok(_)) => debug!(conversation_id, "conversation gone before responder reply"),
        Ok(Err(e)) => error!(conversation_id, "failed to post responder reply: {:#}", e),
        Err(e) => error!("spawn_blocking join error: {}", e),
    }
}
