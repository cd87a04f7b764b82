//! Digest generation: corpus assembly, the completion call, and extraction.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{PromptMode, Settings};
use crate::error::{Error, Result};
use crate::event::Event;

/// Instruction template asking the model to reason in delimited sections and
/// emit the final digest inside `<output>` tags.
const STRICT_TEMPLATE: &str = r#"
<example>
1. A summary of the current event in some detail, omitting any headline.

Source: hyperlink to the relevant source goes here
</example>

<data>
{DATA}
</data>

<instructions>
You are a substack blogger who keeps up on current events. Your task is to
summarize the top current events of the day. Please follow these steps
carefully:

1. Analyze the <example> to understand my desired style and format. In
   <thinking_template> tags, summarize the key characteristics of my template.
2. Read the events in <data>. In <thinking_data> tags, summarize which events
   were mentioned by the most sources. Do not include events related to sports
   or pop culture, or the story mentioned by <example>.
3. In <output> tags, list the top 5 current events.
  a) Focus on important macro events
  b) Number each event in sequence
  c) Summaries should be exactly 200 words
  d) Each event should reference the most relevant link
  e) Summaries should follow <example> exactly
  f) Do not use markdown to format links

Be as clear, concise, and specific as possible.
</instructions>
"#;

/// Instruction template asking for the digest directly, with no wrapper.
const DIRECT_TEMPLATE: &str = r#"
<example>
1. A summary of the current event in some detail, omitting any headline.

Source: hyperlink to the relevant source goes here
</example>

<data>
{DATA}
</data>

<instructions>
You are a substack blogger who keeps up on current events. Your task is to
summarize the top current events of the day. Reply with the list of the top 5
current events and nothing else:

  a) Focus on important macro events
  b) Number each event in sequence
  c) Summaries should be exactly 200 words
  d) Each event should reference the most relevant link
  e) Summaries should follow <example> exactly
  f) Do not use markdown to format links
  g) Do not include events related to sports or pop culture, and do not
     repeat a story

Be as clear, concise, and specific as possible.
</instructions>
"#;

/// Matches the final digest between `output>` and `</output` markers.
static OUTPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)output>(.*)</output").unwrap());

/// Join event contents into the prompt corpus, one blank line between posts,
/// preserving delivery order.
pub fn build_corpus(events: &[Event]) -> String {
    events
        .iter()
        .map(|e| e.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Pull the delimited digest out of a raw completion. Returns `None` when the
/// markers are absent or the section is blank, which callers treat as a
/// malformed completion.
pub fn extract_digest(raw: &str) -> Option<String> {
    OUTPUT_RE
        .captures(raw)
        .map(|caps| caps[1].to_string())
        .filter(|text| !text.trim().is_empty())
}

/// Chat-completions client bound to one API endpoint, model, and key.
pub struct CompletionClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl CompletionClient {
    pub fn new(cfg: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!(
                "{}/v1/chat/completions",
                cfg.completions_url.trim_end_matches('/')
            ),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
        }
    }

    /// Submit one user-role prompt and return the raw completion text.
    /// Transport, auth, and decode failures are all fatal inference errors.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Inference(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(Error::Inference(format!("{status}: {}", detail.trim())));
        }
        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::Inference(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Inference("completion response had no choices".into()))
    }
}

/// Produce a publishable digest from the collected events.
///
/// Direct mode takes the completion verbatim, trimmed. Strict mode re-issues
/// the same completion call while the delimited output section is missing, up
/// to `max_retries` attempts; with `dry_run` set the raw response is kept
/// instead so the model's reasoning stays inspectable. An empty corpus is a
/// normal input and still goes to the model.
pub async fn summarize(
    client: &CompletionClient,
    cfg: &Settings,
    events: &[Event],
) -> Result<String> {
    let corpus = build_corpus(events);
    let template = match cfg.prompt_mode {
        PromptMode::Strict => STRICT_TEMPLATE,
        PromptMode::Direct => DIRECT_TEMPLATE,
    };
    let prompt = template.replace("{DATA}", &corpus);
    let prompt = prompt.trim();

    match cfg.prompt_mode {
        PromptMode::Direct => {
            let digest = client.complete(prompt).await?.trim().to_string();
            if digest.is_empty() {
                return Err(Error::Inference("empty completion".into()));
            }
            Ok(digest)
        }
        PromptMode::Strict if cfg.dry_run => Ok(client.complete(prompt).await?.trim().to_string()),
        PromptMode::Strict => {
            for attempt in 1..=cfg.max_retries {
                let raw = client.complete(prompt).await?;
                if let Some(digest) = extract_digest(&raw) {
                    return Ok(digest);
                }
                eprintln!(
                    "completion {attempt}/{} missing output section, retrying",
                    cfg.max_retries
                );
            }
            Err(Error::Extraction {
                attempts: cfg.max_retries,
            })
        }
    }
}
