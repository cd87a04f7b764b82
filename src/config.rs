//! Configuration loading from `.env` files.

use std::env;

use crate::error::{Error, Result};

/// Default read relay serving curated news notes.
pub const DEFAULT_RELAY_READ: &str = "wss://news.utxo.one";
/// Default write relay the digest is published to.
pub const DEFAULT_RELAY_WRITE: &str = "wss://nos.lol";

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// API key for the completion service.
    pub api_key: String,
    /// Raw signing secret, decoded from its hex representation.
    pub secret: [u8; 32],
    /// Relay endpoint notes are collected from.
    pub relay_read: String,
    /// Relay endpoint the digest is published to.
    pub relay_write: String,
    /// Prompt style for the summarization call.
    pub prompt_mode: PromptMode,
    /// Collection window in seconds.
    pub lookback_secs: u64,
    /// Attempt budget for strict-mode extraction.
    pub max_retries: u32,
    /// Completion model identifier.
    pub model: String,
    /// Token cap for the completion response.
    pub max_tokens: u32,
    /// Base URL of the completion API.
    pub completions_url: String,
    /// Print the digest instead of publishing, and skip extraction.
    pub dry_run: bool,
    /// Optional SOCKS5 proxy (host:port) for relay connections.
    pub tor_socks: Option<String>,
}

/// Prompt style used for the summarization call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// The model reasons in delimited sections and the digest is extracted
    /// from `<output>` tags, retrying while the section is missing.
    Strict,
    /// The model returns the digest directly; the response is used verbatim.
    Direct,
}

impl PromptMode {
    /// Collection window applied when `LOOKBACK_SECS` is not set.
    fn default_lookback(self) -> u64 {
        match self {
            PromptMode::Strict => 24 * 60 * 60,
            PromptMode::Direct => 6 * 60 * 60,
        }
    }
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path)
            .map_err(|e| Error::Config(format!("reading env file {path}: {e}")))?;
        let api_key = require("MISTRAL_API_KEY")?;
        let secret = decode_secret(&require("APP_SECRET")?)?;
        let relay_read = optional("RELAY_READ").unwrap_or_else(|| DEFAULT_RELAY_READ.into());
        let relay_write = optional("RELAY_WRITE").unwrap_or_else(|| DEFAULT_RELAY_WRITE.into());
        let prompt_mode = match optional("PROMPT_MODE").map(|m| m.to_ascii_lowercase()) {
            None => PromptMode::Strict,
            Some(m) if m == "strict" => PromptMode::Strict,
            Some(m) if m == "direct" => PromptMode::Direct,
            Some(other) => return Err(Error::Config(format!("unknown PROMPT_MODE: {other}"))),
        };
        let lookback_secs = match optional("LOOKBACK_SECS") {
            Some(v) => parse_num(&v, "LOOKBACK_SECS")?,
            None => prompt_mode.default_lookback(),
        };
        let max_retries = match optional("MAX_RETRIES") {
            Some(v) => parse_num(&v, "MAX_RETRIES")?,
            None => 5,
        };
        let model = optional("MODEL").unwrap_or_else(|| "mistral-tiny".into());
        let max_tokens = match optional("MAX_TOKENS") {
            Some(v) => parse_num(&v, "MAX_TOKENS")?,
            None => 2000,
        };
        let completions_url =
            optional("COMPLETIONS_URL").unwrap_or_else(|| "https://api.mistral.ai".into());
        let dry_run = optional("DRY_RUN")
            .map(|v| matches!(v.as_str(), "1" | "true"))
            .unwrap_or(false);
        let tor_socks = optional("TOR_SOCKS");
        Ok(Self {
            api_key,
            secret,
            relay_read,
            relay_write,
            prompt_mode,
            lookback_secs,
            max_retries,
            model,
            max_tokens,
            completions_url,
            dry_run,
            tor_socks,
        })
    }
}

/// Read a required variable, treating an empty value as absent.
fn require(name: &str) -> Result<String> {
    optional(name).ok_or_else(|| Error::Config(format!("{name} is not set")))
}

/// Read an optional variable, treating an empty value as absent.
fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Parse a numeric variable, naming it in the error.
fn parse_num<T: std::str::FromStr>(value: &str, name: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{name} must be a number, got {value}")))
}

/// Decode the hex signing secret into raw key bytes.
fn decode_secret(hex_str: &str) -> Result<[u8; 32]> {
    let bytes =
        hex::decode(hex_str).map_err(|_| Error::Config("APP_SECRET is not valid hex".into()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::Config("APP_SECRET must be 32 bytes of hex".into()))
}

/// Serializes process-environment mutation across test modules.
#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Variables recognized by [`Settings::from_env`], for test cleanup.
#[cfg(test)]
pub(crate) const ENV_VARS: [&str; 12] = [
    "MISTRAL_API_KEY",
    "APP_SECRET",
    "RELAY_READ",
    "RELAY_WRITE",
    "PROMPT_MODE",
    "LOOKBACK_SECS",
    "MAX_RETRIES",
    "MODEL",
    "MAX_TOKENS",
    "COMPLETIONS_URL",
    "DRY_RUN",
    "TOR_SOCKS",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn load(content: &str) -> Result<Settings> {
        for v in ENV_VARS {
            env::remove_var(v);
        }
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(&env_path, content).unwrap();
        Settings::from_env(env_path.to_str().unwrap())
    }

    #[test]
    fn loads_full_env() {
        let _g = ENV_MUTEX.lock().unwrap();
        let cfg = load(concat!(
            "MISTRAL_API_KEY=key\n",
            "APP_SECRET=0101010101010101010101010101010101010101010101010101010101010101\n",
            "RELAY_READ=ws://read\n",
            "RELAY_WRITE=ws://write\n",
            "PROMPT_MODE=direct\n",
            "LOOKBACK_SECS=3600\n",
            "MAX_RETRIES=2\n",
            "MODEL=mistral-small\n",
            "MAX_TOKENS=512\n",
            "COMPLETIONS_URL=http://127.0.0.1:1\n",
            "DRY_RUN=true\n",
            "TOR_SOCKS=127.0.0.1:9050\n",
        ))
        .unwrap();
        assert_eq!(cfg.api_key, "key");
        assert_eq!(cfg.secret, [1u8; 32]);
        assert_eq!(cfg.relay_read, "ws://read");
        assert_eq!(cfg.relay_write, "ws://write");
        assert_eq!(cfg.prompt_mode, PromptMode::Direct);
        assert_eq!(cfg.lookback_secs, 3600);
        assert_eq!(cfg.max_retries, 2);
        assert_eq!(cfg.model, "mistral-small");
        assert_eq!(cfg.max_tokens, 512);
        assert_eq!(cfg.completions_url, "http://127.0.0.1:1");
        assert!(cfg.dry_run);
        assert_eq!(cfg.tor_socks, Some("127.0.0.1:9050".into()));
    }

    #[test]
    fn defaults_when_optional_absent() {
        let _g = ENV_MUTEX.lock().unwrap();
        let cfg = load(concat!(
            "MISTRAL_API_KEY=key\n",
            "APP_SECRET=0101010101010101010101010101010101010101010101010101010101010101\n",
        ))
        .unwrap();
        assert_eq!(cfg.relay_read, DEFAULT_RELAY_READ);
        assert_eq!(cfg.relay_write, DEFAULT_RELAY_WRITE);
        assert_eq!(cfg.prompt_mode, PromptMode::Strict);
        assert_eq!(cfg.lookback_secs, 24 * 60 * 60);
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.model, "mistral-tiny");
        assert_eq!(cfg.max_tokens, 2000);
        assert_eq!(cfg.completions_url, "https://api.mistral.ai");
        assert!(!cfg.dry_run);
        assert!(cfg.tor_socks.is_none());
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let _g = ENV_MUTEX.lock().unwrap();
        let cfg = load(concat!(
            "MISTRAL_API_KEY=key\n",
            "APP_SECRET=0101010101010101010101010101010101010101010101010101010101010101\n",
            "RELAY_READ=\n",
            "PROMPT_MODE=\n",
            "DRY_RUN=\n",
            "TOR_SOCKS=\n",
        ))
        .unwrap();
        assert_eq!(cfg.relay_read, DEFAULT_RELAY_READ);
        assert_eq!(cfg.prompt_mode, PromptMode::Strict);
        assert!(!cfg.dry_run);
        assert!(cfg.tor_socks.is_none());
    }

    #[test]
    fn direct_mode_shortens_default_lookback() {
        let _g = ENV_MUTEX.lock().unwrap();
        let cfg = load(concat!(
            "MISTRAL_API_KEY=key\n",
            "APP_SECRET=0101010101010101010101010101010101010101010101010101010101010101\n",
            "PROMPT_MODE=direct\n",
        ))
        .unwrap();
        assert_eq!(cfg.lookback_secs, 6 * 60 * 60);
    }

    #[test]
    fn missing_api_key_errors() {
        let _g = ENV_MUTEX.lock().unwrap();
        let err = load(
            "APP_SECRET=0101010101010101010101010101010101010101010101010101010101010101\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("MISTRAL_API_KEY"));
    }

    #[test]
    fn missing_secret_errors() {
        let _g = ENV_MUTEX.lock().unwrap();
        let err = load("MISTRAL_API_KEY=key\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("APP_SECRET"));
    }

    #[test]
    fn non_hex_secret_errors() {
        let _g = ENV_MUTEX.lock().unwrap();
        let content = format!("MISTRAL_API_KEY=key\nAPP_SECRET={}\n", "zz".repeat(32));
        let err = load(&content).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("hex"));
    }

    #[test]
    fn short_secret_errors() {
        let _g = ENV_MUTEX.lock().unwrap();
        let err = load("MISTRAL_API_KEY=key\nAPP_SECRET=abcd\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn unknown_prompt_mode_errors() {
        let _g = ENV_MUTEX.lock().unwrap();
        let err = load(concat!(
            "MISTRAL_API_KEY=key\n",
            "APP_SECRET=0101010101010101010101010101010101010101010101010101010101010101\n",
            "PROMPT_MODE=loose\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("PROMPT_MODE"));
    }

    #[test]
    fn bad_lookback_errors() {
        let _g = ENV_MUTEX.lock().unwrap();
        let err = load(concat!(
            "MISTRAL_API_KEY=key\n",
            "APP_SECRET=0101010101010101010101010101010101010101010101010101010101010101\n",
            "LOOKBACK_SECS=soon\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("LOOKBACK_SECS"));
    }

    #[test]
    fn dry_run_accepts_one_and_true() {
        let _g = ENV_MUTEX.lock().unwrap();
        for flag in ["1", "true"] {
            let content = format!(
                "MISTRAL_API_KEY=key\nAPP_SECRET={}\nDRY_RUN={}\n",
                "01".repeat(32),
                flag
            );
            assert!(load(&content).unwrap().dry_run, "flag {flag}");
        }
        let content = format!(
            "MISTRAL_API_KEY=key\nAPP_SECRET={}\nDRY_RUN=no\n",
            "01".repeat(32)
        );
        assert!(!load(&content).unwrap().dry_run);
    }

    #[test]
    fn missing_env_file_errors() {
        let _g = ENV_MUTEX.lock().unwrap();
        assert!(Settings::from_env("/nonexistent/.env").is_err());
    }
}
