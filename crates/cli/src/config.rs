//! Configuration loading from mcp-chat.toml.

use std::path::Path;
use std::time::Duration;

use mcp::{ChildProcess, Tcp};
use runtime::{Endpoint, OrchestratorConfig, PLAIN_SYSTEM_PROMPT, TOOL_FIRST_SYSTEM_PROMPT};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Completion provider configuration.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Tool host. Absent means every query runs without tools.
    pub server: Option<ServerConfig>,

    /// System prompt overrides.
    #[serde(default)]
    pub prompt: PromptConfig,
}

/// Completion provider configuration.
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    /// "github", "openai" or an OpenAI-compatible base URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model to use. Defaults per endpoint.
    pub model: Option<String>,

    /// API key. Falls back to GITHUB_TOKEN or OPENAI_API_KEY.
    pub api_key: Option<String>,

    pub max_tokens: Option<u32>,

    pub temperature: Option<f32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: None,
            api_key: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Tool host configuration: a command to spawn, or an address to dial.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    pub address: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptConfig {
    /// Replaces the tool-first system prompt.
    pub system: Option<String>,

    /// Replaces the prompt used without tools.
    pub fallback: Option<String>,
}

/// Where the tool host lives.
#[derive(Debug, Clone)]
pub enum ServerTarget {
    Process(ChildProcess),
    Tcp(Tcp),
}

fn default_endpoint() -> String {
    "github".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    15
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Configuration used when no file exists: the local `kb-server` over
    /// stdio, and GitHub Models unless `USE_GITHUB_AI` is `false`.
    pub fn default_config(env: impl Fn(&str) -> Option<String>) -> Self {
        let use_github = env("USE_GITHUB_AI")
            .map(|v| !v.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        Self {
            provider: ProviderConfig {
                endpoint: if use_github { "github" } else { "openai" }.to_string(),
                ..ProviderConfig::default()
            },
            server: Some(ServerConfig {
                command: Some("kb-server".to_string()),
                args: vec!["serve".to_string(), "--seed-if-missing".to_string()],
                address: None,
                connect_timeout_secs: default_connect_timeout(),
                request_timeout_secs: default_request_timeout(),
            }),
            prompt: PromptConfig::default(),
        }
    }

    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        self.provider
            .endpoint
            .parse()
            .map_err(|e: runtime::Error| ConfigError::InvalidEndpoint(e.to_string()))
    }

    pub fn model(&self, endpoint: &Endpoint) -> String {
        self.provider
            .model
            .clone()
            .unwrap_or_else(|| endpoint.default_model().to_string())
    }

    /// The configured key, or the endpoint's environment variable.
    pub fn api_key(
        &self,
        endpoint: &Endpoint,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        if let Some(key) = &self.provider.api_key {
            return Ok(key.clone());
        }
        let var = endpoint.api_key_env();
        env(var)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey {
                var,
                endpoint: endpoint.to_string(),
            })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            system_prompt: self
                .prompt
                .system
                .clone()
                .unwrap_or_else(|| TOOL_FIRST_SYSTEM_PROMPT.to_string()),
            fallback_system_prompt: self
                .prompt
                .fallback
                .clone()
                .unwrap_or_else(|| PLAIN_SYSTEM_PROMPT.to_string()),
        }
    }
}

impl ServerConfig {
    /// Requires exactly one of command or address to be set.
    pub fn target(&self) -> Result<ServerTarget, ConfigError> {
        match (&self.command, &self.address) {
            (Some(command), None) => Ok(ServerTarget::Process(
                ChildProcess::new(command).args(self.args.iter().cloned()),
            )),
            (None, Some(address)) => Ok(ServerTarget::Tcp(Tcp::new(address))),
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousServer),
            (None, None) => Err(ConfigError::MissingServer),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("{0}")]
    InvalidEndpoint(String),

    #[error("{var} environment variable is required for {endpoint} (or set provider.api_key)")]
    MissingApiKey { var: &'static str, endpoint: String },

    #[error("tool host not configured: set server.command or server.address")]
    MissingServer,

    #[error("ambiguous tool host: set either server.command OR server.address, not both")]
    AmbiguousServer,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp::Transport;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parses_full_config() {
        let config = Config::parse(
            r#"
            [provider]
            endpoint = "openai"
            model = "gpt-4o-mini"
            api_key = "sk-test"
            max_tokens = 1000

            [server]
            command = "kb-server"
            args = ["serve", "--data", "kb.json"]
            connect_timeout_secs = 3

            [prompt]
            system = "Use the tools."
            "#,
        )
        .unwrap();

        let endpoint = config.endpoint().unwrap();
        assert_eq!(endpoint, Endpoint::OpenAi);
        assert_eq!(config.model(&endpoint), "gpt-4o-mini");
        assert_eq!(config.api_key(&endpoint, no_env).unwrap(), "sk-test");
        assert_eq!(config.provider.max_tokens, Some(1000));

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.connect_timeout(), Duration::from_secs(3));
        assert_eq!(server.request_timeout(), Duration::from_secs(15));
        match server.target().unwrap() {
            ServerTarget::Process(process) => {
                assert_eq!(process.describe(), "kb-server serve --data kb.json")
            }
            other => panic!("expected process target, got {other:?}"),
        }

        let prompts = config.orchestrator_config();
        assert_eq!(prompts.system_prompt, "Use the tools.");
        assert_eq!(prompts.fallback_system_prompt, PLAIN_SYSTEM_PROMPT);
    }

    #[test]
    fn empty_file_means_github_without_tools() {
        let config = Config::parse("").unwrap();
        let endpoint = config.endpoint().unwrap();
        assert_eq!(endpoint, Endpoint::GitHubModels);
        assert_eq!(config.model(&endpoint), "openai/gpt-4o");
        assert!(config.server.is_none());
    }

    #[test]
    fn tcp_server_target() {
        let config = Config::parse("[server]\naddress = \"127.0.0.1:8050\"").unwrap();
        match config.server.unwrap().target().unwrap() {
            ServerTarget::Tcp(tcp) => assert_eq!(tcp.describe(), "tcp://127.0.0.1:8050"),
            other => panic!("expected tcp target, got {other:?}"),
        }
    }

    #[test]
    fn server_target_must_be_unambiguous() {
        let both = Config::parse("[server]\ncommand = \"kb-server\"\naddress = \"127.0.0.1:8050\"")
            .unwrap();
        assert!(matches!(
            both.server.unwrap().target(),
            Err(ConfigError::AmbiguousServer)
        ));

        let neither = Config::parse("[server]\nconnect_timeout_secs = 5").unwrap();
        assert!(matches!(
            neither.server.unwrap().target(),
            Err(ConfigError::MissingServer)
        ));
    }

    #[test]
    fn api_key_falls_back_to_endpoint_variable() {
        let config = Config::parse("").unwrap();
        let env = |var: &str| (var == "GITHUB_TOKEN").then(|| "ghp_test".to_string());

        assert_eq!(
            config.api_key(&Endpoint::GitHubModels, env).unwrap(),
            "ghp_test"
        );
        assert!(matches!(
            config.api_key(&Endpoint::OpenAi, env),
            Err(ConfigError::MissingApiKey { var: "OPENAI_API_KEY", .. })
        ));
    }

    #[test]
    fn default_config_honours_use_github_ai() {
        let config = Config::default_config(no_env);
        assert_eq!(config.endpoint().unwrap(), Endpoint::GitHubModels);
        assert!(config.server.is_some());

        let config = Config::default_config(|var| (var == "USE_GITHUB_AI").then(|| "False".to_string()));
        assert_eq!(config.endpoint().unwrap(), Endpoint::OpenAi);
    }

    #[test]
    fn rejects_unknown_endpoint() {
        let config = Config::parse("[provider]\nendpoint = \"smoke-signals\"").unwrap();
        assert!(matches!(config.endpoint(), Err(ConfigError::InvalidEndpoint(_))));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(Config::parse("[provider"), Err(ConfigError::Parse(_))));
    }
}
