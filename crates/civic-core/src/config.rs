use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub mutation: MutationConfig,
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

/// What to do when a mutation response is neither a full entity nor a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnrecognizedResponsePolicy {
    /// Treat the response as a failure and restore the captured snapshot.
    #[default]
    Rollback,
    /// Leave the speculative state standing as if confirmed.
    KeepSpeculative,
}

/// How much of each affected key a rollback restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollbackScope {
    /// Put back only the mutated entity's pre-mutation copy in each key.
    #[default]
    Entity,
    /// Put back each key's whole pre-mutation collection.
    Collection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationConfig {
    #[serde(default)]
    pub unrecognized_response: UnrecognizedResponsePolicy,
    #[serde(default)]
    pub refetch_after_mutation: bool,
    #[serde(default)]
    pub rollback_scope: RollbackScope,
    #[serde(default)]
    pub allow_self_upvote: bool,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            unrecognized_response: UnrecognizedResponsePolicy::Rollback,
            refetch_after_mutation: false,
            rollback_scope: RollbackScope::Entity,
            allow_self_upvote: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token_env: default_token_env(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl EndpointConfig {
    /// Bearer token read from the configured environment variable.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        env::var(&self.token_env).ok().filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(".civic/config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// `<config dir>/civic/config.toml`, when the platform has a config dir.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("civic/config.toml"))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };
    load_user_config_from(&config_dir)
}

fn load_user_config_from(config_dir: &Path) -> Result<UserConfig> {
    let path = config_dir.join("civic/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(
        cli_json,
        user.output.as_deref(),
        env_format.as_deref(),
        std::io::stdout().is_terminal(),
    );

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(
    cli_json: bool,
    user_output: Option<&str>,
    env_format: Option<&str>,
    is_tty: bool,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if is_tty { "pretty" } else { "text" }.to_string()
}

fn default_token_env() -> String {
    "CIVIC_TOKEN".to_string()
}

const fn default_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(
            cfg.mutation.unrecognized_response,
            UnrecognizedResponsePolicy::Rollback
        );
        assert_eq!(cfg.mutation.rollback_scope, RollbackScope::Entity);
        assert!(!cfg.mutation.refetch_after_mutation);
        assert!(!cfg.mutation.allow_self_upvote);
        assert_eq!(cfg.endpoint.base_url, None);
        assert_eq!(cfg.endpoint.token_env, "CIVIC_TOKEN");
        assert_eq!(cfg.endpoint.timeout_ms, 10_000);
    }

    #[test]
    fn project_config_parses_partial_sections() {
        let root = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(root.path().join(".civic")).expect("create .civic");
        std::fs::write(
            root.path().join(".civic/config.toml"),
            r#"
[mutation]
unrecognized_response = "keep-speculative"
refetch_after_mutation = true

[endpoint]
base_url = "https://api.example.test"
"#,
        )
        .expect("write config");

        let cfg = load_project_config(root.path()).expect("load");
        assert_eq!(
            cfg.mutation.unrecognized_response,
            UnrecognizedResponsePolicy::KeepSpeculative
        );
        assert!(cfg.mutation.refetch_after_mutation);
        assert_eq!(cfg.mutation.rollback_scope, RollbackScope::Entity);
        assert_eq!(
            cfg.endpoint.base_url.as_deref(),
            Some("https://api.example.test")
        );
        assert_eq!(cfg.endpoint.timeout_ms, 10_000);
    }

    #[test]
    fn malformed_project_config_reports_path() {
        let root = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(root.path().join(".civic")).expect("create .civic");
        std::fs::write(
            root.path().join(".civic/config.toml"),
            "[mutation]\nrollback_scope = \"everything\"\n",
        )
        .expect("write config");

        let err = load_project_config(root.path()).expect_err("must fail");
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn user_config_reads_output() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(dir.path().join("civic")).expect("mkdir");
        std::fs::write(dir.path().join("civic/config.toml"), "output = \"json\"\n").expect("write");
        let cfg = load_user_config_from(dir.path()).expect("parse");
        assert_eq!(cfg.output.as_deref(), Some("json"));
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        assert_eq!(resolve_output(true, Some("pretty"), Some("text"), true), "json");
    }

    #[test]
    fn env_beats_user_config_and_aliases_normalize() {
        assert_eq!(resolve_output(false, Some("table"), Some("human"), false), "pretty");
        assert_eq!(resolve_output(false, Some("table"), Some("bogus"), true), "text");
    }

    #[test]
    fn tty_decides_when_nothing_is_set() {
        assert_eq!(resolve_output(false, None, None, true), "pretty");
        assert_eq!(resolve_output(false, None, None, false), "text");
    }
}
