use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::cli::{BackendArgs, CommonArgs, ExtractorArgs};
use crate::error::PlannerError;
use crate::generate::{DEFAULT_API_BASE_URL, DEFAULT_MODEL};
use crate::i18n::Language;
use crate::prompt::DEFAULT_TEMPERATURE;
use crate::table::{Locator, RowPolicy, TableExtractor};

// Precedence: CLI > env > file > defaults.

const DEFAULT_AGENT_CMD: &str = "llm";
const DEFAULT_STATE_DIR: &str = ".studyplan";
const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 120;
const MAX_TEMPERATURE: f32 = 2.0;

const ENV_PREFIX: &str = "STUDYPLAN_";

/// Read by the Gemini SDKs; honoured as a fallback for `STUDYPLAN_API_KEY`.
const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Which generation backend `plan` talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Gemini,
    Command,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Gemini => f.write_str("gemini"),
            BackendKind::Command => f.write_str("command"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(BackendKind::Gemini),
            "command" => Ok(BackendKind::Command),
            _ => Err(PlannerError::InvalidValue {
                field: "backend",
                value: s.to_owned(),
                expected: "\"gemini\" or \"command\"",
            }),
        }
    }
}

/// Resolved configuration.
///
/// Built from three layers with precedence CLI > env > file > defaults.
#[derive(Clone, PartialEq)]
pub struct PlannerConfig {
    pub backend: BackendKind,
    pub model: String,
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub temperature: f32,
    pub request_timeout_sec: u64,
    /// Program run by the command backend, resolved on PATH.
    pub agent_cmd: String,
    /// Arguments placed before the prompt; `{temperature}` is substituted.
    pub agent_args: Vec<String>,
    /// Language of a freshly created session.
    pub language: Language,
    pub state_dir: PathBuf,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub row_policy: RowPolicy,
    /// When set, tables are located by this header token instead of
    /// structurally.
    pub header_marker: Option<String>,
}

impl fmt::Debug for PlannerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannerConfig")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("temperature", &self.temperature)
            .field("request_timeout_sec", &self.request_timeout_sec)
            .field("agent_cmd", &self.agent_cmd)
            .field("agent_args", &self.agent_args)
            .field("language", &self.language)
            .field("state_dir", &self.state_dir)
            .field("log_level", &self.log_level)
            .field("log_file", &self.log_file)
            .field("row_policy", &self.row_policy)
            .field("header_marker", &self.header_marker)
            .finish()
    }
}

/// TOML-deserializable config file representation. All fields optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    backend: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    api_base_url: Option<String>,
    temperature: Option<f32>,
    request_timeout_sec: Option<u64>,
    agent_cmd: Option<String>,
    agent_args: Option<Vec<String>>,
    language: Option<String>,
    state_dir: Option<PathBuf>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
    row_policy: Option<String>,
    header_marker: Option<String>,
}

/// Intermediate layer where every field is optional, used to merge sources.
#[derive(Debug, Default)]
struct ConfigLayer {
    backend: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    api_base_url: Option<String>,
    temperature: Option<f32>,
    request_timeout_sec: Option<u64>,
    agent_cmd: Option<String>,
    agent_args: Option<Vec<String>>,
    language: Option<String>,
    state_dir: Option<PathBuf>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
    row_policy: Option<String>,
    header_marker: Option<String>,
}

impl From<FileConfig> for ConfigLayer {
    fn from(fc: FileConfig) -> Self {
        ConfigLayer {
            backend: fc.backend,
            model: fc.model,
            api_key: fc.api_key,
            api_base_url: fc.api_base_url,
            temperature: fc.temperature,
            request_timeout_sec: fc.request_timeout_sec,
            agent_cmd: fc.agent_cmd,
            agent_args: fc.agent_args,
            language: fc.language,
            state_dir: fc.state_dir,
            log_level: fc.log_level,
            log_file: fc.log_file,
            row_policy: fc.row_policy,
            header_marker: fc.header_marker,
        }
    }
}

impl PlannerConfig {
    /// Load configuration with precedence: CLI > env > file > defaults.
    ///
    /// The config file comes from `common.config`; `backend` and `extractor`
    /// are the flag groups of subcommands that have them.
    pub fn load(
        common: &CommonArgs,
        backend: Option<&BackendArgs>,
        extractor: Option<&ExtractorArgs>,
    ) -> anyhow::Result<Self> {
        Self::load_with_env(common, backend, extractor, real_env_var)
    }

    /// Check values that parse but are out of range.
    pub fn validate(&self) -> Result<(), PlannerError> {
        if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(PlannerError::InvalidTemperature {
                value: self.temperature,
            });
        }
        if self.request_timeout_sec == 0 {
            return Err(PlannerError::InvalidValue {
                field: "request_timeout_sec",
                value: "0".to_owned(),
                expected: "a positive number of seconds",
            });
        }
        if self.model.trim().is_empty() {
            return Err(PlannerError::InvalidValue {
                field: "model",
                value: self.model.clone(),
                expected: "a model name",
            });
        }
        if let Some(marker) = &self.header_marker {
            if marker.trim().is_empty() {
                return Err(PlannerError::InvalidValue {
                    field: "header_marker",
                    value: marker.clone(),
                    expected: "a non-empty header token",
                });
            }
        }
        Ok(())
    }

    /// The table extractor described by `row_policy` and `header_marker`.
    pub fn extractor(&self) -> TableExtractor {
        let locator = match &self.header_marker {
            Some(marker) => Locator::HeaderMarker(marker.clone()),
            None => Locator::Structural,
        };
        TableExtractor::new(locator, self.row_policy)
    }

    /// Internal constructor that accepts an env-var lookup function,
    /// enabling deterministic testing without process-global mutation.
    pub(crate) fn load_with_env(
        common: &CommonArgs,
        backend: Option<&BackendArgs>,
        extractor: Option<&ExtractorArgs>,
        env_fn: fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let file_layer = match common.config.as_deref() {
            Some(path) => load_file_layer(path)?,
            None => ConfigLayer::default(),
        };
        let env_layer = load_env_layer(env_fn)?;
        let cli_layer = cli_layer_from(common, backend, extractor);

        let merged = merge_layers(file_layer, env_layer, cli_layer);

        Ok(PlannerConfig {
            backend: parse_or_default(merged.backend.as_deref())?,
            model: merged.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            api_key: merged.api_key.filter(|k| !k.trim().is_empty()),
            api_base_url: merged
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned()),
            temperature: merged.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            request_timeout_sec: merged
                .request_timeout_sec
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SEC),
            agent_cmd: merged
                .agent_cmd
                .unwrap_or_else(|| DEFAULT_AGENT_CMD.to_owned()),
            agent_args: merged.agent_args.unwrap_or_default(),
            language: parse_or_default(merged.language.as_deref())?,
            state_dir: merged
                .state_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            log_level: merged.log_level,
            log_file: merged.log_file,
            row_policy: parse_or_default(merged.row_policy.as_deref())?,
            header_marker: merged.header_marker,
        })
    }
}

fn parse_or_default<T>(value: Option<&str>) -> Result<T, PlannerError>
where
    T: FromStr<Err = PlannerError> + Default,
{
    value.map_or_else(|| Ok(T::default()), str::parse)
}

fn load_file_layer(path: &Path) -> anyhow::Result<ConfigLayer> {
    let contents = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
    let fc: FileConfig = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;
    Ok(fc.into())
}

fn real_env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn prefixed(env_fn: fn(&str) -> Option<String>, suffix: &str) -> Option<String> {
    env_fn(&format!("{ENV_PREFIX}{suffix}"))
}

fn load_env_layer(env_fn: fn(&str) -> Option<String>) -> Result<ConfigLayer, PlannerError> {
    Ok(ConfigLayer {
        backend: prefixed(env_fn, "BACKEND"),
        model: prefixed(env_fn, "MODEL"),
        api_key: prefixed(env_fn, "API_KEY").or_else(|| env_fn(GEMINI_API_KEY_VAR)),
        api_base_url: prefixed(env_fn, "API_BASE_URL"),
        temperature: parse_env(env_fn, "TEMPERATURE")?,
        request_timeout_sec: parse_env(env_fn, "REQUEST_TIMEOUT_SEC")?,
        agent_cmd: prefixed(env_fn, "AGENT_CMD"),
        agent_args: prefixed(env_fn, "AGENT_ARGS")
            .map(|s| s.split_whitespace().map(str::to_owned).collect()),
        language: prefixed(env_fn, "LANGUAGE"),
        state_dir: prefixed(env_fn, "STATE_DIR").map(PathBuf::from),
        log_level: prefixed(env_fn, "LOG_LEVEL"),
        log_file: prefixed(env_fn, "LOG_FILE").map(PathBuf::from),
        row_policy: prefixed(env_fn, "ROW_POLICY"),
        header_marker: prefixed(env_fn, "HEADER_MARKER"),
    })
}

fn parse_env<T>(env_fn: fn(&str) -> Option<String>, suffix: &str) -> Result<Option<T>, PlannerError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match prefixed(env_fn, suffix) {
        Some(s) => s
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| PlannerError::ConfigEnvParseError {
                var: format!("{ENV_PREFIX}{suffix}"),
                detail: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn cli_layer_from(
    common: &CommonArgs,
    backend: Option<&BackendArgs>,
    extractor: Option<&ExtractorArgs>,
) -> ConfigLayer {
    ConfigLayer {
        backend: backend.and_then(|b| b.backend.clone()),
        model: backend.and_then(|b| b.model.clone()),
        api_key: None,
        api_base_url: backend.and_then(|b| b.api_base_url.clone()),
        temperature: backend.and_then(|b| b.temperature),
        request_timeout_sec: backend.and_then(|b| b.request_timeout_sec),
        agent_cmd: backend.and_then(|b| b.agent_cmd.clone()),
        agent_args: None,
        language: common.language.clone(),
        state_dir: common.state_dir.clone(),
        log_level: common.log_level.clone(),
        log_file: common.log_file.clone(),
        row_policy: extractor.and_then(|x| x.row_policy.clone()),
        header_marker: extractor.and_then(|x| x.header_marker.clone()),
    }
}

/// Merge three layers. For each field, pick CLI first, then env, then file.
fn merge_layers(file: ConfigLayer, env: ConfigLayer, cli: ConfigLayer) -> ConfigLayer {
    ConfigLayer {
        backend: cli.backend.or(env.backend).or(file.backend),
        model: cli.model.or(env.model).or(file.model),
        api_key: cli.api_key.or(env.api_key).or(file.api_key),
        api_base_url: cli
            .api_base_url
            .or(env.api_base_url)
            .or(file.api_base_url),
        temperature: cli.temperature.or(env.temperature).or(file.temperature),
        request_timeout_sec: cli
            .request_timeout_sec
            .or(env.request_timeout_sec)
            .or(file.request_timeout_sec),
        agent_cmd: cli.agent_cmd.or(env.agent_cmd).or(file.agent_cmd),
        agent_args: cli.agent_args.or(env.agent_args).or(file.agent_args),
        language: cli.language.or(env.language).or(file.language),
        state_dir: cli.state_dir.or(env.state_dir).or(file.state_dir),
        log_level: cli.log_level.or(env.log_level).or(file.log_level),
        log_file: cli.log_file.or(env.log_file).or(file.log_file),
        row_policy: cli.row_policy.or(env.row_policy).or(file.row_policy),
        header_marker: cli
            .header_marker
            .or(env.header_marker)
            .or(file.header_marker),
    }
}
