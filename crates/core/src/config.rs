use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "flightdesk.toml";
pub const NESTED_CONFIG_FILE: &str = "config/flightdesk.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub dialogue: DialogueConfig,
    pub search: SearchConfig,
    pub amadeus: AmadeusConfig,
    pub booking: BookingConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DialogueConfig {
    /// Extractions scoring below this (0-100) are routed to clarification.
    pub confidence_threshold: u8,
    pub turn_window: usize,
    pub idle_timeout_secs: u64,
    pub extractor_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub provider: SearchProviderKind,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub cache_ttl_secs: u64,
    pub max_offers: usize,
    pub currency: String,
}

#[derive(Clone, Debug)]
pub struct AmadeusConfig {
    pub base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct BookingConfig {
    pub provider: BookingProviderKind,
    pub link_base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub min_request_interval_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub reaper_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchProviderKind {
    Simulated,
    Amadeus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingProviderKind {
    Simulated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Rules,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub search_provider: Option<SearchProviderKind>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub confidence_threshold: Option<u8>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dialogue: DialogueConfig {
                confidence_threshold: 60,
                turn_window: 8,
                idle_timeout_secs: 1800,
                extractor_timeout_secs: 10,
            },
            search: SearchConfig {
                provider: SearchProviderKind::Simulated,
                timeout_secs: 20,
                max_retries: 2,
                backoff_base_ms: 250,
                backoff_max_ms: 4000,
                cache_ttl_secs: 300,
                max_offers: 5,
                currency: "USD".to_string(),
            },
            amadeus: AmadeusConfig {
                base_url: "https://test.api.amadeus.com".to_string(),
                client_id: None,
                client_secret: None,
            },
            booking: BookingConfig { provider: BookingProviderKind::Simulated, link_base_url: None },
            llm: LlmConfig {
                provider: LlmProvider::Rules,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                min_request_interval_ms: 0,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                reaper_interval_secs: 60,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for SearchProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simulated" => Ok(Self::Simulated),
            "amadeus" => Ok(Self::Amadeus),
            other => Err(ConfigError::Validation(format!(
                "unsupported search provider `{other}` (expected simulated|amadeus)"
            ))),
        }
    }
}

impl std::str::FromStr for BookingProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simulated" => Ok(Self::Simulated),
            other => Err(ConfigError::Validation(format!(
                "unsupported booking provider `{other}` (expected simulated)"
            ))),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected rules|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(dialogue) = patch.dialogue {
            if let Some(confidence_threshold) = dialogue.confidence_threshold {
                self.dialogue.confidence_threshold = confidence_threshold;
            }
            if let Some(turn_window) = dialogue.turn_window {
                self.dialogue.turn_window = turn_window;
            }
            if let Some(idle_timeout_secs) = dialogue.idle_timeout_secs {
                self.dialogue.idle_timeout_secs = idle_timeout_secs;
            }
            if let Some(extractor_timeout_secs) = dialogue.extractor_timeout_secs {
                self.dialogue.extractor_timeout_secs = extractor_timeout_secs;
            }
        }

        if let Some(search) = patch.search {
            if let Some(provider) = search.provider {
                self.search.provider = provider;
            }
            if let Some(timeout_secs) = search.timeout_secs {
                self.search.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = search.max_retries {
                self.search.max_retries = max_retries;
            }
            if let Some(backoff_base_ms) = search.backoff_base_ms {
                self.search.backoff_base_ms = backoff_base_ms;
            }
            if let Some(backoff_max_ms) = search.backoff_max_ms {
                self.search.backoff_max_ms = backoff_max_ms;
            }
            if let Some(cache_ttl_secs) = search.cache_ttl_secs {
                self.search.cache_ttl_secs = cache_ttl_secs;
            }
            if let Some(max_offers) = search.max_offers {
                self.search.max_offers = max_offers;
            }
            if let Some(currency) = search.currency {
                self.search.currency = currency;
            }
        }

        if let Some(amadeus) = patch.amadeus {
            if let Some(base_url) = amadeus.base_url {
                self.amadeus.base_url = base_url;
            }
            if let Some(client_id) = amadeus.client_id {
                self.amadeus.client_id = Some(client_id);
            }
            if let Some(client_secret) = amadeus.client_secret {
                self.amadeus.client_secret = Some(secret_value(client_secret));
            }
        }

        if let Some(booking) = patch.booking {
            if let Some(provider) = booking.provider {
                self.booking.provider = provider;
            }
            if let Some(link_base_url) = booking.link_base_url {
                self.booking.link_base_url = Some(link_base_url);
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(min_request_interval_ms) = llm.min_request_interval_ms {
                self.llm.min_request_interval_ms = min_request_interval_ms;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(reaper_interval_secs) = server.reaper_interval_secs {
                self.server.reaper_interval_secs = reaper_interval_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FLIGHTDESK_DIALOGUE_CONFIDENCE_THRESHOLD") {
            self.dialogue.confidence_threshold =
                parse_u8("FLIGHTDESK_DIALOGUE_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("FLIGHTDESK_DIALOGUE_TURN_WINDOW") {
            self.dialogue.turn_window = parse_usize("FLIGHTDESK_DIALOGUE_TURN_WINDOW", &value)?;
        }
        if let Some(value) = read_env("FLIGHTDESK_DIALOGUE_IDLE_TIMEOUT_SECS") {
            self.dialogue.idle_timeout_secs =
                parse_u64("FLIGHTDESK_DIALOGUE_IDLE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FLIGHTDESK_DIALOGUE_EXTRACTOR_TIMEOUT_SECS") {
            self.dialogue.extractor_timeout_secs =
                parse_u64("FLIGHTDESK_DIALOGUE_EXTRACTOR_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FLIGHTDESK_SEARCH_PROVIDER") {
            self.search.provider = value.parse()?;
        }
        if let Some(value) = read_env("FLIGHTDESK_SEARCH_TIMEOUT_SECS") {
            self.search.timeout_secs = parse_u64("FLIGHTDESK_SEARCH_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FLIGHTDESK_SEARCH_MAX_RETRIES") {
            self.search.max_retries = parse_u32("FLIGHTDESK_SEARCH_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("FLIGHTDESK_SEARCH_BACKOFF_BASE_MS") {
            self.search.backoff_base_ms = parse_u64("FLIGHTDESK_SEARCH_BACKOFF_BASE_MS", &value)?;
        }
        if let Some(value) = read_env("FLIGHTDESK_SEARCH_BACKOFF_MAX_MS") {
            self.search.backoff_max_ms = parse_u64("FLIGHTDESK_SEARCH_BACKOFF_MAX_MS", &value)?;
        }
        if let Some(value) = read_env("FLIGHTDESK_SEARCH_CACHE_TTL_SECS") {
            self.search.cache_ttl_secs = parse_u64("FLIGHTDESK_SEARCH_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("FLIGHTDESK_SEARCH_MAX_OFFERS") {
            self.search.max_offers = parse_usize("FLIGHTDESK_SEARCH_MAX_OFFERS", &value)?;
        }
        if let Some(value) = read_env("FLIGHTDESK_SEARCH_CURRENCY") {
            self.search.currency = value;
        }

        if let Some(value) = read_env("FLIGHTDESK_AMADEUS_BASE_URL") {
            self.amadeus.base_url = value;
        }
        if let Some(value) = read_env("FLIGHTDESK_AMADEUS_CLIENT_ID") {
            self.amadeus.client_id = Some(value);
        }
        if let Some(value) = read_env("FLIGHTDESK_AMADEUS_CLIENT_SECRET") {
            self.amadeus.client_secret = Some(secret_value(value));
        }

        if let Some(value) = read_env("FLIGHTDESK_BOOKING_PROVIDER") {
            self.booking.provider = value.parse()?;
        }
        if let Some(value) = read_env("FLIGHTDESK_BOOKING_LINK_BASE_URL") {
            self.booking.link_base_url = Some(value);
        }

        if let Some(value) = read_env("FLIGHTDESK_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("FLIGHTDESK_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("FLIGHTDESK_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("FLIGHTDESK_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("FLIGHTDESK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("FLIGHTDESK_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FLIGHTDESK_LLM_MIN_REQUEST_INTERVAL_MS") {
            self.llm.min_request_interval_ms =
                parse_u64("FLIGHTDESK_LLM_MIN_REQUEST_INTERVAL_MS", &value)?;
        }

        if let Some(value) = read_env("FLIGHTDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("FLIGHTDESK_SERVER_PORT") {
            self.server.port = parse_u16("FLIGHTDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("FLIGHTDESK_SERVER_REAPER_INTERVAL_SECS") {
            self.server.reaper_interval_secs =
                parse_u64("FLIGHTDESK_SERVER_REAPER_INTERVAL_SECS", &value)?;
        }

        let log_level =
            read_env("FLIGHTDESK_LOGGING_LEVEL").or_else(|| read_env("FLIGHTDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FLIGHTDESK_LOGGING_FORMAT").or_else(|| read_env("FLIGHTDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(search_provider) = overrides.search_provider {
            self.search.provider = search_provider;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(confidence_threshold) = overrides.confidence_threshold {
            self.dialogue.confidence_threshold = confidence_threshold;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_dialogue(&self.dialogue)?;
        validate_search(&self.search)?;
        validate_amadeus(&self.amadeus, self.search.provider)?;
        validate_booking(&self.booking)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Picks the explicit path when given, otherwise the first default location that exists.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    if dialogue.confidence_threshold > 100 {
        return Err(ConfigError::Validation(
            "dialogue.confidence_threshold must be in range 0..=100".to_string(),
        ));
    }
    if dialogue.turn_window == 0 || dialogue.turn_window > 64 {
        return Err(ConfigError::Validation(
            "dialogue.turn_window must be in range 1..=64".to_string(),
        ));
    }
    if dialogue.idle_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "dialogue.idle_timeout_secs must be greater than zero".to_string(),
        ));
    }
    if dialogue.extractor_timeout_secs == 0 || dialogue.extractor_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "dialogue.extractor_timeout_secs must be in range 1..=120".to_string(),
        ));
    }
    Ok(())
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    if search.timeout_secs == 0 || search.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "search.timeout_secs must be in range 1..=120".to_string(),
        ));
    }
    if search.max_retries > 5 {
        return Err(ConfigError::Validation(
            "search.max_retries must be in range 0..=5".to_string(),
        ));
    }
    if search.backoff_base_ms == 0 {
        return Err(ConfigError::Validation(
            "search.backoff_base_ms must be greater than zero".to_string(),
        ));
    }
    if search.backoff_max_ms < search.backoff_base_ms {
        return Err(ConfigError::Validation(
            "search.backoff_max_ms must be at least search.backoff_base_ms".to_string(),
        ));
    }
    if search.max_offers == 0 || search.max_offers > 50 {
        return Err(ConfigError::Validation(
            "search.max_offers must be in range 1..=50".to_string(),
        ));
    }
    let currency = search.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ConfigError::Validation(
            "search.currency must be a three-letter ISO 4217 code such as USD".to_string(),
        ));
    }
    Ok(())
}

fn validate_amadeus(amadeus: &AmadeusConfig, provider: SearchProviderKind) -> Result<(), ConfigError> {
    if !is_http_url(&amadeus.base_url) {
        return Err(ConfigError::Validation(
            "amadeus.base_url must start with http:// or https://".to_string(),
        ));
    }

    if provider == SearchProviderKind::Amadeus {
        let missing_id =
            amadeus.client_id.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
        if missing_id {
            return Err(ConfigError::Validation(
                "amadeus.client_id is required when search.provider = amadeus. Create an app at https://developers.amadeus.com".to_string(),
            ));
        }
        let missing_secret = amadeus
            .client_secret
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing_secret {
            return Err(ConfigError::Validation(
                "amadeus.client_secret is required when search.provider = amadeus".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_booking(booking: &BookingConfig) -> Result<(), ConfigError> {
    if let Some(base_url) = &booking.link_base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "booking.link_base_url must start with http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::Rules => {}
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            if llm.model.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "llm.model is required for the ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.reaper_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "server.reaper_interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.parse::<u8>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    dialogue: Option<DialoguePatch>,
    search: Option<SearchPatch>,
    amadeus: Option<AmadeusPatch>,
    booking: Option<BookingPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    confidence_threshold: Option<u8>,
    turn_window: Option<usize>,
    idle_timeout_secs: Option<u64>,
    extractor_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    provider: Option<SearchProviderKind>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    backoff_base_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
    cache_ttl_secs: Option<u64>,
    max_offers: Option<usize>,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AmadeusPatch {
    base_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BookingPatch {
    provider: Option<BookingProviderKind>,
    link_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    min_request_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    reaper_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
