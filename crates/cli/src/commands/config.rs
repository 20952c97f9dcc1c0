use std::env;
use std::fs;
use std::path::Path;

use flightdesk_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// One inspectable setting: dotted key, overriding env var, rendered value.
struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: &'static str, value: impl ToString) -> Self {
        Self { key, env_key, value: value.to_string() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let dialogue = &config.dialogue;
    let search = &config.search;
    let llm = &config.llm;

    vec![
        Field::new(
            "dialogue.confidence_threshold",
            "FLIGHTDESK_DIALOGUE_CONFIDENCE_THRESHOLD",
            dialogue.confidence_threshold,
        ),
        Field::new("dialogue.turn_window", "FLIGHTDESK_DIALOGUE_TURN_WINDOW", dialogue.turn_window),
        Field::new(
            "dialogue.idle_timeout_secs",
            "FLIGHTDESK_DIALOGUE_IDLE_TIMEOUT_SECS",
            dialogue.idle_timeout_secs,
        ),
        Field::new(
            "dialogue.extractor_timeout_secs",
            "FLIGHTDESK_DIALOGUE_EXTRACTOR_TIMEOUT_SECS",
            dialogue.extractor_timeout_secs,
        ),
        Field::new("search.provider", "FLIGHTDESK_SEARCH_PROVIDER", format!("{:?}", search.provider)),
        Field::new("search.timeout_secs", "FLIGHTDESK_SEARCH_TIMEOUT_SECS", search.timeout_secs),
        Field::new("search.max_retries", "FLIGHTDESK_SEARCH_MAX_RETRIES", search.max_retries),
        Field::new("search.backoff_base_ms", "FLIGHTDESK_SEARCH_BACKOFF_BASE_MS", search.backoff_base_ms),
        Field::new("search.backoff_max_ms", "FLIGHTDESK_SEARCH_BACKOFF_MAX_MS", search.backoff_max_ms),
        Field::new("search.cache_ttl_secs", "FLIGHTDESK_SEARCH_CACHE_TTL_SECS", search.cache_ttl_secs),
        Field::new("search.max_offers", "FLIGHTDESK_SEARCH_MAX_OFFERS", search.max_offers),
        Field::new("search.currency", "FLIGHTDESK_SEARCH_CURRENCY", &search.currency),
        Field::new("amadeus.base_url", "FLIGHTDESK_AMADEUS_BASE_URL", &config.amadeus.base_url),
        Field::new(
            "amadeus.client_id",
            "FLIGHTDESK_AMADEUS_CLIENT_ID",
            config.amadeus.client_id.as_deref().map(redact_identifier).unwrap_or_else(unset),
        ),
        Field::new(
            "amadeus.client_secret",
            "FLIGHTDESK_AMADEUS_CLIENT_SECRET",
            redact_secret(config.amadeus.client_secret.as_ref()),
        ),
        Field::new(
            "booking.provider",
            "FLIGHTDESK_BOOKING_PROVIDER",
            format!("{:?}", config.booking.provider),
        ),
        Field::new(
            "booking.link_base_url",
            "FLIGHTDESK_BOOKING_LINK_BASE_URL",
            config.booking.link_base_url.clone().unwrap_or_else(unset),
        ),
        Field::new("llm.provider", "FLIGHTDESK_LLM_PROVIDER", format!("{:?}", llm.provider)),
        Field::new("llm.model", "FLIGHTDESK_LLM_MODEL", &llm.model),
        Field::new(
            "llm.base_url",
            "FLIGHTDESK_LLM_BASE_URL",
            llm.base_url.clone().unwrap_or_else(unset),
        ),
        Field::new("llm.api_key", "FLIGHTDESK_LLM_API_KEY", redact_secret(llm.api_key.as_ref())),
        Field::new("llm.timeout_secs", "FLIGHTDESK_LLM_TIMEOUT_SECS", llm.timeout_secs),
        Field::new(
            "llm.min_request_interval_ms",
            "FLIGHTDESK_LLM_MIN_REQUEST_INTERVAL_MS",
            llm.min_request_interval_ms,
        ),
        Field::new("server.bind_address", "FLIGHTDESK_SERVER_BIND_ADDRESS", &config.server.bind_address),
        Field::new("server.port", "FLIGHTDESK_SERVER_PORT", config.server.port),
        Field::new(
            "server.reaper_interval_secs",
            "FLIGHTDESK_SERVER_REAPER_INTERVAL_SECS",
            config.server.reaper_interval_secs,
        ),
        Field::new("logging.level", "FLIGHTDESK_LOGGING_LEVEL", &config.logging.level),
        Field::new(
            "logging.format",
            "FLIGHTDESK_LOGGING_FORMAT",
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn unset() -> String {
    "<unset>".to_string()
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret.map(|value| value.expose_secret().trim().is_empty()) {
        None => unset(),
        Some(true) => "<empty>".to_string(),
        Some(false) => "<redacted>".to_string(),
    }
}

fn redact_identifier(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    let visible: String = trimmed.chars().take(4).collect();
    format!("{visible}***")
}
