use log::{info, warn};
use std::env;
use std::str::FromStr;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

// Runtime configuration, read once from the environment at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub port: u16,
    pub openai_base_url: String,
    pub openai_model: String,
    pub max_upload_bytes: usize,
    pub templates_dir: String,
    pub static_dir: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            bind_address: env_or("BIND_ADDRESS", "127.0.0.1"),
            port: parse_env_or("PORT", 8080),
            openai_base_url: env_or("OPENAI_BASE_URL", DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            openai_model: env_or("OPENAI_MODEL", DEFAULT_MODEL),
            max_upload_bytes: parse_env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            templates_dir: env_or("TEMPLATES_DIR", "templates"),
            static_dir: env_or("STATIC_DIR", "static"),
        };

        info!(
            "Configuration: listening on {}:{}, model {} at {}",
            config.bind_address, config.port, config.openai_model, config.openai_base_url
        );
        config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            openai_model: DEFAULT_MODEL.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            templates_dir: "templates".to_string(),
            static_dir: "static".to_string(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparseable {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}
