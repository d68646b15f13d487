use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    /// Shared secret the external classifier sends with validation callbacks.
    pub callback_api_key: String,

    // Event publisher
    pub event_queue_capacity: usize,
    pub event_workers: usize,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
            callback_api_key: required_env("CALLBACK_API_KEY"),
            event_queue_capacity: env::var("EVENT_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .expect("EVENT_QUEUE_CAPACITY must be a number"),
            event_workers: env::var("EVENT_WORKERS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .expect("EVENT_WORKERS must be a number"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
