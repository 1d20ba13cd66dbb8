use std::io::BufRead;

#[derive(Clone)]
pub struct Config {
    pub poll_interval_ms: u64,
    pub idle_interval_ms: u64,
    pub depth: usize,
    pub hysteresis_band: f64,
    pub quote_currency: String,
    pub fetch_timeout_ms: u64,
    pub fetch_retries: u32,
    pub binance_base: String,
    pub telegram_token: Option<String>,
    pub telegram_base: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            poll_interval_ms: std::env::var("POLL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(1000),
            idle_interval_ms: std::env::var("IDLE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(500),
            depth: std::env::var("DEPTH").ok().and_then(|v| v.parse().ok()).unwrap_or(10),
            hysteresis_band: std::env::var("HYSTERESIS_BAND").ok().and_then(|v| v.parse().ok()).unwrap_or(0.02),
            quote_currency: std::env::var("QUOTE").unwrap_or_else(|_| "USDT".to_string()),
            fetch_timeout_ms: std::env::var("FETCH_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(5000),
            fetch_retries: std::env::var("FETCH_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(1),
            binance_base: std::env::var("BINANCE_BASE").unwrap_or_else(|_| "https://api.binance.com".to_string()),
            telegram_token: std::env::var("TELEGRAM_TOKEN").ok(),
            telegram_base: std::env::var("TELEGRAM_BASE").unwrap_or_else(|_| "https://api.telegram.org".to_string()),
        }
    }
}

/// Populate the process environment from a dotenv-style file. Existing
/// variables win; blank lines and `#` comments are ignored. A missing file
/// is not an error.
pub fn load_env_file(path: &str) {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return,
    };
    for line in std::io::BufReader::new(file).lines().map_while(Result::ok) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if std::env::var_os(key).is_none() {
                std::env::set_var(key, value.trim());
            }
        }
    }
}
