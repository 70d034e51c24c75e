use serde::Serialize;

/// Process configuration, loaded once at startup from the environment.
///
/// Grounded on the repeated `if let Ok(val) = std::env::var(...) { if let
/// Ok(val) = val.parse() { ... } }` loading idiom used for pool configuration
/// elsewhere in the workspace.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub port: u16,
    pub metrics_port: u16,
    pub extraction_secret: String,
    pub max_concurrent: usize,
    pub browser_idle_timeout_ms: u64,
    pub browser_max_age_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub circuit_breaker_exit_threshold_ms: u64,
    pub chrome_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            metrics_port: 9090,
            extraction_secret: String::new(),
            max_concurrent: 2,
            browser_idle_timeout_ms: 60_000,
            browser_max_age_ms: 7_200_000,
            shutdown_timeout_ms: 30_000,
            circuit_breaker_exit_threshold_ms: 120_000,
            chrome_path: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PORT") {
            if let Ok(val) = val.parse() {
                config.port = val;
            }
        }
        if let Ok(val) = std::env::var("METRICS_PORT") {
            if let Ok(val) = val.parse() {
                config.metrics_port = val;
            }
        }
        if let Ok(val) = std::env::var("EXTRACTION_SECRET") {
            config.extraction_secret = val;
        }
        if let Ok(val) = std::env::var("MAX_CONCURRENT") {
            if let Ok(val) = val.parse() {
                config.max_concurrent = val;
            }
        }
        if let Ok(val) = std::env::var("BROWSER_IDLE_TIMEOUT") {
            if let Ok(val) = val.parse() {
                config.browser_idle_timeout_ms = val;
            }
        }
        if let Ok(val) = std::env::var("BROWSER_MAX_AGE") {
            if let Ok(val) = val.parse() {
                config.browser_max_age_ms = val;
            }
        }
        if let Ok(val) = std::env::var("SHUTDOWN_TIMEOUT") {
            if let Ok(val) = val.parse() {
                config.shutdown_timeout_ms = val;
            }
        }
        if let Ok(val) = std::env::var("CIRCUIT_BREAKER_EXIT_THRESHOLD") {
            if let Ok(val) = val.parse() {
                config.circuit_breaker_exit_threshold_ms = val;
            }
        }
        if let Ok(val) = std::env::var("CHROME_PATH") {
            config.chrome_path = Some(val);
        }

        config
    }

    /// Validates bounds; does not require `extraction_secret` so that
    /// `/health` can still be reported, but `main` refuses to start the
    /// extract router without one.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("MAX_CONCURRENT must be greater than 0".to_string());
        }
        if self.port == 0 || self.metrics_port == 0 {
            return Err("PORT and METRICS_PORT must be non-zero".to_string());
        }
        if self.port == self.metrics_port {
            return Err("PORT and METRICS_PORT must differ".to_string());
        }
        Ok(())
    }

    pub fn secret_configured(&self) -> bool {
        !self.extraction_secret.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = AppConfig::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.browser_idle_timeout_ms, 60_000);
        assert_eq!(config.browser_max_age_ms, 7_200_000);
        assert_eq!(config.shutdown_timeout_ms, 30_000);
        assert_eq!(config.circuit_breaker_exit_threshold_ms, 120_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut config = AppConfig::default();
        config.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_colliding_ports() {
        let mut config = AppConfig::default();
        config.metrics_port = config.port;
        assert!(config.validate().is_err());
    }
}
