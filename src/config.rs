//! Application configuration, read once at startup from the environment.

/// Runtime configuration for the ingestion/scoring/lifecycle service.
#[derive(Debug, Clone)]
pub struct Config {
    pub vendor_api_key: Option<String>,
    pub ingest_webhook_secret: String,
    pub cron_secret: String,
    pub database_path: String,
    pub log_level: String,
    pub bind_addr: String,
    pub elite_cutoff: u8,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let vendor_api_key = std::env::var("VENDOR_API_KEY").ok();

        let ingest_webhook_secret = std::env::var("INGEST_WEBHOOK_SECRET")
            .unwrap_or_else(|_| "dev-webhook-secret".to_string());

        let cron_secret =
            std::env::var("CRON_SECRET").unwrap_or_else(|_| "dev-cron-secret".to_string());

        let database_path =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "./leadsignal.db".to_string());

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let elite_cutoff = std::env::var("ELITE_CUTOFF")
            .unwrap_or_else(|_| "75".to_string())
            .parse()
            .unwrap_or(75);

        Ok(Self {
            vendor_api_key,
            ingest_webhook_secret,
            cron_secret,
            database_path,
            log_level,
            bind_addr,
            elite_cutoff,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_unset() {
        for key in [
            "VENDOR_API_KEY",
            "INGEST_WEBHOOK_SECRET",
            "CRON_SECRET",
            "DATABASE_URL",
            "LOG_LEVEL",
            "BIND_ADDR",
            "ELITE_CUTOFF",
        ] {
            std::env::remove_var(key);
        }
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.elite_cutoff, 75);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.vendor_api_key.is_none());
    }
}
