use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Shared secret for the `x-exxacta-signature` header on inbound
    /// automation webhooks. When unset the webhook endpoints reject every
    /// request (warned at startup) rather than accepting them unsigned.
    pub webhook_secret: Option<String>,
    /// Outbound n8n webhook URL for fire-and-forget notifications.
    /// When unset the notifier is disabled.
    pub n8n_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            webhook_secret: std::env::var("EXXACTA_N8N_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            n8n_webhook_url: std::env::var("N8N_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|url| {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("N8N_WEBHOOK_URL must start with http:// or https://");
                    }
                    Ok(url)
                })
                .transpose()?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Server Port: {}", config.port);
        if config.webhook_secret.is_none() {
            tracing::warn!(
                "EXXACTA_N8N_SECRET not set - all inbound automation webhooks will be rejected"
            );
        }
        match config.n8n_webhook_url {
            Some(ref url) => tracing::info!("n8n notifier configured: {}", url),
            None => tracing::warn!("N8N_WEBHOOK_URL not set - outbound notifications disabled"),
        }

        Ok(config)
    }
}
