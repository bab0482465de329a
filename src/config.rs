const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ALLOWED_ORIGINS: &str = "https://panelsipmetcorp.cl,https://www.panelsipmetcorp.cl";

/// Runtime configuration, resolved once at startup and passed into the router.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Credential for the completion API. `None` makes every analysis fail with a
    /// configuration error instead of aborting startup.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_temperature: f32,
    pub openai_max_tokens: u32,
    pub openai_timeout_secs: u64,
    /// Empty means permissive CORS (`*`).
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            port: var("PORT")
                .unwrap_or_else(|| "3000".to_string())
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            openai_api_key: var("OPENAI_API_KEY").map(|key| key.trim().to_string()),
            openai_base_url: var("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
                .trim()
                .trim_end_matches('/')
                .to_string(),
            openai_model: var("OPENAI_MODEL")
                .map(|m| m.trim().to_string())
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_temperature: var("OPENAI_TEMPERATURE")
                .unwrap_or_else(|| "0.3".to_string())
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("OPENAI_TEMPERATURE must be a number"))?,
            openai_max_tokens: var("OPENAI_MAX_TOKENS")
                .unwrap_or_else(|| "1500".to_string())
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("OPENAI_MAX_TOKENS must be a positive integer"))?,
            openai_timeout_secs: var("OPENAI_TIMEOUT_SECS")
                .unwrap_or_else(|| "30".to_string())
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("OPENAI_TIMEOUT_SECS must be a positive integer"))?,
            allowed_origins: parse_origins(
                &var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            ),
        };

        config.validate()?;

        // Never log the API key itself
        tracing::debug!("OpenAI base URL: {}", config.openai_base_url);
        tracing::debug!("OpenAI model: {}", config.openai_model);
        tracing::debug!("Server Port: {}", config.port);
        if config.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY is not set, /api/analizar will answer with 500");
        }

        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let url = url::Url::parse(&self.openai_base_url)
            .map_err(|e| anyhow::anyhow!("OPENAI_BASE_URL is not a valid URL: {}", e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("OPENAI_BASE_URL must start with http:// or https://");
        }
        if !(0.0..=2.0).contains(&self.openai_temperature) {
            anyhow::bail!("OPENAI_TEMPERATURE must be between 0.0 and 2.0");
        }
        if self.openai_max_tokens == 0 {
            anyhow::bail!("OPENAI_MAX_TOKENS must be greater than zero");
        }
        if self.openai_timeout_secs == 0 {
            anyhow::bail!("OPENAI_TIMEOUT_SECS must be greater than zero");
        }
        Ok(())
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    if raw.trim() == "*" {
        return Vec::new();
    }
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}
