use std::path::Path;

use crate::{Config, LlmProviderType};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured or a provider
    /// configuration is invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.llm.providers.is_empty() {
            anyhow::bail!("at least one LLM provider must be configured");
        }

        self.validate_llm_config()
    }

    fn validate_llm_config(&self) -> anyhow::Result<()> {
        for (name, provider) in &self.llm.providers {
            if provider.provider_type == LlmProviderType::HuggingFace && provider.base_url.is_none() {
                anyhow::bail!("provider '{name}': hugging_face providers require base_url");
            }

            let mut patterns = provider.models.include.iter().chain(&provider.models.exclude);
            if patterns.any(|p| p.trim().is_empty()) {
                anyhow::bail!("provider '{name}': model patterns must not be empty");
            }

            if provider.token_limit == Some(0) {
                anyhow::bail!("provider '{name}': token_limit must be greater than 0");
            }

            for (field, value) in [("timeout", &provider.timeout), ("connect_timeout", &provider.connect_timeout)] {
                if let Some(value) = value {
                    duration_str::parse(value)
                        .map_err(|e| anyhow::anyhow!("provider '{name}': invalid {field} '{value}': {e}"))?;
                }
            }
        }

        Ok(())
    }
}
