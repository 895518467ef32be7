use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::PlaybackPolicy;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Política de reproducción
    pub max_auto_skips: u32,
    pub auto_leave_on_empty: bool,
    pub skip_on_empty_queue: bool,

    // Límites de tiempo
    pub resolve_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| defaults.default_volume.to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| defaults.max_queue_size.to_string())
                .parse()?,

            // Política
            max_auto_skips: std::env::var("MAX_AUTO_SKIPS")
                .unwrap_or_else(|_| defaults.max_auto_skips.to_string())
                .parse()?,
            auto_leave_on_empty: std::env::var("AUTO_LEAVE_ON_EMPTY")
                .unwrap_or_else(|_| defaults.auto_leave_on_empty.to_string())
                .parse()?,
            skip_on_empty_queue: std::env::var("SKIP_ON_EMPTY_QUEUE")
                .unwrap_or_else(|_| defaults.skip_on_empty_queue.to_string())
                .parse()?,

            // Tiempos (formato humantime: "30s", "1m 30s")
            resolve_timeout: parse_duration_var("RESOLVE_TIMEOUT", defaults.resolve_timeout)?,
            connect_timeout: parse_duration_var("CONNECT_TIMEOUT", defaults.connect_timeout)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Valida los valores de configuración.
    ///
    /// - El volumen debe estar entre 0.0 y 2.0
    /// - El tamaño de cola y el límite de auto-skips deben ser mayores a 0
    /// - Los timeouts no pueden ser cero
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_auto_skips == 0 {
            anyhow::bail!("Max auto skips must be greater than 0");
        }

        if self.resolve_timeout.is_zero() || self.connect_timeout.is_zero() {
            anyhow::bail!("Timeouts must be greater than 0");
        }

        Ok(())
    }

    /// Parte de la configuración que usan los workers de sesión.
    pub fn policy(&self) -> PlaybackPolicy {
        PlaybackPolicy {
            max_queue_size: self.max_queue_size,
            max_auto_skips: self.max_auto_skips,
            auto_leave: self.auto_leave_on_empty,
            skip_on_empty_queue: self.skip_on_empty_queue,
            connect_timeout: self.connect_timeout,
        }
    }

    /// Resumen de la configuración para los logs.
    ///
    /// Nunca incluye el token del bot.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} queue\n  \
            Policy: {} auto-skips, auto-leave={}, skip-on-empty={}\n  \
            Timeouts: resolve {}, connect {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.max_auto_skips,
            self.auto_leave_on_empty,
            self.skip_on_empty_queue,
            humantime::format_duration(self.resolve_timeout),
            humantime::format_duration(self.connect_timeout),
        )
    }
}

fn parse_duration_var(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(val) if !val.trim().is_empty() => humantime::parse_duration(val.trim())
            .map_err(|e| anyhow::anyhow!("Invalid duration in {}: {}", name, e)),
        _ => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin valores por defecto)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,
            max_queue_size: 1000,

            max_auto_skips: 3,
            auto_leave_on_empty: false,
            skip_on_empty_queue: true,

            resolve_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_volume() {
        let config = Config {
            default_volume: 3.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_auto_skip_budget() {
        let config = Config {
            max_auto_skips: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_mirrors_config() {
        let config = Config {
            max_queue_size: 7,
            auto_leave_on_empty: true,
            ..Config::default()
        };
        let policy = config.policy();
        assert_eq!(policy.max_queue_size, 7);
        assert!(policy.auto_leave);
        assert_eq!(policy.max_auto_skips, 3);
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        };
        assert!(!config.summary().contains("super-secret"));
    }
}
