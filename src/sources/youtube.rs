use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{MediaResolver, ResolveOptions, TrackDescriptor};
use crate::error::PlaybackError;

/// Formato preferido: opus en webm, que songbird decodifica sin transcodificar.
const AUDIO_FORMAT: &str = "bestaudio[ext=webm][acodec=opus]/bestaudio/best";

/// Resolver basado en yt-dlp (YouTube y todo lo que yt-dlp soporte)
pub struct YtDlpResolver {
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: tokio::sync::Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    url: Option<String>,
}

impl YtDlpResolver {
    pub fn new() -> Self {
        Self {
            rate_limiter: tokio::sync::Semaphore::new(3),
        }
    }

    /// Las URLs van tal cual a yt-dlp; lo demás es una búsqueda de un resultado.
    pub fn build_target(query: &str) -> String {
        if Self::is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        }
    }

    pub fn is_url(query: &str) -> bool {
        url::Url::parse(query.trim())
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    /// Parsea la salida `--dump-json` (un objeto JSON por línea)
    fn parse_dump(stdout: &str) -> Vec<TrackDescriptor> {
        stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
            .filter_map(|info| {
                let url = info.url?;
                let title = info.title.unwrap_or_else(|| "Untitled".to_string());
                Some(TrackDescriptor::new(url, title))
            })
            .collect()
    }

    async fn run_ytdlp(&self, target: &str) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        debug!("📊 Ejecutando yt-dlp para: {}", target);

        let output = Command::new("yt-dlp")
            .args([
                "--no-playlist",
                "--dump-json",
                "--no-warnings",
                "--quiet",
                "--socket-timeout",
                "10",
                "-f",
                AUDIO_FORMAT,
                target,
            ])
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Verifica que yt-dlp esté instalado
    pub async fn verify_dependencies() -> Result<String> {
        let output = Command::new("yt-dlp")
            .arg("--version")
            .output()
            .await
            .context("yt-dlp no está disponible")?;

        if !output.status.success() {
            anyhow::bail!("yt-dlp no puede ejecutarse correctamente");
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(
        &self,
        query: &str,
        _options: &ResolveOptions,
    ) -> Result<Vec<TrackDescriptor>, PlaybackError> {
        let target = Self::build_target(query);
        info!("🔍 Resolviendo: {}", target);

        let stdout = self
            .run_ytdlp(&target)
            .await
            .map_err(|e| PlaybackError::ResolutionFailure(e.to_string()))?;

        Ok(Self::parse_dump(&stdout))
    }
}
