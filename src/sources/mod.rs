pub mod youtube;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::PlaybackError;

pub use youtube::YtDlpResolver;

/// Referencia resuelta y reproducible a un track.
///
/// Inmutable una vez creada: los campos solo se leen con getters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    source_url: String,
    title: String,
}

impl TrackDescriptor {
    pub fn new(source_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

/// Opciones de resolución
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub timeout: Duration,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Convierte una URL o término de búsqueda en tracks reproducibles.
///
/// Una búsqueda puede devolver varios candidatos, el mejor primero.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(
        &self,
        query: &str,
        options: &ResolveOptions,
    ) -> Result<Vec<TrackDescriptor>, PlaybackError>;
}

/// Resuelve `query` y se queda con el primer candidato.
///
/// Si vence el timeout, se informa como `ResolutionFailure`.
pub async fn resolve_first(
    resolver: &dyn MediaResolver,
    query: &str,
    options: &ResolveOptions,
) -> Result<TrackDescriptor, PlaybackError> {
    let candidates = tokio::time::timeout(options.timeout, resolver.resolve(query, options))
        .await
        .map_err(|_| {
            warn!("⏰ Timeout resolviendo: {}", query);
            PlaybackError::ResolutionFailure(format!(
                "timed out after {}",
                humantime::format_duration(options.timeout)
            ))
        })??;

    debug!("🔍 {} candidatos para '{}'", candidates.len(), query);

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| PlaybackError::ResolutionFailure(format!("no results for '{}'", query)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_resolve_first_takes_first_candidate() {
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_resolve()
            .withf(|query, _| query.to_string() == "lofi beats")
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    TrackDescriptor::new("u1", "First"),
                    TrackDescriptor::new("u2", "Second"),
                ])
            });

        let track = resolve_first(&resolver, "lofi beats", &ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(track, TrackDescriptor::new("u1", "First"));
    }

    #[tokio::test]
    async fn test_no_candidates_is_resolution_failure() {
        let mut resolver = MockMediaResolver::new();
        resolver.expect_resolve().returning(|_, _| Ok(Vec::new()));

        let err = resolve_first(&resolver, "nothing", &ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::ResolutionFailure(_)));
    }

    #[tokio::test]
    async fn test_resolver_error_passes_through() {
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_resolve()
            .returning(|_, _| Err(PlaybackError::ResolutionFailure("network".into())));

        let err = resolve_first(&resolver, "x", &ResolveOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, PlaybackError::ResolutionFailure("network".into()));
    }

    struct SlowResolver;

    #[async_trait]
    impl MediaResolver for SlowResolver {
        async fn resolve(
            &self,
            _query: &str,
            _options: &ResolveOptions,
        ) -> Result<Vec<TrackDescriptor>, PlaybackError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_timeout_is_resolution_failure() {
        let options = ResolveOptions {
            timeout: Duration::from_millis(50),
        };
        let err = resolve_first(&SlowResolver, "slow", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::ResolutionFailure(_)));
    }
}
