//! [`VoiceTransport`] backed by songbird.
//!
//! Track end and track error events are turned into calls on the
//! [`CompletionNotifier`] handed over with each `play`; songbird fires them
//! from its own event thread.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::ControlError,
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use super::transport::{CompletionNotifier, VoiceTransport};
use crate::error::PlaybackError;

const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Conexión de voz activa y el track que suena en ella.
#[derive(Clone)]
pub struct SongbirdCall {
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    current: Arc<Mutex<Option<TrackHandle>>>,
}

impl SongbirdCall {
    fn current(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    default_volume: f32,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, default_volume: f32) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; TempoBard/0.1)")
            .build()
            .unwrap_or_default();

        Self {
            manager,
            http,
            default_volume,
        }
    }

    /// Verifica que la URL responda, para que un enlace muerto falle al abrir
    /// y no a mitad de reproducción.
    async fn check_reachable(&self, source_url: &str) -> Result<(), PlaybackError> {
        let response = self
            .http
            .head(source_url)
            .timeout(REACHABILITY_TIMEOUT)
            .send()
            .await
            .map_err(|e| PlaybackError::PlaybackOpenFailure(e.to_string()))?;

        reachability_verdict(response.status()).map_err(PlaybackError::PlaybackOpenFailure)
    }

    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<tokio::sync::Mutex<Call>>, PlaybackError> {
        self.manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlaybackError::ConnectFailure(e.to_string()))
    }
}

/// Algunos CDN rechazan HEAD; solo un error claro de cliente o servidor
/// cuenta como no reproducible.
fn reachability_verdict(status: StatusCode) -> Result<(), String> {
    if status.is_success() || status.is_redirection() || status == StatusCode::METHOD_NOT_ALLOWED {
        Ok(())
    } else {
        Err(status.to_string())
    }
}

/// Resultado de `stop` sobre un track.
///
/// `Finished` solo indica que el track ya terminó solo: su `TrackEvent::End`
/// ya disparó el notificador, así que el avance llega igual.
fn stop_outcome(result: Result<(), ControlError>) -> Result<(), PlaybackError> {
    match result {
        Ok(()) | Err(ControlError::Finished) => Ok(()),
        Err(e) => Err(PlaybackError::TransportError(e.to_string())),
    }
}

/// Resultado de `pause`/`resume`: un track ya terminado no es un fallo del enlace.
fn control_outcome(result: Result<(), ControlError>) -> Result<(), PlaybackError> {
    match result {
        Ok(()) => Ok(()),
        Err(ControlError::Finished) => Err(PlaybackError::NothingPlaying),
        Err(e) => Err(PlaybackError::TransportError(e.to_string())),
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    type Handle = SongbirdCall;

    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<SongbirdCall, PlaybackError> {
        let call = self.join(guild_id, channel_id).await?;
        {
            let mut handler = call.lock().await;
            if let Err(e) = handler.deafen(true).await {
                warn!("No se pudo ensordecer al bot en guild {}: {}", guild_id, e);
            }
        }

        Ok(SongbirdCall {
            guild_id,
            call,
            current: Arc::new(Mutex::new(None)),
        })
    }

    async fn move_to(
        &self,
        handle: &SongbirdCall,
        channel_id: ChannelId,
    ) -> Result<(), PlaybackError> {
        // songbird reutiliza el driver existente al cambiar de canal
        self.join(handle.guild_id, channel_id).await.map(|_| ())
    }

    async fn play(
        &self,
        handle: &SongbirdCall,
        source_url: &str,
        on_complete: CompletionNotifier,
    ) -> Result<(), PlaybackError> {
        self.check_reachable(source_url).await?;

        let input: Input = HttpRequest::new(self.http.clone(), source_url.to_string()).into();
        let track = {
            let mut call = handle.call.lock().await;
            call.play_input(input)
        };

        if let Err(e) = track.set_volume(self.default_volume) {
            debug!("No se pudo ajustar el volumen: {}", e);
        }

        track
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndHandler {
                    notifier: on_complete.clone(),
                },
            )
            .map_err(|e| PlaybackError::PlaybackOpenFailure(e.to_string()))?;
        track
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorHandler {
                    guild_id: handle.guild_id,
                    notifier: on_complete,
                },
            )
            .map_err(|e| PlaybackError::PlaybackOpenFailure(e.to_string()))?;

        *handle.current.lock() = Some(track);
        Ok(())
    }

    async fn pause(&self, handle: &SongbirdCall) -> Result<(), PlaybackError> {
        let track = handle.current().ok_or(PlaybackError::NothingPlaying)?;
        control_outcome(track.pause())
    }

    async fn resume(&self, handle: &SongbirdCall) -> Result<(), PlaybackError> {
        let track = handle.current().ok_or(PlaybackError::NothingPlaying)?;
        control_outcome(track.play())
    }

    async fn stop(&self, handle: &SongbirdCall) -> Result<(), PlaybackError> {
        let Some(track) = handle.current.lock().take() else {
            return Ok(());
        };
        stop_outcome(track.stop())
    }

    async fn disconnect(&self, handle: &SongbirdCall) -> Result<(), PlaybackError> {
        handle.current.lock().take();
        {
            let mut call = handle.call.lock().await;
            call.stop();
        }

        match self.manager.remove(handle.guild_id).await {
            Ok(()) => {
                info!("👋 Llamada de voz cerrada en guild {}", handle.guild_id);
                Ok(())
            }
            // Ya no había llamada: el resultado es el mismo
            Err(songbird::error::JoinError::NoCall) => Ok(()),
            Err(e) => Err(PlaybackError::TransportError(e.to_string())),
        }
    }

    async fn is_connected(&self, handle: &SongbirdCall) -> bool {
        let call = handle.call.lock().await;
        call.current_channel().is_some()
    }

    async fn is_playing(&self, handle: &SongbirdCall) -> bool {
        match handle.current() {
            Some(track) => matches!(
                track.get_info().await.map(|info| info.playing),
                Ok(PlayMode::Play)
            ),
            None => false,
        }
    }

    async fn is_paused(&self, handle: &SongbirdCall) -> bool {
        match handle.current() {
            Some(track) => matches!(
                track.get_info().await.map(|info| info.playing),
                Ok(PlayMode::Pause)
            ),
            None => false,
        }
    }
}

/// Handler para cuando termina un track (natural o por `stop`)
struct TrackEndHandler {
    notifier: CompletionNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("Track terminado (gen {})", self.notifier.generation());
        self.notifier.notify(None);
        None
    }
}

/// Handler para errores de tracks a mitad de reproducción
struct TrackErrorHandler {
    guild_id: GuildId,
    notifier: CompletionNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut reason = String::from("unknown stream error");
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    reason = format!("{:?}", e);
                }
            }
        }

        error!("❌ Error en track para guild {}: {}", self.guild_id, reason);
        self.notifier.notify(Some(reason));
        None
    }
}
