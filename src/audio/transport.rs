//! Narrow interfaces to the outside world: the voice transport that streams
//! audio, the announcer that posts text, and the completion handoff that
//! carries "track finished" back into a session's worker.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::controller::SessionCommand;
use crate::error::PlaybackError;

/// Transmite audio a un canal de voz.
///
/// `play` vuelve en cuanto la fuente está abierta; el fin del stream (natural,
/// por `stop` o por error) se informa después con el [`CompletionNotifier`]
/// recibido, posiblemente desde otro hilo.
#[async_trait]
pub trait VoiceTransport: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Self::Handle, PlaybackError>;

    async fn move_to(&self, handle: &Self::Handle, channel_id: ChannelId)
        -> Result<(), PlaybackError>;

    async fn play(
        &self,
        handle: &Self::Handle,
        source_url: &str,
        on_complete: CompletionNotifier,
    ) -> Result<(), PlaybackError>;

    async fn pause(&self, handle: &Self::Handle) -> Result<(), PlaybackError>;

    async fn resume(&self, handle: &Self::Handle) -> Result<(), PlaybackError>;

    /// Termina la fuente actual y dispara su notificador.
    async fn stop(&self, handle: &Self::Handle) -> Result<(), PlaybackError>;

    async fn disconnect(&self, handle: &Self::Handle) -> Result<(), PlaybackError>;

    /// Si el enlace de voz sigue en un canal.
    async fn is_connected(&self, handle: &Self::Handle) -> bool;

    async fn is_playing(&self, handle: &Self::Handle) -> bool;

    async fn is_paused(&self, handle: &Self::Handle) -> bool;
}

/// Avisos de texto sin esperar respuesta.
pub trait Announcer: Send + Sync + 'static {
    fn send(&self, target: ChannelId, text: String);
}

/// Ticket thread-safe que recibe el transporte con cada `play`.
///
/// [`notify`](Self::notify) nunca toca el estado de la sesión: solo publica un
/// `Completed` con su generación en el canal de comandos de la sesión.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    guild_id: GuildId,
    generation: u64,
    tx: UnboundedSender<SessionCommand>,
}

impl CompletionNotifier {
    pub(crate) fn new(
        guild_id: GuildId,
        generation: u64,
        tx: UnboundedSender<SessionCommand>,
    ) -> Self {
        Self {
            guild_id,
            generation,
            tx,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `error` es `Some` si el stream murió en vez de terminar normalmente.
    pub fn notify(&self, error: Option<String>) {
        let command = SessionCommand::Completed {
            generation: self.generation,
            error,
        };
        if self.tx.send(command).is_err() {
            debug!(
                "Sesión de guild {} cerrada, notificación gen {} descartada",
                self.guild_id, self.generation
            );
        }
    }
}
