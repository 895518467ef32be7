//! Per-guild session state and the transitions allowed between states.
//!
//! A [`Session`] is only ever touched by its own session worker, so none of
//! the methods here lock anything. Every mutation goes through a named
//! transition; the fields themselves are private.

use serenity::model::id::{ChannelId, GuildId};
use tracing::{debug, info};

use super::queue::TrackQueue;
use crate::{error::PlaybackError, sources::TrackDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Conectado y sin reproducir. La cola puede tener tracks.
    Idle,
    Playing,
    Paused,
}

impl SessionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Idle | Self::Playing | Self::Paused)
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::Paused => "paused",
        }
    }
}

/// Enlace de voz de una sesión: handle del transporte y su canal.
#[derive(Debug, Clone)]
struct VoiceLink<H> {
    handle: H,
    channel_id: ChannelId,
}

#[derive(Debug)]
pub struct Session<H> {
    guild_id: GuildId,
    state: SessionState,
    current_track: Option<TrackDescriptor>,
    announcement_target: Option<ChannelId>,
    voice: Option<VoiceLink<H>>,
    queue: TrackQueue,
    generation: u64,
}

impl<H: Clone> Session<H> {
    pub fn new(guild_id: GuildId, max_queue_size: usize) -> Self {
        Self {
            guild_id,
            state: SessionState::Disconnected,
            current_track: None,
            announcement_target: None,
            voice: None,
            queue: TrackQueue::new(max_queue_size),
            generation: 0,
        }
    }

    // Lectura

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_track(&self) -> Option<&TrackDescriptor> {
        self.current_track.as_ref()
    }

    pub fn announcement_target(&self) -> Option<ChannelId> {
        self.announcement_target
    }

    pub fn voice_handle(&self) -> Option<&H> {
        self.voice.as_ref().map(|v| &v.handle)
    }

    pub fn voice_channel(&self) -> Option<ChannelId> {
        self.voice.as_ref().map(|v| v.channel_id)
    }

    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    // Validaciones

    /// Playing o Paused; si no, el error que debe ver quien llama.
    pub fn ensure_active(&self) -> Result<(), PlaybackError> {
        match self.state {
            SessionState::Playing | SessionState::Paused => Ok(()),
            SessionState::Idle => Err(PlaybackError::NothingPlaying),
            SessionState::Disconnected | SessionState::Connecting => {
                Err(PlaybackError::NoActiveSession)
            }
        }
    }

    pub fn ensure_connected(&self) -> Result<&H, PlaybackError> {
        match (&self.voice, self.state.is_connected()) {
            (Some(link), true) => Ok(&link.handle),
            _ => Err(PlaybackError::NoActiveSession),
        }
    }

    // Transiciones

    pub fn set_announcement_target(&mut self, channel_id: ChannelId) {
        self.announcement_target = Some(channel_id);
    }

    /// Disconnected -> Connecting
    pub fn begin_connect(&mut self) {
        debug_assert_eq!(self.state, SessionState::Disconnected);
        self.transition(SessionState::Connecting);
    }

    /// Connecting -> Idle
    pub fn connected(&mut self, handle: H, channel_id: ChannelId) {
        self.voice = Some(VoiceLink { handle, channel_id });
        self.transition(SessionState::Idle);
    }

    /// Connecting -> Disconnected
    pub fn connect_failed(&mut self) {
        self.voice = None;
        self.transition(SessionState::Disconnected);
    }

    /// La conexión siguió al usuario a otro canal
    pub fn moved(&mut self, channel_id: ChannelId) {
        if let Some(link) = self.voice.as_mut() {
            link.channel_id = channel_id;
        }
    }

    pub fn enqueue(&mut self, track: TrackDescriptor) -> Result<usize, PlaybackError> {
        self.queue.enqueue(track)
    }

    pub fn dequeue_next(&mut self) -> Option<TrackDescriptor> {
        self.queue.dequeue_front()
    }

    /// Invalida todo notificador pendiente y devuelve la nueva generación.
    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Idle/Playing/Paused -> Playing con un track recién arrancado
    pub fn start_track(&mut self, track: TrackDescriptor) {
        self.current_track = Some(track);
        self.transition(SessionState::Playing);
    }

    /// Playing -> Paused. Devuelve false si ya estaba en pausa.
    pub fn pause(&mut self) -> Result<bool, PlaybackError> {
        self.ensure_active()?;
        if self.state == SessionState::Paused {
            return Ok(false);
        }
        self.transition(SessionState::Paused);
        Ok(true)
    }

    /// Paused -> Playing, mismo track. Devuelve false si ya sonaba.
    pub fn resume(&mut self) -> Result<bool, PlaybackError> {
        self.ensure_active()?;
        if self.state == SessionState::Playing {
            return Ok(false);
        }
        self.transition(SessionState::Playing);
        Ok(true)
    }

    /// Playing/Paused -> Idle. La cola no se toca.
    pub fn go_idle(&mut self) {
        self.current_track = None;
        if self.voice.is_some() {
            self.transition(SessionState::Idle);
        } else {
            self.transition(SessionState::Disconnected);
        }
    }

    /// Cualquiera -> Disconnected. Limpia la cola y el track actual, invalida
    /// la generación y devuelve el handle de voz (si había) para cerrarlo.
    pub fn disconnect(&mut self) -> Option<H> {
        self.queue.clear();
        self.current_track = None;
        self.bump_generation();
        self.transition(SessionState::Disconnected);
        self.voice.take().map(|link| link.handle)
    }

    fn transition(&mut self, to: SessionState) {
        if self.state != to {
            info!(
                "🔁 Guild {}: {} -> {} (gen {})",
                self.guild_id,
                self.state.as_str(),
                to.as_str(),
                self.generation
            );
        } else {
            debug!("Guild {}: permanece en {}", self.guild_id, to.as_str());
        }
        self.state = to;
    }

    /// `current_track` existe exactamente en Playing o Paused.
    #[cfg(test)]
    pub fn invariants_hold(&self) -> bool {
        self.current_track.is_some() == self.state.is_active()
            && self.voice.is_some() == self.state.is_connected()
    }
}
