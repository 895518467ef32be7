//! # Audio Module
//!
//! Per-guild playback core for Tempo Bard.
//!
//! ## Architecture
//!
//! ### [`queue`] - Track Queue
//! - FIFO of resolved tracks, one per session, O(1) at both ends
//!
//! ### [`session`] - Session State Machine
//! - `Disconnected -> Connecting -> Idle <-> Playing <-> Paused`
//! - Owns the current track, voice handle, announcement channel and the
//!   play generation counter
//!
//! ### [`controller`] - Playback Controller
//! - One worker task per guild, fed through a command channel
//! - The only place that advances a session to its next track
//! - Discards stale completion notifications by generation
//!
//! ### [`registry`] - Session Registry
//! - Guild id to session worker map
//!
//! ### [`transport`] / [`songbird_transport`] - Voice Transport
//! - Narrow `VoiceTransport` and `Announcer` traits, plus the songbird
//!   implementation used in production
//!
//! ## Command Flow
//!
//! A handler builds a [`CommandTarget`] (guild, text channel and the user's
//! voice channel) and hands a resolved track to
//! `PlaybackController::request_play`. The session worker connects when
//! needed, enqueues, and starts playback if the session was idle.
//! `request_pause`, `request_resume`, `request_skip` and `request_stop` take
//! the same path and return once the worker has processed the command.

use std::time::Duration;

pub mod controller;
pub mod queue;
pub mod registry;
pub mod session;
pub mod songbird_transport;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{CommandTarget, PlayOutcome, PlaybackController, SessionStatus};
pub use session::SessionState;
pub use songbird_transport::SongbirdTransport;
pub use transport::{Announcer, CompletionNotifier, VoiceTransport};

/// Parámetros de la configuración que usan los workers de sesión.
#[derive(Debug, Clone)]
pub struct PlaybackPolicy {
    pub max_queue_size: usize,
    /// Fuentes seguidas que pueden fallar al abrir antes de que un avance se rinda.
    pub max_auto_skips: u32,
    /// Salir del canal de voz cuando la cola se vacía.
    pub auto_leave: bool,
    /// Si es false, `skip` sin nada en cola se rechaza con `QueueEmpty`.
    pub skip_on_empty_queue: bool,
    pub connect_timeout: Duration,
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            max_auto_skips: 3,
            auto_leave: false,
            skip_on_empty_queue: true,
            connect_timeout: Duration::from_secs(15),
        }
    }
}
