//! Error taxonomy for playback commands and the session core.
//!
//! User-triggered conditions (`UserNotInVoiceChannel`, `NoActiveSession`,
//! `NothingPlaying`, `QueueEmpty`, `QueueFull`) go straight back to the command
//! handler. `ResolutionFailure` and `ConnectFailure` abort a single play
//! request. `PlaybackOpenFailure` is normally absorbed by the auto-skip loop,
//! and `TransportError` means the voice link can no longer be trusted.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("user is not in a voice channel")]
    UserNotInVoiceChannel,

    #[error("no active session for this guild")]
    NoActiveSession,

    #[error("nothing is playing")]
    NothingPlaying,

    #[error("queue is empty")]
    QueueEmpty,

    #[error("queue is full (max {max} tracks)")]
    QueueFull { max: usize },

    #[error("could not resolve track: {0}")]
    ResolutionFailure(String),

    #[error("could not connect to voice channel: {0}")]
    ConnectFailure(String),

    #[error("could not open playback source: {0}")]
    PlaybackOpenFailure(String),

    #[error("voice transport error: {0}")]
    TransportError(String),
}

impl PlaybackError {
    /// Texto que ve el usuario que usó el comando.
    pub fn user_message(&self) -> String {
        match self {
            Self::UserNotInVoiceChannel => {
                "Go into a voice channel before trying to play anything.".to_string()
            }
            Self::NoActiveSession => "I'm not connected to a voice channel.".to_string(),
            Self::NothingPlaying => "Nothing is playing right now.".to_string(),
            Self::QueueEmpty => "There are no songs in the queue.".to_string(),
            Self::QueueFull { max } => format!("The queue is full ({} songs max).", max),
            Self::ResolutionFailure(reason) => format!("Couldn't find that track: {}", reason),
            Self::ConnectFailure(reason) => format!("Couldn't join your voice channel: {}", reason),
            Self::PlaybackOpenFailure(reason) => format!("Couldn't play that track: {}", reason),
            Self::TransportError(reason) => format!("Voice connection error: {}", reason),
        }
    }

    /// Errores tras los cuales hay que soltar el enlace de voz.
    pub fn is_transport_fatal(&self) -> bool {
        matches!(self, Self::TransportError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_fatal() {
        assert!(PlaybackError::TransportError("gone".into()).is_transport_fatal());
        assert!(!PlaybackError::PlaybackOpenFailure("404".into()).is_transport_fatal());
        assert!(!PlaybackError::NoActiveSession.is_transport_fatal());
    }

    #[test]
    fn test_user_message_mentions_limit() {
        let msg = PlaybackError::QueueFull { max: 10 }.user_message();
        assert!(msg.contains("10"));
    }
}
