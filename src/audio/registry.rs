use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use super::controller::SessionCommand;

/// Extremo emisor del canal de comandos de un worker de sesión.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn new(tx: UnboundedSender<SessionCommand>) -> Self {
        Self { tx }
    }

    /// Solo falla si el worker ya terminó.
    pub fn send(&self, command: SessionCommand) -> Result<(), SessionCommand> {
        self.tx.send(command).map_err(|e| e.0)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Una sesión por guild. Cada entrada tiene su propio worker, cola y estado.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<GuildId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed())
    }

    /// Devuelve la sesión viva de `guild_id`; llama a `spawn` para crear una
    /// si no existe (o si el worker anterior murió).
    pub fn get_or_create(
        &self,
        guild_id: GuildId,
        spawn: impl FnOnce() -> SessionHandle,
    ) -> SessionHandle {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_closed() {
                    warn!("♻️ Worker de guild {} terminado, recreando sesión", guild_id);
                    occupied.insert(spawn());
                }
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => {
                info!("🆕 Nueva sesión para guild {}", guild_id);
                vacant.insert(spawn()).value().clone()
            }
        }
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.remove(&guild_id).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
