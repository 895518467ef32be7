//! # Bot Module
//!
//! Discord-facing side of Tempo Bard.
//!
//! This module contains:
//! - Slash command registration ([`commands`])
//! - Command handling, which turns interactions into playback requests
//!   ([`handlers`])
//! - The text-channel [`Announcer`](crate::audio::Announcer) used by the
//!   session workers ([`announcer`])
//!
//! ## Architecture
//!
//! [`TempoBard`] implements Serenity's [`EventHandler`] trait. It owns no
//! playback state itself: every command is forwarded to the
//! [`PlaybackController`], and voice disconnects or guild removals are
//! reported to it so the affected session is reset.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, Guild, GuildId, Interaction, Ready, UnavailableGuild, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod announcer;
pub mod commands;
pub mod handlers;

pub use announcer::ChannelAnnouncer;

use crate::{
    audio::{PlaybackController, SongbirdTransport},
    config::Config,
    sources::MediaResolver,
};

/// Handler principal de eventos de Discord.
///
/// ## Campos
///
/// - `config`: configuración del bot (tokens, límites, tiempos)
/// - `controller`: sesiones de reproducción por guild
/// - `resolver`: convierte las búsquedas de `/play` en tracks
pub struct TempoBard {
    config: Arc<Config>,
    pub controller: Arc<PlaybackController<SongbirdTransport>>,
    pub resolver: Arc<dyn MediaResolver>,
}

impl TempoBard {
    pub fn new(
        config: Arc<Config>,
        controller: Arc<PlaybackController<SongbirdTransport>>,
        resolver: Arc<dyn MediaResolver>,
    ) -> Self {
        Self {
            config,
            controller,
            resolver,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registra los comandos slash en Discord.
    ///
    /// Con `GUILD_ID` se registran solo en esa guild (propagación inmediata,
    /// útil en desarrollo); si no, globalmente.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!(
                            "No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild."
                        )
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for TempoBard {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Avisa a la sesión que el bot salió de voz.
    ///
    /// También llega tras nuestro propio `stop` o tras una salida anterior a
    /// una reconexión; la sesión comprueba el enlace y lo ignora.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot desconectado de voz en guild {}", guild_id);
                self.controller.transport_disconnected(guild_id);
            }
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // `unavailable` significa caída de Discord, no expulsión
        if !incomplete.unavailable {
            self.controller.forget(incomplete.id);
        }
    }
}
