use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{CommandTarget, PlayOutcome, SessionState, SessionStatus},
    bot::TempoBard,
    error::PlaybackError,
    sources::{resolve_first, ResolveOptions},
};

/// Cuántos tracks en cola se listan en `/queue`
const QUEUE_PREVIEW: usize = 10;

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TempoBard,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond(ctx, &command, "❌ This command only works inside a server.", true).await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let target = CommandTarget {
        guild_id,
        text_channel: command.channel_id,
        voice_channel: user_voice_channel(ctx, guild_id, command.user.id),
    };

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, target).await?,
        "pause" => {
            let result = bot.controller.request_pause(&target).await;
            reply_with(ctx, &command, result.map(|_| "⏸️ Paused.".to_string())).await?
        }
        "resume" => {
            let result = bot.controller.request_resume(&target).await;
            reply_with(ctx, &command, result.map(|_| "▶️ Resumed.".to_string())).await?
        }
        "skip" => {
            let result = bot.controller.request_skip(&target).await;
            let result = result.map(|track| format!("⏭️ Skipped {}.", track.title()));
            reply_with(ctx, &command, result).await?
        }
        "stop" => {
            let result = bot.controller.request_stop(&target).await;
            let result = result.map(|_| "⏹️ Stopped and cleared the queue.".to_string());
            reply_with(ctx, &command, result).await?
        }
        "queue" => {
            let result = bot.controller.status(guild_id).await;
            reply_with(ctx, &command, result.map(|status| format_status(&status))).await?
        }
        _ => respond(ctx, &command, "❌ Unknown command.", true).await?,
    }

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBard,
    target: CommandTarget,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // No tiene sentido resolver si no hay a dónde conectarse
    if target.voice_channel.is_none() {
        let message = PlaybackError::UserNotInVoiceChannel.user_message();
        return respond(ctx, command, &format!("❌ {}", message), true).await;
    }

    // Defer la respuesta ya que la resolución puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let options = ResolveOptions {
        timeout: bot.config().resolve_timeout,
    };

    let result = match resolve_first(bot.resolver.as_ref(), query, &options).await {
        Ok(track) => bot.controller.request_play(&target, track).await,
        Err(e) => Err(e),
    };

    let content = match result {
        Ok(outcome) => play_reply(&outcome),
        Err(e) => {
            warn!("/play falló en guild {}: {}", target.guild_id, e);
            format!("❌ {}", e.user_message())
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}

/// Texto de respuesta para `/play`
fn play_reply(outcome: &PlayOutcome) -> String {
    match outcome {
        PlayOutcome::Started(track) => format!("🎵 Now Playing: {}", track.title()),
        PlayOutcome::Queued { track, position } => {
            format!("➕ Added to Queue: {} (#{})", track.title(), position)
        }
    }
}

/// Texto de `/queue` a partir del estado de la sesión.
fn format_status(status: &SessionStatus) -> String {
    let mut lines = Vec::new();

    match (&status.current_track, status.state) {
        (Some(track), SessionState::Paused) => lines.push(format!("⏸️ Paused: {}", track.title())),
        (Some(track), _) => lines.push(format!("🎵 Now Playing: {}", track.title())),
        (None, SessionState::Disconnected) => lines.push("Not connected to voice.".to_string()),
        (None, _) => lines.push("Nothing is playing.".to_string()),
    }

    if status.queued.is_empty() {
        lines.push("The queue is empty.".to_string());
    } else {
        lines.push(format!("Up next ({}):", status.queued.len()));
        for (i, track) in status.queued.iter().take(QUEUE_PREVIEW).enumerate() {
            lines.push(format!("{}. {}", i + 1, track.title()));
        }
        if status.queued.len() > QUEUE_PREVIEW {
            lines.push(format!("…and {} more", status.queued.len() - QUEUE_PREVIEW));
        }
    }

    lines.join("\n")
}

// Funciones auxiliares

async fn reply_with(
    ctx: &Context,
    command: &CommandInteraction,
    result: Result<String, PlaybackError>,
) -> Result<()> {
    match result {
        Ok(content) => respond(ctx, command, &content, false).await,
        Err(e) => respond(ctx, command, &format!("❌ {}", e.user_message()), true).await,
    }
}

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id);

    channel_id
}
