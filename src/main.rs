use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;

use crate::audio::{PlaybackController, SongbirdTransport};
use crate::bot::{ChannelAnnouncer, TempoBard};
use crate::config::Config;
use crate::sources::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tempo_bard=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Tempo Bard v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    match YtDlpResolver::verify_dependencies().await {
        Ok(version) => info!("✅ yt-dlp {}", version),
        Err(e) => warn!("⚠️ {:?}, /play no podrá resolver canciones", e),
    }

    // Intents mínimos: guilds para la caché y estados de voz para ubicar usuarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let manager = Songbird::serenity();
    let http = Arc::new(Http::new(&config.discord_token));

    let transport = Arc::new(SongbirdTransport::new(
        manager.clone(),
        config.default_volume,
    ));
    let announcer = Arc::new(ChannelAnnouncer::new(http));
    let controller = Arc::new(PlaybackController::new(
        transport,
        announcer,
        config.policy(),
    ));

    let handler = TempoBard::new(config.clone(), controller, Arc::new(YtDlpResolver::new()));

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
        }
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    let version = YtDlpResolver::verify_dependencies().await?;
    println!("OK (yt-dlp {})", version);
    Ok(())
}
