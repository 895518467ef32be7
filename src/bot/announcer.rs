use serenity::{http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::warn;

use crate::audio::Announcer;

/// Publica los avisos de la sesión como mensajes en un canal de texto.
///
/// El envío corre en una tarea aparte: el worker de sesión nunca espera a la
/// API HTTP de Discord.
pub struct ChannelAnnouncer {
    http: Arc<Http>,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

impl Announcer for ChannelAnnouncer {
    fn send(&self, target: ChannelId, text: String) {
        let http = self.http.clone();
        tokio::spawn(async move {
            if let Err(e) = target.say(&*http, text).await {
                warn!("No se pudo enviar mensaje al canal {}: {:?}", target, e);
            }
        });
    }
}
