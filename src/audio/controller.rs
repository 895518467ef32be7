//! Playback orchestration.
//!
//! Every guild gets one [`SessionWorker`] task that owns its [`Session`] and
//! drains a command channel one message at a time. Commands from slash
//! handlers and completion notifications from the voice transport land on the
//! same channel, so each session's transitions are strictly serialized while
//! different guilds progress independently.
//!
//! Completion notifications carry the generation they were issued for. Every
//! `play` bumps the session's generation, as do `stop` and the drained-queue
//! path, so a notification that arrives after a skip already advanced (or
//! after a stop) no longer matches and is dropped.

use futures::FutureExt;
use serenity::model::id::{ChannelId, GuildId};
use std::{panic::AssertUnwindSafe, sync::Arc};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, WeakUnboundedSender},
    oneshot,
};
use tracing::{debug, error, info, warn};

use super::{
    registry::{SessionHandle, SessionRegistry},
    session::{Session, SessionState},
    transport::{Announcer, CompletionNotifier, VoiceTransport},
    PlaybackPolicy,
};
use crate::{error::PlaybackError, sources::TrackDescriptor};

pub const QUEUE_EMPTY_NOTICE: &str = "Queue finished, nothing left to play.";

type Reply<T> = oneshot::Sender<Result<T, PlaybackError>>;

/// Mensajes que consume un worker de sesión.
#[derive(Debug)]
pub enum SessionCommand {
    Play {
        voice_channel: ChannelId,
        text_channel: ChannelId,
        track: TrackDescriptor,
        reply: Reply<PlayOutcome>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    Skip {
        text_channel: ChannelId,
        reply: Reply<TrackDescriptor>,
    },
    Stop {
        text_channel: ChannelId,
        reply: Reply<()>,
    },
    Status {
        reply: Reply<SessionStatus>,
    },
    /// Lo envía un [`CompletionNotifier`] cuando termina una fuente.
    Completed {
        generation: u64,
        error: Option<String>,
    },
    /// El bot salió de voz por algo distinto de `stop`.
    TransportDisconnected,
}

/// Origen de un comando.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTarget {
    pub guild_id: GuildId,
    /// Canal de texto donde se usó el comando.
    pub text_channel: ChannelId,
    /// Canal de voz del usuario, si está en uno.
    pub voice_channel: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// El track empezó a sonar de inmediato.
    Started(TrackDescriptor),
    /// El track espera en la cola; `position` 1 es el siguiente.
    Queued {
        track: TrackDescriptor,
        position: usize,
    },
}

/// Foto del estado de una sesión, tomada dentro de su worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub current_track: Option<TrackDescriptor>,
    pub queued: Vec<TrackDescriptor>,
    pub generation: u64,
    pub transport_playing: bool,
    pub transport_paused: bool,
}

/// Punto de entrada para los handlers de comandos.
pub struct PlaybackController<T: VoiceTransport> {
    registry: SessionRegistry,
    transport: Arc<T>,
    announcer: Arc<dyn Announcer>,
    policy: PlaybackPolicy,
}

impl<T: VoiceTransport> PlaybackController<T> {
    pub fn new(transport: Arc<T>, announcer: Arc<dyn Announcer>, policy: PlaybackPolicy) -> Self {
        Self {
            registry: SessionRegistry::new(),
            transport,
            announcer,
            policy,
        }
    }

    /// Conecta si hace falta, encola `track` y lo arranca si la sesión
    /// estaba en reposo.
    pub async fn request_play(
        &self,
        target: &CommandTarget,
        track: TrackDescriptor,
    ) -> Result<PlayOutcome, PlaybackError> {
        let voice_channel = target
            .voice_channel
            .ok_or(PlaybackError::UserNotInVoiceChannel)?;

        let handle = self
            .registry
            .get_or_create(target.guild_id, || self.spawn_session(target.guild_id));

        Self::send_and_wait(&handle, |reply| SessionCommand::Play {
            voice_channel,
            text_channel: target.text_channel,
            track,
            reply,
        })
        .await
    }

    pub async fn request_pause(&self, target: &CommandTarget) -> Result<(), PlaybackError> {
        self.call(target.guild_id, |reply| SessionCommand::Pause { reply })
            .await
    }

    pub async fn request_resume(&self, target: &CommandTarget) -> Result<(), PlaybackError> {
        self.call(target.guild_id, |reply| SessionCommand::Resume { reply })
            .await
    }

    /// Detiene la fuente actual. El avance ocurre cuando el transporte
    /// notifica el fin. Devuelve el track saltado.
    pub async fn request_skip(
        &self,
        target: &CommandTarget,
    ) -> Result<TrackDescriptor, PlaybackError> {
        self.call(target.guild_id, |reply| SessionCommand::Skip {
            text_channel: target.text_channel,
            reply,
        })
        .await
    }

    pub async fn request_stop(&self, target: &CommandTarget) -> Result<(), PlaybackError> {
        self.call(target.guild_id, |reply| SessionCommand::Stop {
            text_channel: target.text_channel,
            reply,
        })
        .await
    }

    pub async fn status(&self, guild_id: GuildId) -> Result<SessionStatus, PlaybackError> {
        self.call(guild_id, |reply| SessionCommand::Status { reply })
            .await
    }

    /// Entrega a la sesión una desconexión de voz externa.
    pub fn transport_disconnected(&self, guild_id: GuildId) {
        if let Some(handle) = self.registry.get(guild_id) {
            if handle.send(SessionCommand::TransportDisconnected).is_err() {
                debug!("Sesión de guild {} ya cerrada", guild_id);
            }
        }
    }

    /// Elimina la sesión de la guild. Su worker termina cuando se suelta el
    /// último notificador pendiente.
    pub fn forget(&self, guild_id: GuildId) {
        if self.registry.remove(guild_id).is_some() {
            info!("🧹 Sesión de guild {} eliminada", guild_id);
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    fn spawn_session(&self, guild_id: GuildId) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = SessionWorker {
            session: Session::new(guild_id, self.policy.max_queue_size),
            transport: self.transport.clone(),
            announcer: self.announcer.clone(),
            policy: self.policy.clone(),
            tx: tx.downgrade(),
            rx,
        };
        tokio::spawn(worker.run());

        SessionHandle::new(tx)
    }

    async fn call<R>(
        &self,
        guild_id: GuildId,
        build: impl FnOnce(Reply<R>) -> SessionCommand,
    ) -> Result<R, PlaybackError> {
        let handle = self
            .registry
            .get(guild_id)
            .ok_or(PlaybackError::NoActiveSession)?;
        Self::send_and_wait(&handle, build).await
    }

    async fn send_and_wait<R>(
        handle: &SessionHandle,
        build: impl FnOnce(Reply<R>) -> SessionCommand,
    ) -> Result<R, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        handle
            .send(build(reply))
            .map_err(|_| PlaybackError::NoActiveSession)?;
        // Un worker que murió a mitad de comando suelta el reply
        rx.await.map_err(|_| PlaybackError::NoActiveSession)?
    }
}

/// Dueño de una sesión; procesa sus comandos en orden.
struct SessionWorker<T: VoiceTransport> {
    session: Session<T::Handle>,
    transport: Arc<T>,
    announcer: Arc<dyn Announcer>,
    policy: PlaybackPolicy,
    // Débil: el worker termina cuando el registry suelta la sesión
    tx: WeakUnboundedSender<SessionCommand>,
    rx: UnboundedReceiver<SessionCommand>,
}

impl<T: VoiceTransport> SessionWorker<T> {
    async fn run(mut self) {
        let guild_id = self.session.guild_id();
        debug!("▶️ Worker de sesión iniciado para guild {}", guild_id);

        while let Some(command) = self.rx.recv().await {
            let outcome = AssertUnwindSafe(self.handle(command)).catch_unwind().await;

            if outcome.is_err() {
                error!(
                    "💥 Pánico procesando comando en guild {} (gen {}), reiniciando sesión",
                    guild_id,
                    self.session.generation()
                );
                self.recover(false).await;
            }
        }

        self.leave().await;
        debug!("⏹️ Worker de sesión finalizado para guild {}", guild_id);
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Play {
                voice_channel,
                text_channel,
                track,
                reply,
            } => {
                let result = self.play(voice_channel, text_channel, track).await;
                let _ = reply.send(result);
            }
            SessionCommand::Pause { reply } => {
                let result = self.pause().await;
                let _ = reply.send(result);
            }
            SessionCommand::Resume { reply } => {
                let result = self.resume().await;
                let _ = reply.send(result);
            }
            SessionCommand::Skip {
                text_channel,
                reply,
            } => {
                let result = self.skip(text_channel).await;
                let _ = reply.send(result);
            }
            SessionCommand::Stop {
                text_channel,
                reply,
            } => {
                let result = self.stop(text_channel).await;
                let _ = reply.send(result);
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(Ok(self.status().await));
            }
            SessionCommand::Completed { generation, error } => {
                self.on_completion(generation, error).await;
            }
            SessionCommand::TransportDisconnected => self.transport_lost().await,
        }
    }

    // Comandos

    async fn play(
        &mut self,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        track: TrackDescriptor,
    ) -> Result<PlayOutcome, PlaybackError> {
        self.session.set_announcement_target(text_channel);

        match self.session.state() {
            SessionState::Disconnected => self.connect(voice_channel).await?,
            _ if self.session.voice_channel() != Some(voice_channel) => {
                self.follow(voice_channel).await?
            }
            _ => {}
        }

        let start_now =
            self.session.state() == SessionState::Idle && self.session.queue().is_empty();
        let resume_backlog = self.session.state() == SessionState::Idle;
        let position = self.session.enqueue(track.clone())?;
        info!(
            "➕ Guild {}: '{}' en posición {}",
            self.session.guild_id(),
            track.title(),
            position
        );

        if resume_backlog {
            self.advance_or_recover().await;
            // Solo este track estaba en cola: si algo suena, es él
            if start_now && self.session.state() == SessionState::Playing {
                return Ok(PlayOutcome::Started(track));
            }
        }

        Ok(PlayOutcome::Queued { track, position })
    }

    async fn pause(&mut self) -> Result<(), PlaybackError> {
        self.session.ensure_active()?;
        if self.session.state() == SessionState::Paused {
            return Ok(());
        }

        let handle = self.session.ensure_connected()?.clone();
        if let Err(e) = self.transport.pause(&handle).await {
            return Err(self.transport_failed(e).await);
        }
        self.session.pause()?;
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), PlaybackError> {
        self.session.ensure_active()?;
        if self.session.state() == SessionState::Playing {
            return Ok(());
        }

        let handle = self.session.ensure_connected()?.clone();
        if let Err(e) = self.transport.resume(&handle).await {
            return Err(self.transport_failed(e).await);
        }
        self.session.resume()?;
        Ok(())
    }

    async fn skip(&mut self, text_channel: ChannelId) -> Result<TrackDescriptor, PlaybackError> {
        self.session.set_announcement_target(text_channel);
        self.session.ensure_active()?;

        if self.session.queue().is_empty() && !self.policy.skip_on_empty_queue {
            return Err(PlaybackError::QueueEmpty);
        }

        let skipped = self
            .session
            .current_track()
            .cloned()
            .ok_or(PlaybackError::NothingPlaying)?;
        let handle = self.session.ensure_connected()?.clone();

        // El avance llega por la notificación de fin del transporte
        if let Err(e) = self.transport.stop(&handle).await {
            return Err(self.transport_failed(e).await);
        }

        info!(
            "⏭️ Guild {}: saltando '{}'",
            self.session.guild_id(),
            skipped.title()
        );
        Ok(skipped)
    }

    async fn stop(&mut self, text_channel: ChannelId) -> Result<(), PlaybackError> {
        self.session.set_announcement_target(text_channel);
        if !self.session.state().is_connected() {
            return Err(PlaybackError::NoActiveSession);
        }

        self.leave().await;
        Ok(())
    }

    async fn status(&self) -> SessionStatus {
        let (transport_playing, transport_paused) = match self.session.voice_handle() {
            Some(handle) => (
                self.transport.is_playing(handle).await,
                self.transport.is_paused(handle).await,
            ),
            None => (false, false),
        };

        SessionStatus {
            state: self.session.state(),
            current_track: self.session.current_track().cloned(),
            queued: self.session.queue().iter().cloned().collect(),
            generation: self.session.generation(),
            transport_playing,
            transport_paused,
        }
    }

    // Transporte

    async fn connect(&mut self, channel_id: ChannelId) -> Result<(), PlaybackError> {
        let guild_id = self.session.guild_id();
        self.session.begin_connect();

        let attempt = tokio::time::timeout(
            self.policy.connect_timeout,
            self.transport.connect(guild_id, channel_id),
        )
        .await;

        match attempt {
            Ok(Ok(handle)) => {
                info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
                self.session.connected(handle, channel_id);
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Error al conectar en guild {}: {}", guild_id, e);
                self.session.connect_failed();
                Err(match e {
                    PlaybackError::ConnectFailure(_) => e,
                    other => PlaybackError::ConnectFailure(other.to_string()),
                })
            }
            Err(_) => {
                warn!("⏰ Timeout conectando en guild {}", guild_id);
                self.session.connect_failed();
                Err(PlaybackError::ConnectFailure(format!(
                    "timed out after {}",
                    humantime::format_duration(self.policy.connect_timeout)
                )))
            }
        }
    }

    /// Mueve el enlace de voz al canal del usuario.
    async fn follow(&mut self, channel_id: ChannelId) -> Result<(), PlaybackError> {
        let handle = self.session.ensure_connected()?.clone();
        self.transport
            .move_to(&handle, channel_id)
            .await
            .map_err(|e| PlaybackError::ConnectFailure(e.to_string()))?;

        info!(
            "🚚 Guild {}: movido al canal {}",
            self.session.guild_id(),
            channel_id
        );
        self.session.moved(channel_id);
        Ok(())
    }

    async fn leave(&mut self) {
        if let Some(handle) = self.session.disconnect() {
            if let Err(e) = self.transport.disconnect(&handle).await {
                warn!(
                    "Error al desconectar en guild {}: {}",
                    self.session.guild_id(),
                    e
                );
            }
            info!("👋 Desconectado en guild {}", self.session.guild_id());
        }
    }

    async fn transport_lost(&mut self) {
        let Some(handle) = self.session.voice_handle().cloned() else {
            return;
        };

        // Un aviso atrasado de una conexión anterior no afecta a la actual
        if self.transport.is_connected(&handle).await {
            debug!(
                "Guild {}: aviso de desconexión obsoleto, el enlace sigue activo",
                self.session.guild_id()
            );
            return;
        }

        warn!(
            "🔌 Conexión de voz perdida en guild {}, reiniciando sesión",
            self.session.guild_id()
        );
        // El transporte ya no existe: no hay nada que cerrar
        let _ = self.session.disconnect();
    }

    async fn transport_failed(&mut self, e: PlaybackError) -> PlaybackError {
        if e.is_transport_fatal() {
            self.recover(true).await;
        }
        e
    }

    // Avance

    async fn on_completion(&mut self, generation: u64, error: Option<String>) {
        if !self.session.is_current(generation) || !self.session.state().is_active() {
            debug!(
                "🗑️ Guild {}: notificación obsoleta gen {} (actual {}), descartada",
                self.session.guild_id(),
                generation,
                self.session.generation()
            );
            return;
        }

        if let Some(reason) = error {
            let title = self
                .session
                .current_track()
                .map(|t| t.title().to_string())
                .unwrap_or_default();
            warn!(
                "❌ Guild {}: error en '{}' a mitad de reproducción: {}",
                self.session.guild_id(),
                title,
                reason
            );
            self.announce(format!("Playback error on {}: {}", title, reason));
        }

        self.advance_or_recover().await;
    }

    async fn advance_or_recover(&mut self) {
        if let Err(e) = self.advance().await {
            error!(
                "Error avanzando la cola en guild {}: {}",
                self.session.guild_id(),
                e
            );
            self.recover(e.is_transport_fatal()).await;
        }
    }

    /// Arranca el siguiente track reproducible, saltando fuentes que no abren
    /// hasta el límite configurado, o deja la sesión en reposo si la cola se
    /// vació.
    async fn advance(&mut self) -> Result<(), PlaybackError> {
        let mut failures = 0u32;

        loop {
            let Some(track) = self.session.dequeue_next() else {
                self.announce(QUEUE_EMPTY_NOTICE.to_string());
                self.settle().await;
                return Ok(());
            };

            let handle = self.session.ensure_connected()?.clone();
            let generation = self.session.bump_generation();
            let notifier = self.notifier(generation).ok_or_else(|| {
                PlaybackError::TransportError("session is shutting down".to_string())
            })?;

            match self
                .transport
                .play(&handle, track.source_url(), notifier)
                .await
            {
                Ok(()) => {
                    info!(
                        "🎵 Guild {}: reproduciendo '{}' (gen {})",
                        self.session.guild_id(),
                        track.title(),
                        generation
                    );
                    self.announce(format!("Now Playing: {}", track.title()));
                    self.session.start_track(track);
                    return Ok(());
                }
                Err(PlaybackError::PlaybackOpenFailure(reason)) => {
                    failures += 1;
                    warn!(
                        "⏭️ Guild {}: no se pudo abrir '{}' ({}), fallo {}/{}",
                        self.session.guild_id(),
                        track.title(),
                        reason,
                        failures,
                        self.policy.max_auto_skips
                    );
                    self.announce(format!("Couldn't play {}: {}", track.title(), reason));

                    if failures >= self.policy.max_auto_skips {
                        error!(
                            "🚨 Guild {}: {} fallos seguidos, deteniendo reproducción",
                            self.session.guild_id(),
                            failures
                        );
                        self.announce(format!(
                            "Stopped after {} tracks in a row failed to play.",
                            failures
                        ));
                        self.settle().await;
                        return Ok(());
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Ya no suena nada: Idle, o Disconnected con auto-leave.
    async fn settle(&mut self) {
        self.session.bump_generation();
        self.session.go_idle();
        if self.policy.auto_leave {
            self.leave().await;
        }
    }

    /// Devuelve a un estado usable una sesión que sufrió un fallo inesperado.
    async fn recover(&mut self, transport_unusable: bool) {
        if transport_unusable || self.session.voice_handle().is_none() {
            self.leave().await;
            return;
        }

        self.session.bump_generation();
        if let Some(handle) = self.session.voice_handle().cloned() {
            if let Err(e) = self.transport.stop(&handle).await {
                warn!("No se pudo detener el track tras el fallo: {}", e);
            }
        }
        self.session.go_idle();
    }

    fn notifier(&self, generation: u64) -> Option<CompletionNotifier> {
        self.tx
            .upgrade()
            .map(|tx| CompletionNotifier::new(self.session.guild_id(), generation, tx))
    }

    fn announce(&self, text: String) {
        match self.session.announcement_target() {
            Some(target) => self.announcer.send(target, text),
            None => debug!("Sin canal de anuncios: {}", text),
        }
    }
}
