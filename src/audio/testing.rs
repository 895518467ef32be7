//! In-memory doubles for the voice transport and the announcer.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashSet,
    sync::atomic::{AtomicBool, Ordering},
};

use super::transport::{Announcer, CompletionNotifier, VoiceTransport};
use crate::error::PlaybackError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(ChannelId),
    Move(ChannelId),
    Play(String),
    Pause,
    Resume,
    Stop,
    Disconnect,
}

/// Registra cada llamada. `stop` dispara el último notificador desde otro
/// hilo del sistema, como lo haría el driver de songbird.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    notifiers: Mutex<Vec<CompletionNotifier>>,
    broken_sources: Mutex<HashSet<String>>,
    panicking_sources: Mutex<HashSet<String>>,
    refuse_connect: AtomicBool,
    fail_stop: AtomicBool,
    ended_before_stop: AtomicBool,
    connected: AtomicBool,
    paused: AtomicBool,
}

impl RecordingTransport {
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn plays(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Play(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &TransportCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    /// `play` con esta URL no abre.
    pub fn break_source(&self, url: &str) {
        self.broken_sources.lock().insert(url.to_string());
    }

    /// `play` con esta URL entra en pánico.
    pub fn panic_on(&self, url: &str) {
        self.panicking_sources.lock().insert(url.to_string());
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// `stop` falla con error de transporte.
    pub fn fail_stops(&self) {
        self.fail_stop.store(true, Ordering::SeqCst);
    }

    /// `stop` encuentra la fuente ya terminada: responde Ok sin disparar el
    /// notificador, porque ya lo hizo el fin natural.
    pub fn end_tracks_before_stop(&self) {
        self.ended_before_stop.store(true, Ordering::SeqCst);
    }

    /// El enlace de voz se pierde sin `disconnect`, como una expulsión.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn notifier(&self, generation: u64) -> Option<CompletionNotifier> {
        self.notifiers
            .lock()
            .iter()
            .find(|n| n.generation() == generation)
            .cloned()
    }

    /// Fin natural de la fuente de `generation`, enviado desde otro hilo.
    /// Vuelve cuando la notificación ya está encolada.
    pub fn finish(&self, generation: u64, error: Option<&str>) {
        let notifier = self
            .notifier(generation)
            .expect("no play issued for that generation");
        let error = error.map(str::to_string);
        std::thread::spawn(move || notifier.notify(error))
            .join()
            .expect("notifier thread panicked");
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl VoiceTransport for RecordingTransport {
    type Handle = GuildId;

    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<GuildId, PlaybackError> {
        self.record(TransportCall::Connect(channel_id));
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(PlaybackError::ConnectFailure("missing permissions".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(guild_id)
    }

    async fn move_to(&self, _handle: &GuildId, channel_id: ChannelId) -> Result<(), PlaybackError> {
        self.record(TransportCall::Move(channel_id));
        Ok(())
    }

    async fn play(
        &self,
        _handle: &GuildId,
        source_url: &str,
        on_complete: CompletionNotifier,
    ) -> Result<(), PlaybackError> {
        self.record(TransportCall::Play(source_url.to_string()));

        if self.panicking_sources.lock().contains(source_url) {
            panic!("decoder exploded on {source_url}");
        }
        if self.broken_sources.lock().contains(source_url) {
            return Err(PlaybackError::PlaybackOpenFailure("404 Not Found".into()));
        }

        self.paused.store(false, Ordering::SeqCst);
        self.notifiers.lock().push(on_complete);
        Ok(())
    }

    async fn pause(&self, _handle: &GuildId) -> Result<(), PlaybackError> {
        self.record(TransportCall::Pause);
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self, _handle: &GuildId) -> Result<(), PlaybackError> {
        self.record(TransportCall::Resume);
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self, _handle: &GuildId) -> Result<(), PlaybackError> {
        self.record(TransportCall::Stop);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(PlaybackError::TransportError("driver gone".into()));
        }
        if self.ended_before_stop.load(Ordering::SeqCst) {
            return Ok(());
        }

        let latest = self.notifiers.lock().last().cloned();
        if let Some(notifier) = latest {
            std::thread::spawn(move || notifier.notify(None))
                .join()
                .expect("notifier thread panicked");
        }
        Ok(())
    }

    async fn disconnect(&self, _handle: &GuildId) -> Result<(), PlaybackError> {
        self.record(TransportCall::Disconnect);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self, _handle: &GuildId) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_playing(&self, _handle: &GuildId) -> bool {
        !self.notifiers.lock().is_empty() && !self.paused.load(Ordering::SeqCst)
    }

    async fn is_paused(&self, _handle: &GuildId) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingAnnouncer {
    messages: Mutex<Vec<(ChannelId, String)>>,
}

impl RecordingAnnouncer {
    pub fn messages(&self) -> Vec<(ChannelId, String)> {
        self.messages.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages.lock().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn count(&self, text: &str) -> usize {
        self.messages.lock().iter().filter(|(_, t)| t == text).count()
    }
}

impl Announcer for RecordingAnnouncer {
    fn send(&self, target: ChannelId, text: String) {
        self.messages.lock().push((target, text));
    }
}
