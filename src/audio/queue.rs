use std::collections::VecDeque;
use tracing::{debug, info};

use crate::{error::PlaybackError, sources::TrackDescriptor};

/// Cola FIFO de tracks resueltos, propiedad exclusiva de una sesión.
///
/// Usa un [`VecDeque`]: ambos extremos son O(1). Los duplicados se conservan.
#[derive(Debug, Clone)]
pub struct TrackQueue {
    items: VecDeque<TrackDescriptor>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final. Devuelve la posición (1 = siguiente).
    pub fn enqueue(&mut self, track: TrackDescriptor) -> Result<usize, PlaybackError> {
        if self.items.len() >= self.max_size {
            return Err(PlaybackError::QueueFull { max: self.max_size });
        }

        debug!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);

        Ok(self.items.len())
    }

    /// Obtiene el siguiente track (FIFO - First In, First Out)
    pub fn dequeue_front(&mut self) -> Option<TrackDescriptor> {
        let next = self.items.pop_front();
        if let Some(ref track) = next {
            debug!("➡️ Siguiente en cola (FIFO): {}", track.title());
        }
        next
    }

    /// Limpia la cola. Devuelve cuántos tracks se descartaron.
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        if cleared > 0 {
            info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        }
        cleared
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackDescriptor> {
        self.items.iter()
    }
}
