//! Server-side cursors paged across requests
//!
//! Every query is registered under a fresh id so that later requests can
//! continue reading where the previous batch stopped. Entries are never
//! evicted: an exhausted cursor stays registered and keeps answering with
//! empty batches.

use bson::Document;
use mongoose_common::{GatewayError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::backend::ResultCursor;

pub type CursorId = u64;

/// A registered cursor, locked for the duration of one batch
pub type SharedCursor = Arc<AsyncMutex<CursorEntry>>;

/// An open query result and how far it has been read
pub struct CursorEntry {
    id: CursorId,
    cursor: Box<dyn ResultCursor>,
    exhausted: bool,
    pending_error: Option<GatewayError>,
}

impl CursorEntry {
    pub fn id(&self) -> CursorId {
        self.id
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Pull up to `batch_size` documents.
    ///
    /// Returns fewer when the result set runs out, and an empty batch on
    /// every call after that. A driver error hit after some documents were
    /// read is held back and returned by the next call, so the documents
    /// already pulled off the cursor are not lost.
    pub async fn next_batch(&mut self, batch_size: usize) -> Result<Vec<Document>> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }

        let mut batch = Vec::new();

        while batch.len() < batch_size && !self.exhausted {
            match self.cursor.next_document().await {
                Ok(Some(doc)) => batch.push(doc),
                Ok(None) => self.exhausted = true,
                Err(err) if batch.is_empty() => return Err(err),
                Err(err) => {
                    self.pending_error = Some(err);
                    break;
                }
            }
        }

        Ok(batch)
    }
}

/// Process-wide map from cursor id to open cursor
pub struct CursorRegistry {
    next_id: AtomicU64,
    cursors: Mutex<HashMap<CursorId, SharedCursor>>,
}

impl CursorRegistry {
    /// Create a registry whose first id is 0
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first_id: CursorId) -> Self {
        Self {
            next_id: AtomicU64::new(first_id),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    /// Register a cursor under the next id
    pub fn open(&self, cursor: Box<dyn ResultCursor>) -> CursorId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let entry = CursorEntry {
            id,
            cursor,
            exhausted: false,
            pending_error: None,
        };
        self.cursors.lock().insert(id, Arc::new(AsyncMutex::new(entry)));

        debug!(cursor_id = id, "cursor opened");
        id
    }

    pub fn get(&self, id: CursorId) -> Result<SharedCursor> {
        self.cursors
            .lock()
            .get(&id)
            .cloned()
            .ok_or(GatewayError::CursorNotFound(id))
    }

    /// Number of registered cursors, exhausted ones included
    pub fn len(&self) -> usize {
        self.cursors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.lock().is_empty()
    }
}

impl Default for CursorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
