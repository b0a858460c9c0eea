//! Instrument Directory Service
//!
//! Loads the broker's instrument list once and answers lookups from memory.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::application::ports::{InstrumentSource, InstrumentSourceError};
use crate::domain::instruments::{Instrument, Market};

/// Instrument directory error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    /// The directory has not been loaded yet.
    #[error("instrument directory not loaded")]
    NotLoaded,
    /// No instrument matches the board and code.
    #[error("instrument {board}.{code} not found")]
    NotFound {
        /// Trading board.
        board: String,
        /// Instrument ticker.
        code: String,
    },
    /// Fetching from the source failed.
    #[error(transparent)]
    Source(#[from] InstrumentSourceError),
}

type DirectoryKey = (String, String);

/// In-memory instrument directory keyed by `(board, code)`.
pub struct InstrumentDirectory {
    source: Arc<dyn InstrumentSource>,
    entries: RwLock<Option<HashMap<DirectoryKey, Instrument>>>,
}

impl InstrumentDirectory {
    /// Create an empty directory over `source`.
    #[must_use]
    pub fn new(source: Arc<dyn InstrumentSource>) -> Self {
        Self {
            source,
            entries: RwLock::new(None),
        }
    }

    /// Fetch the instrument list and replace the cached directory.
    ///
    /// Returns the number of instruments loaded. On error the previous
    /// contents are kept.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Source`] if the source fails.
    pub async fn load(&self) -> Result<usize, DirectoryError> {
        let instruments = self.source.fetch_instruments().await?;
        let entries: HashMap<_, _> = instruments
            .into_iter()
            .map(|inst| ((inst.board.clone(), inst.code.clone()), inst))
            .collect();
        let count = entries.len();
        *self.entries.write() = Some(entries);

        tracing::info!(instruments = count, "Instrument directory loaded");
        Ok(count)
    }

    /// Check whether the directory has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.entries.read().is_some()
    }

    /// Number of cached instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().as_ref().map_or(0, HashMap::len)
    }

    /// Check whether the directory holds no instruments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an instrument by board and code.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotLoaded`] before the first successful
    /// [`load`](Self::load), or [`DirectoryError::NotFound`] if no entry
    /// matches.
    pub fn find(&self, board: &str, code: &str) -> Result<Instrument, DirectoryError> {
        let guard = self.entries.read();
        let entries = guard.as_ref().ok_or(DirectoryError::NotLoaded)?;
        entries
            .get(&(board.to_string(), code.to_string()))
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound {
                board: board.to_string(),
                code: code.to_string(),
            })
    }

    /// All instruments on an exchange segment, sorted by board then code.
    #[must_use]
    pub fn by_market(&self, market: Market) -> Vec<Instrument> {
        let guard = self.entries.read();
        let mut found: Vec<Instrument> = guard
            .iter()
            .flat_map(HashMap::values)
            .filter(|inst| inst.market == Some(market))
            .cloned()
            .collect();
        found.sort_by(|a, b| (&a.board, &a.code).cmp(&(&b.board, &b.code)));
        found
    }
}
