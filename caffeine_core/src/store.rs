//! Ledger persistence behind a single-owner actor.
//!
//! [`DoseStore`] does the actual file work and remembers the last snapshot it
//! wrote or read, so saving unchanged data touches nothing. [`DoseStore::spawn`]
//! moves it onto a dedicated thread; [`StoreHandle`] is the only way to reach
//! it afterwards, and requests are served one at a time in arrival order.

use crate::{Dose, Error, Result};
use fs2::FileExt;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tokio::sync::{mpsc, oneshot};

/// What a save request ended up doing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The snapshot was written to disk
    Written,
    /// The snapshot matched the last persisted one; nothing was written
    Unchanged,
}

/// File-backed ledger store. Not shared: owned by its actor thread once spawned.
#[derive(Debug)]
pub struct DoseStore {
    path: PathBuf,
    saved: Vec<Dose>,
}

impl DoseStore {
    /// Create a store for the given ledger file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            saved: Vec::new(),
        }
    }

    /// Read the ledger file.
    ///
    /// A missing file means no prior data and yields an empty list. A file
    /// that exists but does not decode is [`Error::CorruptStore`]; the file is
    /// left alone and the remembered snapshot is not touched.
    pub fn load(&mut self) -> Result<Vec<Dose>> {
        tracing::debug!("Loading ledger from {:?}", self.path);

        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No ledger file found, starting with an empty ledger");
                self.saved = Vec::new();
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        // Acquire shared lock for reading
        file.lock_shared()?;
        let mut contents = Vec::new();
        let read = std::io::BufReader::new(&file).read_to_end(&mut contents);
        file.unlock()?;
        read?;

        let doses: Vec<Dose> =
            serde_json::from_slice(&contents).map_err(|source| Error::CorruptStore {
                path: self.path.clone(),
                source,
            })?;

        tracing::info!("Loaded {} doses from {:?}", doses.len(), self.path);
        self.saved = doses.clone();
        Ok(doses)
    }

    /// Persist `doses` unless they equal the last persisted snapshot.
    ///
    /// Atomically writes by:
    /// 1. Writing to a temp file in the same directory
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    ///
    /// On any failure the remembered snapshot is kept, so the next save retries.
    pub fn save(&mut self, doses: &[Dose]) -> Result<SaveOutcome> {
        if doses == self.saved.as_slice() {
            tracing::debug!("The dose list hasn't changed. No need to save.");
            return Ok(SaveOutcome::Unchanged);
        }

        let contents = serde_json::to_vec(doses)?;

        let parent = self.path.parent().ok_or_else(|| {
            std::io::Error::new(ErrorKind::Other, "ledger path missing parent")
        })?;
        std::fs::create_dir_all(parent)?;

        // Create unique temp file in the same directory for atomic rename
        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            writer.write_all(&contents)?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        // Atomically replace old ledger file
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        self.saved = doses.to_vec();
        tracing::info!("Saved {} doses to {:?}", doses.len(), self.path);
        Ok(SaveOutcome::Written)
    }

    /// Move the store onto its own thread and return a handle to it.
    ///
    /// The thread exits once every handle has been dropped.
    pub fn spawn(self) -> Result<StoreHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("ledger-store".into())
            .spawn(move || self.run(rx))?;
        Ok(StoreHandle { tx })
    }

    fn run(mut self, mut rx: mpsc::UnboundedReceiver<Request>) {
        while let Some(request) = rx.blocking_recv() {
            match request {
                Request::Load { reply } => {
                    // The requester may have gone away; nothing to do then
                    let _ = reply.send(self.load());
                }
                Request::Save { doses, reply } => {
                    let result = self.save(&doses);
                    if let Err(e) = &result {
                        tracing::error!("An error occurred while saving the ledger: {}", e);
                    }
                    let _ = reply.send(result);
                }
            }
        }
        tracing::debug!("Ledger store for {:?} shut down", self.path);
    }
}

enum Request {
    Load {
        reply: oneshot::Sender<Result<Vec<Dose>>>,
    },
    Save {
        doses: Vec<Dose>,
        reply: oneshot::Sender<Result<SaveOutcome>>,
    },
}

/// Async handle to a spawned [`DoseStore`]
#[derive(Clone, Debug)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<Request>,
}

impl StoreHandle {
    /// Queue a load behind any pending requests and wait for it
    pub async fn load(&self) -> Result<Vec<Dose>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Load { reply })
            .map_err(|_| Error::StoreClosed)?;
        rx.await.map_err(|_| Error::StoreClosed)?
    }

    /// Queue a save behind any pending requests and wait for it
    pub async fn save(&self, doses: Vec<Dose>) -> Result<SaveOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Save { doses, reply })
            .map_err(|_| Error::StoreClosed)?;
        rx.await.map_err(|_| Error::StoreClosed)?
    }
}
