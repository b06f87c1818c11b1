//! Shared recognizer lifecycle.
//!
//! One [`Recognizer`] owns at most one live [`Engine`] (extractor plus
//! classification index). The engine is built when the first [`Handle`] is
//! acquired and dropped when the last one goes away. The reference count and
//! init/teardown share one mutex; the live engine sits behind a separate
//! reader/writer lock that recognition and training contend on.

use crate::error::FacerecError;
use crate::extractor::{ExtractError, ExtractorLoader, FaceExtractor};
use crate::index::{ClassificationIndex, LabelId};
use crate::store::LabelStore;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) struct Engine {
    pub(crate) extractor: Arc<dyn FaceExtractor>,
    pub(crate) index: ClassificationIndex,
}

impl Engine {
    fn open(loader: &dyn ExtractorLoader, store: &LabelStore) -> Result<Self, FacerecError> {
        let extractor: Arc<dyn FaceExtractor> =
            Arc::from(loader.load().map_err(FacerecError::Initialization)?);
        let records = store.load()?;
        let index = ClassificationIndex::from_records(records, extractor.distance_threshold())?;

        tracing::info!(
            store = %store.path().display(),
            samples = index.len(),
            labels = index.labels().len(),
            threshold = index.threshold(),
            "face engine initialized"
        );

        Ok(Self { extractor, index })
    }
}

struct Shared {
    store: LabelStore,
    loader: Box<dyn ExtractorLoader>,
    refs: Mutex<usize>,
    live: RwLock<Option<Engine>>,
}

impl Shared {
    fn refs(&self) -> MutexGuard<'_, usize> {
        self.refs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Engine>> {
        self.live.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Engine>> {
        self.live.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut refs = self.refs();
        *refs = refs.saturating_sub(1);
        if *refs == 0 {
            if let Some(engine) = self.write().take() {
                tracing::info!(samples = engine.index.len(), "face engine torn down");
            }
        }
    }
}

/// Entry point for acquiring the shared face engine. Cloning is cheap and
/// every clone refers to the same engine.
#[derive(Clone)]
pub struct Recognizer {
    shared: Arc<Shared>,
}

impl Recognizer {
    pub fn new(store: LabelStore, loader: impl ExtractorLoader + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                loader: Box::new(loader),
                refs: Mutex::new(0),
                live: RwLock::new(None),
            }),
        }
    }

    /// Take a reference to the engine, initializing it if no other handle
    /// is alive. On failure the count is unchanged and nothing stays loaded.
    pub fn acquire(&self) -> Result<Handle, FacerecError> {
        let mut refs = self.shared.refs();
        if *refs == 0 {
            let engine = Engine::open(self.shared.loader.as_ref(), &self.shared.store)?;
            *self.shared.write() = Some(engine);
        }
        *refs += 1;
        tracing::debug!(refs = *refs, "face engine acquired");

        Ok(Handle {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Number of live handles.
    pub fn ref_count(&self) -> usize {
        *self.shared.refs()
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.read().is_some()
    }

    pub fn store_path(&self) -> &Path {
        self.shared.store.path()
    }
}

/// Per-label sample count, in label-id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelSummary {
    pub id: LabelId,
    pub label: String,
    pub samples: usize,
}

/// A live reference to the shared engine. Dropping it releases the
/// reference; the last release tears the engine down.
pub struct Handle {
    shared: Arc<Shared>,
}

impl Handle {
    /// Explicit form of `drop(handle)`.
    pub fn release(self) {}

    /// Enrolled labels with their sample counts.
    pub fn label_summary(&self) -> Result<Vec<LabelSummary>, FacerecError> {
        self.with_engine(|engine| {
            let index = &engine.index;
            index
                .labels()
                .iter()
                .zip(index.sample_counts())
                .enumerate()
                .map(|(id, (label, samples))| LabelSummary {
                    id: LabelId(id),
                    label: label.clone(),
                    samples,
                })
                .collect()
        })
    }

    pub(crate) fn store(&self) -> &LabelStore {
        &self.shared.store
    }

    /// Clone the extractor out of the live slot so extraction can run
    /// without holding either lock.
    pub(crate) fn extractor(&self) -> Result<Arc<dyn FaceExtractor>, FacerecError> {
        self.with_engine(|engine| Arc::clone(&engine.extractor))
    }

    /// Run `f` under the read side of the live lock.
    pub(crate) fn with_engine<T>(&self, f: impl FnOnce(&Engine) -> T) -> Result<T, FacerecError> {
        let live = self.shared.read();
        let engine = live.as_ref().ok_or_else(not_initialized)?;
        Ok(f(engine))
    }

    /// Run `f` under the write side of the live lock.
    pub(crate) fn with_engine_mut<T>(
        &self,
        f: impl FnOnce(&mut Engine) -> Result<T, FacerecError>,
    ) -> Result<T, FacerecError> {
        let mut live = self.shared.write();
        let engine = live.as_mut().ok_or_else(not_initialized)?;
        f(engine)
    }
}

impl Clone for Handle {
    fn clone(&self) -> Self {
        *self.shared.refs() += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.shared.release();
    }
}

fn not_initialized() -> FacerecError {
    FacerecError::Initialization(ExtractError::NotInitialized)
}
