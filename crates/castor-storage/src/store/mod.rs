//! The record store.
//!
//! A `Cas` owns the type system handle, the layout table, every heap, and
//! the state of each view. Views are addressed by `ViewId`; view 0 is the
//! base store, view 1 the initial view, and every other view's id equals
//! its Sofa number. All views share the one set of heaps.
//!
//! The public surface is split across modules:
//! - lowlevel: unchecked `ll_*` accessors, the core every other tier uses
//! - checked: validating accessors that fail before mutating
//! - sofa: Sofa and view management, document text
//! - view: per-view index operations
//! - marker: delta tracking
//! - exchange: data handed to and from the serializer

mod checked;
mod exchange;
mod lowlevel;
mod marker;
mod sofa;
mod view;

pub use exchange::{DeltaAppend, IndexedFs, IndexedFsDelta, ModifiedCells, ViewDelta};
pub use marker::Marker;

use std::collections::HashMap;
use std::sync::Arc;

use castor_common::{CasConfig, CasError, FsRef, Result, TypeCode, TypeSystem};
use tracing::{info, warn};

use crate::heap::constants::TYPE_CELL;
use crate::heap::Heaps;
use crate::index::{IndexDefinitions, IndexRepository, IndexSpec};
use crate::layout::Layout;
use marker::{IndexLog, Tracking};

/// Sofa name of the initial view.
pub const INITIAL_VIEW_NAME: &str = "_InitialView";

/// Language of a document annotation nobody has set a language on.
pub const DEFAULT_LANGUAGE: &str = "x-unspecified";

/// Mime type given to text set through `set_document_text`.
pub const TEXT_MIME_TYPE: &str = "text";

/// Handle to a view of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(pub u32);

impl ViewId {
    /// The base store, which holds the Sofa index and no annotations.
    pub const BASE: ViewId = ViewId(0);

    /// The initial view, whose Sofa is created on first use.
    pub const INITIAL: ViewId = ViewId(1);

    /// Returns true for the base store.
    pub fn is_base(&self) -> bool {
        self.0 == 0
    }

    /// Returns the id as a table index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "view:{}", self.0)
    }
}

/// Per-view state: indexes, the current Sofa, and delta bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct ViewState {
    pub(crate) repo: IndexRepository,
    /// Sofa of this view, NULL while unset.
    pub(crate) sofa: FsRef,
    pub(crate) log: IndexLog,
}

impl ViewState {
    fn new(defs: &Arc<IndexDefinitions>) -> Self {
        Self {
            repo: IndexRepository::new(Arc::clone(defs)),
            sofa: FsRef::NULL,
            log: IndexLog::default(),
        }
    }
}

/// A typed, indexed record store with views.
#[derive(Debug, Clone)]
pub struct Cas {
    ts: Arc<TypeSystem>,
    layout: Arc<Layout>,
    config: CasConfig,
    heaps: Heaps,
    defs: Arc<IndexDefinitions>,
    views: Vec<ViewState>,
    /// Sofa records by Sofa name.
    sofa_names: HashMap<String, FsRef>,
    /// Highest Sofa number handed out; the initial view always counts.
    view_count: u32,
    tracking: Option<Tracking>,
    /// Bumped on every reset so markers from before it are rejected.
    generation: u64,
}

impl Cas {
    /// Creates a store with the built-in indexes.
    pub fn new(ts: Arc<TypeSystem>, config: CasConfig) -> Result<Self> {
        Self::with_indexes(ts, config, Vec::new())
    }

    /// Creates a store with the built-in indexes plus `indexes`.
    pub fn with_indexes(
        ts: Arc<TypeSystem>,
        config: CasConfig,
        indexes: Vec<IndexSpec>,
    ) -> Result<Self> {
        if !ts.is_committed() {
            return Err(CasError::TypeSystemNotCommitted);
        }
        let layout = Arc::new(Layout::compute(&ts)?);
        let mut specs = vec![IndexSpec::annotation_index(), IndexSpec::sofa_index()];
        specs.extend(indexes);
        let defs = Arc::new(IndexDefinitions::new(&ts, &layout, specs)?);
        let views = vec![ViewState::new(&defs), ViewState::new(&defs)];
        Ok(Self {
            heaps: Heaps::new(&config),
            ts,
            layout,
            config,
            defs,
            views,
            sofa_names: HashMap::new(),
            view_count: 1,
            tracking: None,
            generation: 0,
        })
    }

    /// Returns the type system.
    pub fn type_system(&self) -> &TypeSystem {
        &self.ts
    }

    /// Returns a shared handle to the type system.
    pub fn type_system_arc(&self) -> Arc<TypeSystem> {
        Arc::clone(&self.ts)
    }

    /// Returns the layout table.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CasConfig {
        &self.config
    }

    /// Returns the heaps.
    pub fn heaps(&self) -> &Heaps {
        &self.heaps
    }

    /// Returns the heaps for direct mutation.
    ///
    /// Writes made here bypass validation and delta tracking.
    pub fn heaps_mut(&mut self) -> &mut Heaps {
        &mut self.heaps
    }

    /// Returns the index definitions shared by every view.
    pub fn index_definitions(&self) -> &IndexDefinitions {
        &self.defs
    }

    /// Returns the highest Sofa number in use. The initial view counts
    /// even before its Sofa exists.
    pub fn view_count(&self) -> u32 {
        self.view_count
    }

    /// Enables or disables reset.
    pub fn set_flush_enabled(&mut self, enabled: bool) {
        self.config.flush_enabled = enabled;
    }

    pub(crate) fn view_state(&self, view: ViewId) -> Result<&ViewState> {
        self.views
            .get(view.index())
            .ok_or(CasError::InvalidView(view.0))
    }

    /// Returns the index repository of a view.
    pub fn repository(&self, view: ViewId) -> Result<&IndexRepository> {
        Ok(&self.view_state(view)?.repo)
    }

    /// Returns the type of the record at `fs` without validation.
    #[inline]
    pub(crate) fn type_of(&self, fs: FsRef) -> TypeCode {
        TypeCode(self.heaps.heap.get(fs.addr() + TYPE_CELL) as u32)
    }

    /// Returns true if `fs` addresses a record of a known type.
    pub fn is_valid_fs(&self, fs: FsRef) -> bool {
        self.heaps.heap.is_valid_addr(fs.addr()) && self.ts.is_valid_type(self.type_of(fs))
    }

    /// Discards every record, empties every index, and unsets every Sofa.
    ///
    /// The heap is soft reset unless its capacity exceeds the configured
    /// threshold, in which case its pages are released.
    pub fn reset(&mut self) -> Result<()> {
        if !self.config.flush_enabled {
            warn!("reset rejected: flush disabled");
            return Err(CasError::FlushDisabled);
        }
        self.reset_unchecked();
        Ok(())
    }

    /// Returns an empty store sharing this one's type system, layout, index
    /// definitions, and configuration.
    ///
    /// Full blobs load into such a store, which replaces the receiver only
    /// once loading succeeds. Markers taken on this store are not valid on
    /// the new one.
    pub fn empty_like(&self) -> Self {
        Self {
            ts: Arc::clone(&self.ts),
            layout: Arc::clone(&self.layout),
            config: self.config.clone(),
            heaps: Heaps::new(&self.config),
            defs: Arc::clone(&self.defs),
            views: vec![ViewState::new(&self.defs), ViewState::new(&self.defs)],
            sofa_names: HashMap::new(),
            view_count: 1,
            tracking: None,
            generation: self.generation + 1,
        }
    }

    fn reset_unchecked(&mut self) {
        let full = self.heaps.heap.capacity() > self.config.reset_heap_threshold;
        self.views.truncate(2);
        for view in &mut self.views {
            view.repo.flush();
            view.sofa = FsRef::NULL;
            view.log.clear();
        }
        self.heaps.reset(full);
        self.sofa_names.clear();
        self.view_count = 1;
        self.tracking = None;
        self.generation += 1;
        info!(full, generation = self.generation, "store reset");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use castor_common::FeatureCode;

    pub(crate) fn test_cas() -> Cas {
        let mut ts = TypeSystem::new();
        ts.commit();
        Cas::new(Arc::new(ts), CasConfig::default().with_page_size(1000)).unwrap()
    }

    #[test]
    fn test_requires_committed_type_system() {
        let ts = TypeSystem::new();
        let err = Cas::new(Arc::new(ts), CasConfig::default()).unwrap_err();
        assert!(matches!(err, CasError::TypeSystemNotCommitted));
    }

    #[test]
    fn test_view_id_display() {
        assert_eq!(ViewId::INITIAL.to_string(), "view:1");
        assert!(ViewId::BASE.is_base());
        assert!(!ViewId::INITIAL.is_base());
    }

    #[test]
    fn test_reset_flush_disabled() {
        let mut cas = test_cas();
        cas.set_flush_enabled(false);
        assert!(matches!(cas.reset(), Err(CasError::FlushDisabled)));
        cas.set_flush_enabled(true);
        cas.reset().unwrap();
    }

    #[test]
    fn test_reset_clears_views_and_heaps() {
        let mut cas = test_cas();
        let en = cas.create_view("en").unwrap();
        cas.set_document_text(en, "hello").unwrap();
        cas.set_document_text(ViewId::INITIAL, "ab cd").unwrap();
        assert!(cas.heaps().heap.cells_used() > 1);

        cas.reset().unwrap();
        assert_eq!(cas.view_count(), 1);
        assert_eq!(cas.heaps().heap.cells_used(), 1);
        assert!(cas.repository(ViewId::INITIAL).unwrap().members().is_empty());
        assert!(cas.repository(ViewId::BASE).unwrap().members().is_empty());
        assert!(matches!(cas.get_view("en"), Err(CasError::SofaNotFound(_))));
        assert!(matches!(cas.repository(en), Err(CasError::InvalidView(2))));
        assert_eq!(cas.document_text(ViewId::INITIAL).unwrap(), None);
    }

    #[test]
    fn test_soft_reset_idempotent() {
        let mut cas = test_cas();
        let a = cas
            .create_annotation(ViewId::INITIAL, TypeCode::ANNOTATION, 0, 1)
            .unwrap();
        cas.add_fs_to_indexes(ViewId::INITIAL, a).unwrap();

        cas.reset().unwrap();
        let once = (
            cas.heaps().heap.cells_used(),
            cas.heaps().heap.capacity(),
            cas.view_count(),
        );
        cas.reset().unwrap();
        let twice = (
            cas.heaps().heap.cells_used(),
            cas.heaps().heap.capacity(),
            cas.view_count(),
        );
        assert_eq!(once, twice);
        assert!(cas.view_sofa(ViewId::INITIAL).unwrap().is_null());
        assert!(cas
            .repository(ViewId::INITIAL)
            .unwrap()
            .index("AnnotationIndex")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_full_reset_above_threshold() {
        let mut ts = TypeSystem::new();
        ts.commit();
        let mut config = CasConfig::default().with_page_size(1000);
        config.reset_heap_threshold = 1500;
        let mut cas = Cas::new(Arc::new(ts), config).unwrap();
        for _ in 0..400 {
            cas.create_fs(ViewId::INITIAL, TypeCode::ANNOTATION).unwrap();
        }
        assert!(cas.heaps().heap.capacity() > 1500);
        cas.reset().unwrap();
        assert_eq!(cas.heaps().heap.capacity(), 1000);
    }

    #[test]
    fn test_empty_like_shares_schema_only() {
        let mut cas = test_cas();
        cas.set_document_text(ViewId::INITIAL, "ab").unwrap();
        let marker = cas.create_marker().unwrap();

        let mut fresh = cas.empty_like();
        assert_eq!(fresh.heaps().heap.cells_used(), 1);
        assert_eq!(fresh.view_count(), 1);
        assert!(fresh.sofas().is_empty());
        assert_eq!(fresh.config(), cas.config());
        assert!(fresh.is_new_fs(&marker, FsRef(1)).is_err());
        fresh.set_document_text(ViewId::INITIAL, "cd").unwrap();
        assert_eq!(
            cas.document_text(ViewId::INITIAL).unwrap().as_deref(),
            Some("ab")
        );
    }

    #[test]
    fn test_new_record_is_zeroed() {
        let mut cas = test_cas();
        let fs = cas
            .create_fs(ViewId::BASE, TypeCode::TOP)
            .unwrap();
        assert_eq!(cas.ll_type(fs), TypeCode::TOP);
        let a = cas.create_fs(ViewId::INITIAL, TypeCode::ANNOTATION).unwrap();
        assert_eq!(cas.get_int_value(a, FeatureCode::BEGIN).unwrap(), 0);
        assert_eq!(cas.get_int_value(a, FeatureCode::END).unwrap(), 0);
    }
}
