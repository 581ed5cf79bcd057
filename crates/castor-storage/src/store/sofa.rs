//! Sofa and view management.
//!
//! Every view except the base store is backed by one Sofa record. Sofas
//! live in the base store and are indexed there; their Sofa number doubles
//! as the id of the view they back.
//!
//! ```text
//!   views[0]  base store     no Sofa, holds the Sofa index
//!   views[1]  _InitialView   Sofa 1, created on first use
//!   views[n]  named view     Sofa n, created by create_view
//! ```

use castor_common::{CasError, FeatureCode, FsRef, Result, TypeCode};
use tracing::debug;

use super::{Cas, ViewId, ViewState, DEFAULT_LANGUAGE, INITIAL_VIEW_NAME, TEXT_MIME_TYPE};

impl Cas {
    // =========================================================================
    // Sofas
    // =========================================================================

    /// Returns the initial view's Sofa, creating it if needed.
    pub fn get_or_create_initial_sofa(&mut self) -> Result<FsRef> {
        let sofa = self.views[ViewId::INITIAL.index()].sofa;
        if !sofa.is_null() {
            return Ok(sofa);
        }
        self.create_sofa(ViewId::INITIAL.0, INITIAL_VIEW_NAME)
    }

    /// Returns the Sofa of `view`, creating the initial view's on demand.
    pub(crate) fn ensure_view_sofa(&mut self, view: ViewId) -> Result<FsRef> {
        if view == ViewId::INITIAL {
            return self.get_or_create_initial_sofa();
        }
        let sofa = self.view_state(view)?.sofa;
        if sofa.is_null() {
            return Err(CasError::BaseStoreOperation("view sofa".to_string()));
        }
        Ok(sofa)
    }

    fn create_sofa(&mut self, num: u32, name: &str) -> Result<FsRef> {
        if self.sofa_names.contains_key(name) {
            return Err(CasError::DuplicateSofaName(name.to_string()));
        }
        let sofa = self.ll_create_fs(ViewId::BASE, TypeCode::SOFA)?;
        self.ll_set_int_value(sofa, FeatureCode::SOFA_NUM, num as i32);
        self.ll_set_string_value(sofa, FeatureCode::SOFA_ID, Some(name));
        self.ll_add_fs_to_indexes(ViewId::BASE, sofa);
        self.register_sofa(sofa)?;
        debug!(sofa = %sofa, num, name, "sofa created");
        Ok(sofa)
    }

    /// Attaches an existing Sofa record to the view its number names,
    /// creating the view slot if needed.
    pub fn register_sofa(&mut self, sofa: FsRef) -> Result<ViewId> {
        if self.check_fs(sofa)? != TypeCode::SOFA {
            return Err(CasError::SofaRefNotFound(sofa.0));
        }
        let num = self.ll_get_int_value(sofa, FeatureCode::SOFA_NUM);
        if num < 1 {
            return Err(CasError::SofaRefNotFound(sofa.0));
        }
        let name = self
            .ll_get_string_value(sofa, FeatureCode::SOFA_ID)
            .ok_or(CasError::SofaRefNotFound(sofa.0))?;
        let view = ViewId(num as u32);
        self.ensure_view_slot(view);
        self.views[view.index()].sofa = sofa;
        self.sofa_names.insert(name, sofa);
        self.view_count = self.view_count.max(view.0);
        Ok(view)
    }

    pub(crate) fn ensure_view_slot(&mut self, view: ViewId) {
        while self.views.len() <= view.index() {
            self.views.push(ViewState::new(&self.defs));
        }
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Creates a view backed by a new Sofa named `name`.
    pub fn create_view(&mut self, name: &str) -> Result<ViewId> {
        if self.sofa_names.contains_key(name) {
            return Err(CasError::DuplicateSofaName(name.to_string()));
        }
        if name == INITIAL_VIEW_NAME {
            self.get_or_create_initial_sofa()?;
            return Ok(ViewId::INITIAL);
        }
        let num = self.view_count + 1;
        self.create_sofa(num, name)?;
        debug!(view = num, name, "view created");
        Ok(ViewId(num))
    }

    /// Returns the view backed by the Sofa named `name`.
    ///
    /// The initial view is always found, whether or not its Sofa exists yet.
    pub fn get_view(&self, name: &str) -> Result<ViewId> {
        if name == INITIAL_VIEW_NAME {
            return Ok(ViewId::INITIAL);
        }
        match self.sofa_names.get(name) {
            Some(sofa) => self.get_view_for_sofa(*sofa),
            None => Err(CasError::SofaNotFound(name.to_string())),
        }
    }

    /// Returns the view backed by `sofa`.
    pub fn get_view_for_sofa(&self, sofa: FsRef) -> Result<ViewId> {
        if self.check_fs(sofa)? != TypeCode::SOFA {
            return Err(CasError::SofaRefNotFound(sofa.0));
        }
        let view = ViewId(self.ll_get_int_value(sofa, FeatureCode::SOFA_NUM) as u32);
        match self.views.get(view.index()) {
            Some(state) if state.sofa == sofa => Ok(view),
            _ => Err(CasError::SofaRefNotFound(sofa.0)),
        }
    }

    /// Returns the Sofa of `view`, NULL while unset.
    pub fn view_sofa(&self, view: ViewId) -> Result<FsRef> {
        Ok(self.view_state(view)?.sofa)
    }

    /// Returns the Sofa name of `view`. The base store has none.
    pub fn view_name(&self, view: ViewId) -> Result<Option<String>> {
        let sofa = self.view_state(view)?.sofa;
        if sofa.is_null() {
            return Ok((view == ViewId::INITIAL).then(|| INITIAL_VIEW_NAME.to_string()));
        }
        Ok(self.ll_get_string_value(sofa, FeatureCode::SOFA_ID))
    }

    /// Returns every view that has a Sofa, in Sofa number order.
    pub fn views(&self) -> Vec<ViewId> {
        self.views
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, state)| !state.sofa.is_null())
            .map(|(i, _)| ViewId(i as u32))
            .collect()
    }

    /// Returns the views named `prefix` or nested under it, such as
    /// `prefix.part`, in Sofa number order.
    pub fn views_with_prefix(&self, prefix: &str) -> Vec<ViewId> {
        self.views()
            .into_iter()
            .filter(|view| match self.view_name(*view) {
                Ok(Some(name)) => {
                    name == prefix
                        || name
                            .strip_prefix(prefix)
                            .is_some_and(|rest| rest.starts_with('.'))
                }
                _ => false,
            })
            .collect()
    }

    /// Returns every Sofa in the base store's Sofa index.
    pub fn sofas(&self) -> Vec<FsRef> {
        self.views[ViewId::BASE.index()]
            .repo
            .all_indexed(&self.ts, &self.heaps, TypeCode::SOFA)
    }

    // =========================================================================
    // Sofa data
    // =========================================================================

    /// Returns the Sofa of a non-base view, failing if any data is attached.
    fn sofa_for_data(&mut self, view: ViewId, operation: &str) -> Result<FsRef> {
        if view.is_base() {
            return Err(CasError::BaseStoreOperation(operation.to_string()));
        }
        self.view_state(view)?;
        let sofa = self.ensure_view_sofa(view)?;
        let attached = [
            FeatureCode::SOFA_STRING,
            FeatureCode::SOFA_ARRAY,
            FeatureCode::SOFA_URI,
        ]
        .iter()
        .any(|f| self.ll_get_feature_cell(sofa, *f) != 0);
        if attached {
            let name = self
                .ll_get_string_value(sofa, FeatureCode::SOFA_ID)
                .unwrap_or_default();
            return Err(CasError::SofaDataAlreadySet(name));
        }
        Ok(sofa)
    }

    /// Attaches text to the Sofa of `view`.
    pub fn set_sofa_data_string(&mut self, view: ViewId, text: &str, mime: &str) -> Result<()> {
        let sofa = self.sofa_for_data(view, "set_sofa_data_string")?;
        self.ll_set_string_value(sofa, FeatureCode::SOFA_STRING, Some(text));
        self.ll_set_string_value(sofa, FeatureCode::SOFA_MIME, Some(mime));
        Ok(())
    }

    /// Attaches an array record to the Sofa of `view`.
    pub fn set_sofa_data_array(&mut self, view: ViewId, array: FsRef, mime: &str) -> Result<()> {
        let t = self.check_fs(array)?;
        if !self.ts.type_class(t).is_array() {
            return Err(CasError::TypeMismatch {
                expected: self.ts.type_name(TypeCode::ARRAY_BASE).to_string(),
                actual: self.ts.type_name(t).to_string(),
            });
        }
        let sofa = self.sofa_for_data(view, "set_sofa_data_array")?;
        self.ll_set_ref_value(sofa, FeatureCode::SOFA_ARRAY, array);
        self.ll_set_string_value(sofa, FeatureCode::SOFA_MIME, Some(mime));
        Ok(())
    }

    /// Attaches a URI to the Sofa of `view`.
    pub fn set_sofa_data_uri(&mut self, view: ViewId, uri: &str, mime: &str) -> Result<()> {
        let sofa = self.sofa_for_data(view, "set_sofa_data_uri")?;
        self.ll_set_string_value(sofa, FeatureCode::SOFA_URI, Some(uri));
        self.ll_set_string_value(sofa, FeatureCode::SOFA_MIME, Some(mime));
        Ok(())
    }

    fn sofa_string_feature(&self, view: ViewId, f: FeatureCode) -> Result<Option<String>> {
        let sofa = self.view_state(view)?.sofa;
        if sofa.is_null() {
            return Ok(None);
        }
        Ok(self.ll_get_string_value(sofa, f))
    }

    /// Returns the Sofa text of `view`, if any.
    pub fn sofa_data_string(&self, view: ViewId) -> Result<Option<String>> {
        self.sofa_string_feature(view, FeatureCode::SOFA_STRING)
    }

    /// Returns the Sofa URI of `view`, if any.
    pub fn sofa_data_uri(&self, view: ViewId) -> Result<Option<String>> {
        self.sofa_string_feature(view, FeatureCode::SOFA_URI)
    }

    /// Returns the Sofa mime type of `view`, if any.
    pub fn sofa_mime_type(&self, view: ViewId) -> Result<Option<String>> {
        self.sofa_string_feature(view, FeatureCode::SOFA_MIME)
    }

    /// Returns the Sofa array of `view`, NULL if none.
    pub fn sofa_data_array(&self, view: ViewId) -> Result<FsRef> {
        let sofa = self.view_state(view)?.sofa;
        if sofa.is_null() {
            return Ok(FsRef::NULL);
        }
        Ok(self.ll_get_ref_value(sofa, FeatureCode::SOFA_ARRAY))
    }

    // =========================================================================
    // Document
    // =========================================================================

    /// Sets the text of `view` and replaces its document annotation with one
    /// spanning the whole text. The language of a replaced annotation is
    /// kept.
    pub fn set_document_text(&mut self, view: ViewId, text: &str) -> Result<()> {
        self.set_sofa_data_string(view, text, TEXT_MIME_TYPE)?;
        let len = text.encode_utf16().count() as i32;

        let stale = self.all_indexed_fs(view, TypeCode::DOCUMENT_ANNOTATION)?;
        let language = stale
            .first()
            .and_then(|d| self.ll_get_string_value(*d, FeatureCode::LANGUAGE));
        for doc in stale {
            self.remove_fs_from_indexes(view, doc)?;
        }
        let doc = self.create_document_annotation(view, len)?;
        if let Some(language) = language {
            self.ll_set_string_value(doc, FeatureCode::LANGUAGE, Some(&language));
        }
        Ok(())
    }

    fn create_document_annotation(&mut self, view: ViewId, len: i32) -> Result<FsRef> {
        let doc = self.create_annotation(view, TypeCode::DOCUMENT_ANNOTATION, 0, len)?;
        self.ll_set_string_value(doc, FeatureCode::LANGUAGE, Some(DEFAULT_LANGUAGE));
        self.ll_add_fs_to_indexes(view, doc);
        Ok(doc)
    }

    /// Returns the document text of `view`.
    pub fn document_text(&self, view: ViewId) -> Result<Option<String>> {
        if view.is_base() {
            return Err(CasError::BaseStoreOperation("document_text".to_string()));
        }
        self.sofa_data_string(view)
    }

    /// Returns the indexed document annotation of `view`, if any.
    pub fn document_annotation(&self, view: ViewId) -> Result<Option<FsRef>> {
        if view.is_base() {
            return Err(CasError::BaseStoreOperation(
                "document_annotation".to_string(),
            ));
        }
        Ok(self
            .all_indexed_fs(view, TypeCode::DOCUMENT_ANNOTATION)?
            .first()
            .copied())
    }

    /// Sets the document language of `view`, creating a document annotation
    /// over the current text if none is indexed.
    pub fn set_document_language(&mut self, view: ViewId, language: &str) -> Result<()> {
        let doc = match self.document_annotation(view)? {
            Some(doc) => doc,
            None => {
                let len = self
                    .document_text(view)?
                    .map(|t| t.encode_utf16().count() as i32)
                    .unwrap_or(0);
                self.create_document_annotation(view, len)?
            }
        };
        self.ll_set_string_value(doc, FeatureCode::LANGUAGE, Some(language));
        Ok(())
    }

    /// Returns the document language of `view`.
    pub fn document_language(&self, view: ViewId) -> Result<String> {
        let language = self
            .document_annotation(view)?
            .and_then(|doc| self.ll_get_string_value(doc, FeatureCode::LANGUAGE));
        Ok(language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::test_cas;
    use castor_common::ErrorKind;

    #[test]
    fn test_initial_sofa_lazy() {
        let mut cas = test_cas();
        assert!(cas.view_sofa(ViewId::INITIAL).unwrap().is_null());
        assert!(cas.views().is_empty());
        let sofa = cas.get_or_create_initial_sofa().unwrap();
        assert_eq!(cas.get_or_create_initial_sofa().unwrap(), sofa);
        assert_eq!(cas.view_sofa(ViewId::INITIAL).unwrap(), sofa);
        assert_eq!(cas.get_int_value(sofa, FeatureCode::SOFA_NUM).unwrap(), 1);
        assert_eq!(
            cas.view_name(ViewId::INITIAL).unwrap().as_deref(),
            Some(INITIAL_VIEW_NAME)
        );
        assert_eq!(cas.sofas(), vec![sofa]);
    }

    #[test]
    fn test_create_view_numbers() {
        let mut cas = test_cas();
        let en = cas.create_view("en").unwrap();
        let de = cas.create_view("de").unwrap();
        assert_eq!(en, ViewId(2));
        assert_eq!(de, ViewId(3));
        assert_eq!(cas.view_count(), 3);
        assert_eq!(cas.get_view("de").unwrap(), de);
        assert_eq!(cas.get_view(INITIAL_VIEW_NAME).unwrap(), ViewId::INITIAL);
        assert_eq!(cas.views(), vec![en, de]);

        let sofa = cas.view_sofa(en).unwrap();
        assert_eq!(cas.get_view_for_sofa(sofa).unwrap(), en);
        assert_eq!(cas.view_name(en).unwrap().as_deref(), Some("en"));
    }

    #[test]
    fn test_views_with_prefix() {
        let mut cas = test_cas();
        let en = cas.create_view("en").unwrap();
        let nested = cas.create_view("en.x").unwrap();
        cas.create_view("enx").unwrap();
        cas.create_view("de").unwrap();
        assert_eq!(cas.views_with_prefix("en"), vec![en, nested]);
        assert_eq!(cas.views_with_prefix("en.x"), vec![nested]);
        assert!(cas.views_with_prefix("fr").is_empty());

        assert!(cas.views_with_prefix(INITIAL_VIEW_NAME).is_empty());
        cas.get_or_create_initial_sofa().unwrap();
        assert_eq!(cas.views_with_prefix(INITIAL_VIEW_NAME), vec![ViewId::INITIAL]);
    }

    #[test]
    fn test_duplicate_and_missing_names() {
        let mut cas = test_cas();
        cas.create_view("en").unwrap();
        let err = cas.create_view("en").unwrap_err();
        assert!(matches!(err, CasError::DuplicateSofaName(_)));
        assert_eq!(err.kind(), ErrorKind::Naming);
        assert!(matches!(
            cas.get_view("fr"),
            Err(CasError::SofaNotFound(_))
        ));

        cas.get_or_create_initial_sofa().unwrap();
        assert!(matches!(
            cas.create_view(INITIAL_VIEW_NAME),
            Err(CasError::DuplicateSofaName(_))
        ));
    }

    #[test]
    fn test_sofa_data_set_once() {
        let mut cas = test_cas();
        cas.set_sofa_data_uri(ViewId::INITIAL, "file:///a.txt", "text/plain")
            .unwrap();
        assert_eq!(
            cas.sofa_data_uri(ViewId::INITIAL).unwrap().as_deref(),
            Some("file:///a.txt")
        );
        assert!(matches!(
            cas.set_sofa_data_string(ViewId::INITIAL, "x", "text"),
            Err(CasError::SofaDataAlreadySet(_))
        ));
        assert!(matches!(
            cas.set_document_text(ViewId::INITIAL, "x"),
            Err(CasError::SofaDataAlreadySet(_))
        ));

        let v = cas.create_view("audio").unwrap();
        let data = cas.create_array(TypeCode::BYTE_ARRAY, 16).unwrap();
        cas.set_sofa_data_array(v, data, "audio/raw").unwrap();
        assert_eq!(cas.sofa_data_array(v).unwrap(), data);
        assert_eq!(
            cas.sofa_mime_type(v).unwrap().as_deref(),
            Some("audio/raw")
        );
    }

    #[test]
    fn test_base_store_level_errors() {
        let mut cas = test_cas();
        let err = cas.set_document_text(ViewId::BASE, "x").unwrap_err();
        assert!(matches!(err, CasError::BaseStoreOperation(_)));
        assert_eq!(err.kind(), ErrorKind::Level);
        assert!(cas.document_text(ViewId::BASE).is_err());
        assert!(matches!(
            cas.set_document_text(ViewId(9), "x"),
            Err(CasError::InvalidView(9))
        ));
    }

    #[test]
    fn test_document_annotation_spans_text() {
        let mut cas = test_cas();
        cas.set_document_language(ViewId::INITIAL, "en").unwrap();
        cas.set_document_text(ViewId::INITIAL, "ab cd").unwrap();

        let docs = cas
            .all_indexed_fs(ViewId::INITIAL, TypeCode::DOCUMENT_ANNOTATION)
            .unwrap();
        assert_eq!(docs.len(), 1);
        let doc = docs[0];
        assert_eq!(cas.get_int_value(doc, FeatureCode::BEGIN).unwrap(), 0);
        assert_eq!(cas.get_int_value(doc, FeatureCode::END).unwrap(), 5);
        assert_eq!(cas.document_language(ViewId::INITIAL).unwrap(), "en");
        assert_eq!(
            cas.document_text(ViewId::INITIAL).unwrap().as_deref(),
            Some("ab cd")
        );
    }

    #[test]
    fn test_document_language_default() {
        let mut cas = test_cas();
        let v = cas.create_view("v").unwrap();
        assert_eq!(cas.document_language(v).unwrap(), DEFAULT_LANGUAGE);
        cas.set_document_text(v, "héllo").unwrap();
        let doc = cas.document_annotation(v).unwrap().unwrap();
        assert_eq!(cas.get_int_value(doc, FeatureCode::END).unwrap(), 5);
        assert_eq!(cas.document_language(v).unwrap(), DEFAULT_LANGUAGE);
    }
}
