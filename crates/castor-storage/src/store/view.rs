//! Per-view index operations.
//!
//! Every membership change goes through here so the delta log of the view
//! stays in step with its repository.

use castor_common::{CasError, FeatureCode, FsRef, Result, TypeCode};

use super::{Cas, ViewId};

impl Cas {
    fn check_view(&self, view: ViewId) -> Result<usize> {
        if view.index() >= self.views.len() {
            return Err(CasError::InvalidView(view.0));
        }
        Ok(view.index())
    }

    /// Adds `fs` to the indexes of `view` without validation.
    pub fn ll_add_fs_to_indexes(&mut self, view: ViewId, fs: FsRef) {
        self.views[view.index()].repo.add(&self.heaps, fs);
        self.log_index_add(view, fs);
    }

    /// Removes one occurrence of `fs` from the indexes of `view` without
    /// validation. Returns true if it was indexed.
    pub fn ll_remove_fs_from_indexes(&mut self, view: ViewId, fs: FsRef) -> bool {
        let removed = self.views[view.index()].repo.remove(&self.heaps, fs);
        if removed {
            self.log_index_remove(view, fs);
        }
        removed
    }

    /// Adds `fs` to every applicable index of `view`.
    ///
    /// Annotations may only be indexed in the view whose Sofa they carry,
    /// and never in the base store.
    pub fn add_fs_to_indexes(&mut self, view: ViewId, fs: FsRef) -> Result<()> {
        self.check_view(view)?;
        let t = self.check_fs(fs)?;
        if self.ts.is_annotation_base(t) {
            if view.is_base() {
                return Err(CasError::AnnotationInBaseStore {
                    type_name: self.ts.type_name(t).to_string(),
                });
            }
            let sofa = self.ll_get_ref_value(fs, FeatureCode::SOFA_REF);
            if sofa != self.views[view.index()].sofa {
                return Err(CasError::AnnotationInWrongView {
                    fs: fs.0,
                    view: view.0,
                });
            }
        }
        self.ll_add_fs_to_indexes(view, fs);
        Ok(())
    }

    /// Removes one occurrence of `fs` from the indexes of `view`. Returns
    /// true if it was indexed.
    pub fn remove_fs_from_indexes(&mut self, view: ViewId, fs: FsRef) -> Result<bool> {
        self.check_view(view)?;
        self.check_fs(fs)?;
        Ok(self.ll_remove_fs_from_indexes(view, fs))
    }

    /// Removes every record of type `t` or a subtype from the indexes of
    /// `view`. Returns the number of records removed.
    pub fn remove_all_of_type(&mut self, view: ViewId, t: TypeCode) -> Result<usize> {
        let idx = self.check_view(view)?;
        if !self.ts.is_valid_type(t) {
            return Err(CasError::InvalidTypeCode(t.0));
        }
        let removed = self.views[idx]
            .repo
            .remove_all_of_type(&self.ts, &self.heaps, t);
        for fs in &removed {
            self.log_index_remove(view, *fs);
        }
        Ok(removed.len())
    }

    /// Returns the records of type `t` or a subtype indexed in `view`, in
    /// first-added order.
    pub fn all_indexed_fs(&self, view: ViewId, t: TypeCode) -> Result<Vec<FsRef>> {
        let idx = self.check_view(view)?;
        if !self.ts.is_valid_type(t) {
            return Err(CasError::InvalidTypeCode(t.0));
        }
        Ok(self.views[idx].repo.all_indexed(&self.ts, &self.heaps, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::test_cas;

    #[test]
    fn test_scenario_ab_cd() {
        let mut cas = test_cas();
        let v = cas.create_view("v").unwrap();
        cas.set_document_text(v, "ab cd").unwrap();
        let ab = cas.create_annotation(v, TypeCode::ANNOTATION, 0, 2).unwrap();
        let cd = cas.create_annotation(v, TypeCode::ANNOTATION, 3, 5).unwrap();
        cas.add_fs_to_indexes(v, cd).unwrap();
        cas.add_fs_to_indexes(v, ab).unwrap();

        let index = cas.repository(v).unwrap().index("AnnotationIndex").unwrap();
        let doc = cas.document_annotation(v).unwrap().unwrap();
        assert_eq!(index.entries(), &[doc, ab, cd]);
        let plain: Vec<FsRef> = index
            .entries()
            .iter()
            .copied()
            .filter(|fs| cas.ll_type(*fs) == TypeCode::ANNOTATION)
            .collect();
        assert_eq!(plain, vec![ab, cd]);
        assert_eq!(cas.get_int_value(doc, FeatureCode::END).unwrap(), 5);
    }

    #[test]
    fn test_annotation_view_checks() {
        let mut cas = test_cas();
        let en = cas.create_view("en").unwrap();
        let a = cas
            .create_annotation(ViewId::INITIAL, TypeCode::ANNOTATION, 0, 1)
            .unwrap();
        assert!(matches!(
            cas.add_fs_to_indexes(en, a),
            Err(CasError::AnnotationInWrongView { .. })
        ));
        assert!(matches!(
            cas.add_fs_to_indexes(ViewId::BASE, a),
            Err(CasError::AnnotationInBaseStore { .. })
        ));
        assert!(matches!(
            cas.add_fs_to_indexes(ViewId(7), a),
            Err(CasError::InvalidView(7))
        ));
        cas.add_fs_to_indexes(ViewId::INITIAL, a).unwrap();
        assert!(cas.repository(en).unwrap().members().is_empty());
    }

    #[test]
    fn test_remove_and_remove_all() {
        let mut cas = test_cas();
        let v = ViewId::INITIAL;
        let a = cas.create_annotation(v, TypeCode::ANNOTATION, 0, 1).unwrap();
        let b = cas.create_annotation(v, TypeCode::ANNOTATION, 1, 2).unwrap();
        let top = cas.create_fs(v, TypeCode::TOP).unwrap();
        for fs in [a, b, top] {
            cas.add_fs_to_indexes(v, fs).unwrap();
        }
        assert!(cas.remove_fs_from_indexes(v, a).unwrap());
        assert!(!cas.remove_fs_from_indexes(v, a).unwrap());
        assert_eq!(cas.all_indexed_fs(v, TypeCode::TOP).unwrap(), vec![b, top]);

        assert_eq!(cas.remove_all_of_type(v, TypeCode::ANNOTATION).unwrap(), 1);
        assert_eq!(cas.all_indexed_fs(v, TypeCode::TOP).unwrap(), vec![top]);
        assert!(cas
            .repository(v)
            .unwrap()
            .index("AnnotationIndex")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_non_annotation_in_base_store() {
        let mut cas = test_cas();
        let top = cas.create_fs(ViewId::BASE, TypeCode::TOP).unwrap();
        cas.add_fs_to_indexes(ViewId::BASE, top).unwrap();
        assert_eq!(
            cas.all_indexed_fs(ViewId::BASE, TypeCode::TOP).unwrap(),
            vec![top]
        );
    }
}
