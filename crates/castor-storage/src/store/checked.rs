//! Validating accessors.
//!
//! Every call validates the record, the feature, and the value before it
//! touches the heap, so a failed call leaves the store unchanged. The
//! writes themselves go through the unchecked core.

use castor_common::{CasError, FeatureCode, FsRef, Result, TypeClass, TypeCode};

use super::{Cas, ViewId};
use crate::heap::constants::ARRAY_CONTENT_OFFSET;

impl Cas {
    // =========================================================================
    // Validation
    // =========================================================================

    /// Returns the type of `fs`, or an error if it is not a live record.
    pub(crate) fn check_fs(&self, fs: FsRef) -> Result<TypeCode> {
        if fs.is_null() || !self.is_valid_fs(fs) {
            return Err(CasError::InvalidFsRef(fs.0));
        }
        Ok(self.type_of(fs))
    }

    /// Checks that `f` is a feature of `fs` whose values satisfy `accepts`.
    fn check_feature(
        &self,
        fs: FsRef,
        f: FeatureCode,
        requested: &str,
        accepts: fn(TypeClass) -> bool,
    ) -> Result<()> {
        let t = self.check_fs(fs)?;
        if !self.ts.is_valid_feature(f) {
            return Err(CasError::InvalidFeatureCode(f.0));
        }
        if !self.ts.is_appropriate(t, f) {
            return Err(CasError::FeatureNotAppropriate {
                feature: self.ts.feature_name(f),
                type_name: self.ts.type_name(t).to_string(),
            });
        }
        if !accepts(self.ts.range_class(f)) {
            return Err(CasError::WrongValueKind {
                feature: self.ts.feature_name(f),
                requested: requested.to_string(),
            });
        }
        Ok(())
    }

    /// Sofa features and the sofa reference are only written by the store.
    fn check_writable(&self, f: FeatureCode) -> Result<()> {
        if (FeatureCode::SOFA_NUM.0..=FeatureCode::SOFA_REF.0).contains(&f.0) {
            return Err(CasError::UnsupportedOperation(format!(
                "{} cannot be set directly",
                self.ts.feature_name(f)
            )));
        }
        Ok(())
    }

    /// Checks that `value` may be stored in reference feature `f`.
    fn check_ref_value(&self, f: FeatureCode, value: FsRef) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        let actual = self.check_fs(value)?;
        let expected = self.ts.range(f);
        if !self.ts.subsumes(expected, actual) {
            return Err(CasError::RangeMismatch {
                feature: self.ts.feature_name(f),
                expected: self.ts.type_name(expected).to_string(),
                actual: self.ts.type_name(actual).to_string(),
            });
        }
        Ok(())
    }

    /// Checks that `fs` is an array of `class`.
    fn check_array(&self, fs: FsRef, class: TypeClass) -> Result<()> {
        let t = self.check_fs(fs)?;
        if self.ts.type_class(t) != class {
            return Err(CasError::TypeMismatch {
                expected: class.to_string(),
                actual: self.ts.type_name(t).to_string(),
            });
        }
        Ok(())
    }

    /// Checks that `fs` is an array of `class` with an element at `index`.
    fn check_element(&self, fs: FsRef, class: TypeClass, index: usize) -> Result<()> {
        self.check_array(fs, class)?;
        let length = self.ll_get_array_size(fs);
        if index >= length {
            return Err(CasError::ArrayIndexOutOfBounds { index, length });
        }
        Ok(())
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Creates a record of type `t` in `view`.
    ///
    /// Arrays, primitives, and Sofas have dedicated constructors. Annotation
    /// types cannot be created in the base store.
    pub fn create_fs(&mut self, view: ViewId, t: TypeCode) -> Result<FsRef> {
        if !self.ts.is_valid_type(t) {
            return Err(CasError::InvalidTypeCode(t.0));
        }
        if !self.ts.is_creatable(t) {
            return Err(CasError::NonCreatableType {
                type_name: self.ts.type_name(t).to_string(),
            });
        }
        self.view_state(view)?;
        if view.is_base() && self.ts.is_annotation_base(t) {
            return Err(CasError::AnnotationInBaseStore {
                type_name: self.ts.type_name(t).to_string(),
            });
        }
        self.ll_create_fs(view, t)
    }

    /// Creates an array of array type `t` with `len` zeroed elements.
    ///
    /// Inline arrays must fit in one heap page. Auxiliary arrays must keep
    /// every element offset addressable by one cell.
    pub fn create_array(&mut self, t: TypeCode, len: usize) -> Result<FsRef> {
        let Some(class) = TypeClass::of_array_type(t) else {
            return Err(CasError::NonCreatableType {
                type_name: self.ts.type_name(t).to_string(),
            });
        };
        if class.is_aux_array() {
            let used = match class {
                TypeClass::ShortArray => self.heaps.shorts.len(),
                TypeClass::LongArray | TypeClass::DoubleArray => self.heaps.longs.len(),
                _ => self.heaps.bytes.len(),
            };
            let limit = (i32::MAX as usize).saturating_sub(used);
            if len > limit {
                return Err(CasError::ArrayTooLarge {
                    requested: len,
                    limit,
                });
            }
        } else {
            let page_size = self.heaps.heap.page_size();
            if len > page_size.saturating_sub(ARRAY_CONTENT_OFFSET) {
                return Err(CasError::RecordTooLarge {
                    requested: len.saturating_add(ARRAY_CONTENT_OFFSET),
                    page_size,
                });
            }
        }
        self.ll_create_array(t, len)
    }

    /// Creates an annotation of type `t` spanning `[begin, end)` in `view`.
    /// The annotation is not indexed.
    pub fn create_annotation(
        &mut self,
        view: ViewId,
        t: TypeCode,
        begin: i32,
        end: i32,
    ) -> Result<FsRef> {
        if self.ts.is_valid_type(t) && !self.ts.is_annotation(t) {
            return Err(CasError::FeatureNotAppropriate {
                feature: self.ts.feature_name(FeatureCode::BEGIN),
                type_name: self.ts.type_name(t).to_string(),
            });
        }
        let fs = self.create_fs(view, t)?;
        self.ll_set_int_value(fs, FeatureCode::BEGIN, begin);
        self.ll_set_int_value(fs, FeatureCode::END, end);
        Ok(fs)
    }

    // =========================================================================
    // Scalar features
    // =========================================================================

    pub fn get_int_value(&self, fs: FsRef, f: FeatureCode) -> Result<i32> {
        self.check_feature(fs, f, "int", |c| c == TypeClass::Int)?;
        Ok(self.ll_get_int_value(fs, f))
    }

    pub fn set_int_value(&mut self, fs: FsRef, f: FeatureCode, value: i32) -> Result<()> {
        self.check_feature(fs, f, "int", |c| c == TypeClass::Int)?;
        self.check_writable(f)?;
        self.ll_set_int_value(fs, f, value);
        Ok(())
    }

    pub fn get_float_value(&self, fs: FsRef, f: FeatureCode) -> Result<f32> {
        self.check_feature(fs, f, "float", |c| c == TypeClass::Float)?;
        Ok(self.ll_get_float_value(fs, f))
    }

    pub fn set_float_value(&mut self, fs: FsRef, f: FeatureCode, value: f32) -> Result<()> {
        self.check_feature(fs, f, "float", |c| c == TypeClass::Float)?;
        self.ll_set_float_value(fs, f, value);
        Ok(())
    }

    pub fn get_boolean_value(&self, fs: FsRef, f: FeatureCode) -> Result<bool> {
        self.check_feature(fs, f, "boolean", |c| c == TypeClass::Boolean)?;
        Ok(self.ll_get_boolean_value(fs, f))
    }

    pub fn set_boolean_value(&mut self, fs: FsRef, f: FeatureCode, value: bool) -> Result<()> {
        self.check_feature(fs, f, "boolean", |c| c == TypeClass::Boolean)?;
        self.ll_set_boolean_value(fs, f, value);
        Ok(())
    }

    pub fn get_byte_value(&self, fs: FsRef, f: FeatureCode) -> Result<i8> {
        self.check_feature(fs, f, "byte", |c| c == TypeClass::Byte)?;
        Ok(self.ll_get_byte_value(fs, f))
    }

    pub fn set_byte_value(&mut self, fs: FsRef, f: FeatureCode, value: i8) -> Result<()> {
        self.check_feature(fs, f, "byte", |c| c == TypeClass::Byte)?;
        self.ll_set_byte_value(fs, f, value);
        Ok(())
    }

    pub fn get_short_value(&self, fs: FsRef, f: FeatureCode) -> Result<i16> {
        self.check_feature(fs, f, "short", |c| c == TypeClass::Short)?;
        Ok(self.ll_get_short_value(fs, f))
    }

    pub fn set_short_value(&mut self, fs: FsRef, f: FeatureCode, value: i16) -> Result<()> {
        self.check_feature(fs, f, "short", |c| c == TypeClass::Short)?;
        self.ll_set_short_value(fs, f, value);
        Ok(())
    }

    pub fn get_long_value(&self, fs: FsRef, f: FeatureCode) -> Result<i64> {
        self.check_feature(fs, f, "long", |c| c == TypeClass::Long)?;
        Ok(self.ll_get_long_value(fs, f))
    }

    pub fn set_long_value(&mut self, fs: FsRef, f: FeatureCode, value: i64) -> Result<()> {
        self.check_feature(fs, f, "long", |c| c == TypeClass::Long)?;
        self.ll_set_long_value(fs, f, value);
        Ok(())
    }

    pub fn get_double_value(&self, fs: FsRef, f: FeatureCode) -> Result<f64> {
        self.check_feature(fs, f, "double", |c| c == TypeClass::Double)?;
        Ok(self.ll_get_double_value(fs, f))
    }

    pub fn set_double_value(&mut self, fs: FsRef, f: FeatureCode, value: f64) -> Result<()> {
        self.check_feature(fs, f, "double", |c| c == TypeClass::Double)?;
        self.ll_set_double_value(fs, f, value);
        Ok(())
    }

    pub fn get_string_value(&self, fs: FsRef, f: FeatureCode) -> Result<Option<String>> {
        self.check_feature(fs, f, "string", |c| c == TypeClass::String)?;
        Ok(self.ll_get_string_value(fs, f))
    }

    pub fn set_string_value(
        &mut self,
        fs: FsRef,
        f: FeatureCode,
        value: Option<&str>,
    ) -> Result<()> {
        self.check_feature(fs, f, "string", |c| c == TypeClass::String)?;
        self.check_writable(f)?;
        self.ll_set_string_value(fs, f, value);
        Ok(())
    }

    pub fn get_ref_value(&self, fs: FsRef, f: FeatureCode) -> Result<FsRef> {
        self.check_feature(fs, f, "reference", |c| c.is_reference())?;
        Ok(self.ll_get_ref_value(fs, f))
    }

    /// Stores a record reference. `value` must be NULL or a record whose type
    /// the feature's range subsumes.
    pub fn set_ref_value(&mut self, fs: FsRef, f: FeatureCode, value: FsRef) -> Result<()> {
        self.check_feature(fs, f, "reference", |c| c.is_reference())?;
        self.check_writable(f)?;
        self.check_ref_value(f, value)?;
        self.ll_set_ref_value(fs, f, value);
        Ok(())
    }

    /// Parses `text` according to the range of `f` and stores it.
    pub fn set_feature_value_from_string(
        &mut self,
        fs: FsRef,
        f: FeatureCode,
        text: &str,
    ) -> Result<()> {
        self.check_feature(fs, f, "primitive", |c| c.is_primitive())?;
        self.check_writable(f)?;
        let feature = self.ts.feature_name(f);
        let parse_error = || CasError::ValueParse {
            feature: feature.clone(),
            value: text.to_string(),
        };
        match self.ts.range_class(f) {
            TypeClass::Int => {
                let v = text.trim().parse().map_err(|_| parse_error())?;
                self.ll_set_int_value(fs, f, v);
            }
            TypeClass::Float => {
                let v = text.trim().parse().map_err(|_| parse_error())?;
                self.ll_set_float_value(fs, f, v);
            }
            TypeClass::Boolean => {
                let v = match text.trim() {
                    t if t.eq_ignore_ascii_case("true") => true,
                    t if t.eq_ignore_ascii_case("false") => false,
                    _ => return Err(parse_error()),
                };
                self.ll_set_boolean_value(fs, f, v);
            }
            TypeClass::Byte => {
                let v = text.trim().parse().map_err(|_| parse_error())?;
                self.ll_set_byte_value(fs, f, v);
            }
            TypeClass::Short => {
                let v = text.trim().parse().map_err(|_| parse_error())?;
                self.ll_set_short_value(fs, f, v);
            }
            TypeClass::Long => {
                let v = text.trim().parse().map_err(|_| parse_error())?;
                self.ll_set_long_value(fs, f, v);
            }
            TypeClass::Double => {
                let v = text.trim().parse().map_err(|_| parse_error())?;
                self.ll_set_double_value(fs, f, v);
            }
            _ => self.ll_set_string_value(fs, f, Some(text)),
        }
        Ok(())
    }

    /// Renders a primitive feature value as text. Returns None for a null
    /// string.
    pub fn get_feature_value_as_string(
        &self,
        fs: FsRef,
        f: FeatureCode,
    ) -> Result<Option<String>> {
        self.check_feature(fs, f, "primitive", |c| c.is_primitive())?;
        let text = match self.ts.range_class(f) {
            TypeClass::Int => self.ll_get_int_value(fs, f).to_string(),
            TypeClass::Float => self.ll_get_float_value(fs, f).to_string(),
            TypeClass::Boolean => self.ll_get_boolean_value(fs, f).to_string(),
            TypeClass::Byte => self.ll_get_byte_value(fs, f).to_string(),
            TypeClass::Short => self.ll_get_short_value(fs, f).to_string(),
            TypeClass::Long => self.ll_get_long_value(fs, f).to_string(),
            TypeClass::Double => self.ll_get_double_value(fs, f).to_string(),
            _ => return Ok(self.ll_get_string_value(fs, f)),
        };
        Ok(Some(text))
    }

    /// Copies every feature value of `source` into `target`, which must have
    /// the same type. Strings get a fresh ref to the same characters and
    /// long values a fresh long heap slot; references are copied as is.
    pub fn copy_features(&mut self, target: FsRef, source: FsRef) -> Result<()> {
        let t = self.check_fs(target)?;
        let s = self.check_fs(source)?;
        if t != s {
            return Err(CasError::TypeMismatch {
                expected: self.ts.type_name(t).to_string(),
                actual: self.ts.type_name(s).to_string(),
            });
        }
        if self.ts.type_class(t) != TypeClass::Fs {
            return Err(CasError::UnsupportedOperation(format!(
                "copy_features on {}",
                self.ts.type_name(t)
            )));
        }
        let features = self.ts.appropriate_features(t).to_vec();
        for f in features {
            let cell = self.ll_get_feature_cell(source, f);
            let value = match self.ts.range_class(f) {
                TypeClass::String => self.heaps.strings.clone_ref(cell),
                TypeClass::Long | TypeClass::Double if cell != 0 => {
                    let v = self.heaps.longs.get(cell as usize);
                    self.heaps.longs.push(v) as i32
                }
                _ => cell,
            };
            self.ll_set_feature_cell(target, f, value);
        }
        Ok(())
    }

    // =========================================================================
    // Arrays
    // =========================================================================

    /// Returns the element count of any array.
    pub fn get_array_size(&self, fs: FsRef) -> Result<usize> {
        let t = self.check_fs(fs)?;
        if !self.ts.type_class(t).is_array() {
            return Err(CasError::TypeMismatch {
                expected: self.ts.type_name(TypeCode::ARRAY_BASE).to_string(),
                actual: self.ts.type_name(t).to_string(),
            });
        }
        Ok(self.ll_get_array_size(fs))
    }

    pub fn get_int_array_value(&self, fs: FsRef, index: usize) -> Result<i32> {
        self.check_element(fs, TypeClass::IntArray, index)?;
        Ok(self.ll_get_int_array_value(fs, index))
    }

    pub fn set_int_array_value(&mut self, fs: FsRef, index: usize, value: i32) -> Result<()> {
        self.check_element(fs, TypeClass::IntArray, index)?;
        self.ll_set_int_array_value(fs, index, value);
        Ok(())
    }

    pub fn get_float_array_value(&self, fs: FsRef, index: usize) -> Result<f32> {
        self.check_element(fs, TypeClass::FloatArray, index)?;
        Ok(self.ll_get_float_array_value(fs, index))
    }

    pub fn set_float_array_value(&mut self, fs: FsRef, index: usize, value: f32) -> Result<()> {
        self.check_element(fs, TypeClass::FloatArray, index)?;
        self.ll_set_float_array_value(fs, index, value);
        Ok(())
    }

    pub fn get_string_array_value(&self, fs: FsRef, index: usize) -> Result<Option<String>> {
        self.check_element(fs, TypeClass::StringArray, index)?;
        Ok(self.ll_get_string_array_value(fs, index))
    }

    pub fn set_string_array_value(
        &mut self,
        fs: FsRef,
        index: usize,
        value: Option<&str>,
    ) -> Result<()> {
        self.check_element(fs, TypeClass::StringArray, index)?;
        self.ll_set_string_array_value(fs, index, value);
        Ok(())
    }

    pub fn get_ref_array_value(&self, fs: FsRef, index: usize) -> Result<FsRef> {
        self.check_element(fs, TypeClass::FsArray, index)?;
        Ok(self.ll_get_ref_array_value(fs, index))
    }

    pub fn set_ref_array_value(&mut self, fs: FsRef, index: usize, value: FsRef) -> Result<()> {
        self.check_element(fs, TypeClass::FsArray, index)?;
        if !value.is_null() {
            self.check_fs(value)?;
        }
        self.ll_set_ref_array_value(fs, index, value);
        Ok(())
    }

    pub fn get_boolean_array_value(&self, fs: FsRef, index: usize) -> Result<bool> {
        self.check_element(fs, TypeClass::BooleanArray, index)?;
        Ok(self.ll_get_boolean_array_value(fs, index))
    }

    pub fn set_boolean_array_value(
        &mut self,
        fs: FsRef,
        index: usize,
        value: bool,
    ) -> Result<()> {
        self.check_element(fs, TypeClass::BooleanArray, index)?;
        self.ll_set_boolean_array_value(fs, index, value);
        Ok(())
    }

    pub fn get_byte_array_value(&self, fs: FsRef, index: usize) -> Result<i8> {
        self.check_element(fs, TypeClass::ByteArray, index)?;
        Ok(self.ll_get_byte_array_value(fs, index))
    }

    pub fn set_byte_array_value(&mut self, fs: FsRef, index: usize, value: i8) -> Result<()> {
        self.check_element(fs, TypeClass::ByteArray, index)?;
        self.ll_set_byte_array_value(fs, index, value);
        Ok(())
    }

    pub fn get_short_array_value(&self, fs: FsRef, index: usize) -> Result<i16> {
        self.check_element(fs, TypeClass::ShortArray, index)?;
        Ok(self.ll_get_short_array_value(fs, index))
    }

    pub fn set_short_array_value(&mut self, fs: FsRef, index: usize, value: i16) -> Result<()> {
        self.check_element(fs, TypeClass::ShortArray, index)?;
        self.ll_set_short_array_value(fs, index, value);
        Ok(())
    }

    pub fn get_long_array_value(&self, fs: FsRef, index: usize) -> Result<i64> {
        self.check_element(fs, TypeClass::LongArray, index)?;
        Ok(self.ll_get_long_array_value(fs, index))
    }

    pub fn set_long_array_value(&mut self, fs: FsRef, index: usize, value: i64) -> Result<()> {
        self.check_element(fs, TypeClass::LongArray, index)?;
        self.ll_set_long_array_value(fs, index, value);
        Ok(())
    }

    pub fn get_double_array_value(&self, fs: FsRef, index: usize) -> Result<f64> {
        self.check_element(fs, TypeClass::DoubleArray, index)?;
        Ok(self.ll_get_double_array_value(fs, index))
    }

    pub fn set_double_array_value(&mut self, fs: FsRef, index: usize, value: f64) -> Result<()> {
        self.check_element(fs, TypeClass::DoubleArray, index)?;
        self.ll_set_double_array_value(fs, index, value);
        Ok(())
    }

    /// Checks that `[offset, offset + len)` lies inside the int array `fs`.
    fn check_int_range(&self, fs: FsRef, offset: usize, len: usize) -> Result<()> {
        self.check_array(fs, TypeClass::IntArray)?;
        let length = self.ll_get_array_size(fs);
        let end = offset.saturating_add(len);
        if end > length || offset > length {
            let index = if len == 0 { offset } else { end - 1 };
            return Err(CasError::ArrayIndexOutOfBounds { index, length });
        }
        Ok(())
    }

    /// Copies `dest.len()` elements of int array `fs`, starting at
    /// `src_offset`, into `dest`.
    pub fn copy_to_array(&self, fs: FsRef, src_offset: usize, dest: &mut [i32]) -> Result<()> {
        self.check_int_range(fs, src_offset, dest.len())?;
        self.ll_copy_to_array(fs, src_offset, dest);
        Ok(())
    }

    /// Copies `src` into int array `fs` starting at `dest_offset`.
    pub fn copy_from_array(&mut self, src: &[i32], fs: FsRef, dest_offset: usize) -> Result<()> {
        self.check_int_range(fs, dest_offset, src.len())?;
        self.ll_copy_from_array(src, fs, dest_offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::test_cas;
    use castor_common::{CasConfig, ErrorKind, TypeSystem};
    use std::sync::Arc;

    struct Fixture {
        cas: Cas,
        token: TypeCode,
        pos: FeatureCode,
        score: FeatureCode,
        flag: FeatureCode,
        big: FeatureCode,
        label: FeatureCode,
        head: FeatureCode,
    }

    fn fixture() -> Fixture {
        let mut ts = TypeSystem::new();
        let token = ts.add_type("test.Token", TypeCode::ANNOTATION).unwrap();
        let pos = ts.add_feature(token, "pos", TypeCode::INT).unwrap();
        let score = ts.add_feature(token, "score", TypeCode::FLOAT).unwrap();
        let flag = ts.add_feature(token, "flag", TypeCode::BOOLEAN).unwrap();
        let big = ts.add_feature(token, "big", TypeCode::LONG).unwrap();
        let label = ts.add_feature(token, "label", TypeCode::STRING).unwrap();
        let head = ts.add_feature(token, "head", token).unwrap();
        ts.commit();
        let cas = Cas::new(Arc::new(ts), CasConfig::default().with_page_size(1000)).unwrap();
        Fixture {
            cas,
            token,
            pos,
            score,
            flag,
            big,
            label,
            head,
        }
    }

    #[test]
    fn test_create_rejects_non_creatable() {
        let mut cas = test_cas();
        for t in [TypeCode::INT, TypeCode::INT_ARRAY, TypeCode::SOFA] {
            let err = cas.create_fs(ViewId::INITIAL, t).unwrap_err();
            assert!(matches!(err, CasError::NonCreatableType { .. }));
            assert_eq!(err.kind(), ErrorKind::Creation);
        }
        assert!(matches!(
            cas.create_fs(ViewId::INITIAL, TypeCode(999)),
            Err(CasError::InvalidTypeCode(999))
        ));
        assert!(matches!(
            cas.create_array(TypeCode::ANNOTATION, 1),
            Err(CasError::NonCreatableType { .. })
        ));
    }

    #[test]
    fn test_annotation_in_base_store_rejected() {
        let mut cas = test_cas();
        let used = cas.heaps().heap.cells_used();
        let err = cas.create_fs(ViewId::BASE, TypeCode::ANNOTATION).unwrap_err();
        assert!(matches!(err, CasError::AnnotationInBaseStore { .. }));
        assert_eq!(cas.heaps().heap.cells_used(), used);
        cas.create_fs(ViewId::BASE, TypeCode::TOP).unwrap();
    }

    #[test]
    fn test_scalar_roundtrip() {
        let mut fx = fixture();
        let cas = &mut fx.cas;
        let t = cas
            .create_annotation(ViewId::INITIAL, fx.token, 0, 3)
            .unwrap();
        cas.set_int_value(t, fx.pos, -4).unwrap();
        cas.set_float_value(t, fx.score, 1.5).unwrap();
        cas.set_boolean_value(t, fx.flag, true).unwrap();
        cas.set_long_value(t, fx.big, 1 << 40).unwrap();
        cas.set_string_value(t, fx.label, Some("NN")).unwrap();

        assert_eq!(cas.get_int_value(t, fx.pos).unwrap(), -4);
        assert_eq!(cas.get_float_value(t, fx.score).unwrap(), 1.5);
        assert!(cas.get_boolean_value(t, fx.flag).unwrap());
        assert_eq!(cas.get_long_value(t, fx.big).unwrap(), 1 << 40);
        assert_eq!(
            cas.get_string_value(t, fx.label).unwrap().as_deref(),
            Some("NN")
        );
        assert_eq!(cas.get_int_value(t, FeatureCode::END).unwrap(), 3);
    }

    #[test]
    fn test_wrong_feature_leaves_state() {
        let mut fx = fixture();
        let a = fx
            .cas
            .create_annotation(ViewId::INITIAL, TypeCode::ANNOTATION, 0, 1)
            .unwrap();
        let err = fx.cas.set_int_value(a, fx.pos, 1).unwrap_err();
        assert!(matches!(err, CasError::FeatureNotAppropriate { .. }));
        assert_eq!(err.kind(), ErrorKind::Type);

        let t = fx
            .cas
            .create_annotation(ViewId::INITIAL, fx.token, 0, 1)
            .unwrap();
        assert!(matches!(
            fx.cas.set_float_value(t, fx.pos, 1.0),
            Err(CasError::WrongValueKind { .. })
        ));
        assert_eq!(fx.cas.get_int_value(t, fx.pos).unwrap(), 0);
        assert!(matches!(
            fx.cas.get_int_value(FsRef(100_000), fx.pos),
            Err(CasError::InvalidFsRef(_))
        ));
        assert!(matches!(
            fx.cas.get_int_value(t, FeatureCode(500)),
            Err(CasError::InvalidFeatureCode(500))
        ));
    }

    #[test]
    fn test_ref_range_checked() {
        let mut fx = fixture();
        let t1 = fx
            .cas
            .create_annotation(ViewId::INITIAL, fx.token, 0, 1)
            .unwrap();
        let t2 = fx
            .cas
            .create_annotation(ViewId::INITIAL, fx.token, 1, 2)
            .unwrap();
        let plain = fx
            .cas
            .create_annotation(ViewId::INITIAL, TypeCode::ANNOTATION, 0, 1)
            .unwrap();
        fx.cas.set_ref_value(t1, fx.head, t2).unwrap();
        assert_eq!(fx.cas.get_ref_value(t1, fx.head).unwrap(), t2);

        let err = fx.cas.set_ref_value(t1, fx.head, plain).unwrap_err();
        assert!(matches!(err, CasError::RangeMismatch { .. }));
        assert_eq!(fx.cas.get_ref_value(t1, fx.head).unwrap(), t2);

        fx.cas.set_ref_value(t1, fx.head, FsRef::NULL).unwrap();
        assert!(fx.cas.get_ref_value(t1, fx.head).unwrap().is_null());
    }

    #[test]
    fn test_sofa_features_protected() {
        let mut cas = test_cas();
        let a = cas
            .create_annotation(ViewId::INITIAL, TypeCode::ANNOTATION, 0, 1)
            .unwrap();
        assert!(matches!(
            cas.set_ref_value(a, FeatureCode::SOFA_REF, FsRef::NULL),
            Err(CasError::UnsupportedOperation(_))
        ));
        let sofa = cas.view_sofa(ViewId::INITIAL).unwrap();
        assert!(matches!(
            cas.set_string_value(sofa, FeatureCode::SOFA_STRING, Some("x")),
            Err(CasError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_int_array_scenario() {
        let mut cas = test_cas();
        let arr = cas.create_array(TypeCode::INT_ARRAY, 3).unwrap();
        for (i, v) in [7, 8, 9].into_iter().enumerate() {
            cas.set_int_array_value(arr, i, v).unwrap();
        }
        let mut out = [0; 3];
        cas.copy_to_array(arr, 0, &mut out).unwrap();
        assert_eq!(out, [7, 8, 9]);

        let err = cas.get_int_array_value(arr, 3).unwrap_err();
        assert!(matches!(
            err,
            CasError::ArrayIndexOutOfBounds {
                index: 3,
                length: 3
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Bounds);
        assert!(cas.set_int_array_value(arr, 3, 1).is_err());
        let mut long = [0; 4];
        assert!(cas.copy_to_array(arr, 0, &mut long).is_err());
        assert!(cas.copy_from_array(&[1, 2], arr, 2).is_err());
        cas.copy_from_array(&[1, 2], arr, 1).unwrap();
        assert_eq!(cas.get_int_array_value(arr, 2).unwrap(), 2);
    }

    #[test]
    fn test_array_length_bounded() {
        let mut cas = test_cas();
        let used = cas.heaps().heap.cells_used();
        for t in [TypeCode::INT_ARRAY, TypeCode::FS_ARRAY] {
            let err = cas.create_array(t, usize::MAX).unwrap_err();
            assert!(matches!(err, CasError::RecordTooLarge { .. }));
            assert_eq!(err.kind(), ErrorKind::Creation);
        }
        for t in [
            TypeCode::BYTE_ARRAY,
            TypeCode::SHORT_ARRAY,
            TypeCode::LONG_ARRAY,
        ] {
            assert!(matches!(
                cas.create_array(t, usize::MAX),
                Err(CasError::ArrayTooLarge { .. })
            ));
            assert!(matches!(
                cas.create_array(t, i32::MAX as usize + 1),
                Err(CasError::ArrayTooLarge { .. })
            ));
        }
        assert_eq!(cas.heaps().heap.cells_used(), used);

        let page = cas.heaps().heap.page_size();
        let fits = cas.create_array(TypeCode::INT_ARRAY, page - 2).unwrap();
        assert_eq!(cas.get_array_size(fits).unwrap(), page - 2);
        assert!(cas.ll_create_array(TypeCode::INT_ARRAY, usize::MAX).is_err());
    }

    #[test]
    fn test_array_kind_checked() {
        let mut cas = test_cas();
        let arr = cas.create_array(TypeCode::SHORT_ARRAY, 2).unwrap();
        cas.set_short_array_value(arr, 1, -3).unwrap();
        assert_eq!(cas.get_short_array_value(arr, 1).unwrap(), -3);
        assert_eq!(cas.get_array_size(arr).unwrap(), 2);
        assert!(matches!(
            cas.get_int_array_value(arr, 0),
            Err(CasError::TypeMismatch { .. })
        ));
        let top = cas.create_fs(ViewId::BASE, TypeCode::TOP).unwrap();
        assert!(cas.get_array_size(top).is_err());
    }

    #[test]
    fn test_value_from_string() {
        let mut fx = fixture();
        let t = fx
            .cas
            .create_annotation(ViewId::INITIAL, fx.token, 0, 1)
            .unwrap();
        fx.cas.set_feature_value_from_string(t, fx.pos, "42").unwrap();
        fx.cas
            .set_feature_value_from_string(t, fx.flag, "TRUE")
            .unwrap();
        fx.cas
            .set_feature_value_from_string(t, fx.label, "VB")
            .unwrap();
        assert_eq!(fx.cas.get_int_value(t, fx.pos).unwrap(), 42);
        assert!(fx.cas.get_boolean_value(t, fx.flag).unwrap());
        assert_eq!(
            fx.cas.get_feature_value_as_string(t, fx.label).unwrap(),
            Some("VB".to_string())
        );
        assert!(matches!(
            fx.cas.set_feature_value_from_string(t, fx.pos, "x"),
            Err(CasError::ValueParse { .. })
        ));
        assert!(matches!(
            fx.cas.set_feature_value_from_string(t, fx.head, "1"),
            Err(CasError::WrongValueKind { .. })
        ));
    }

    #[test]
    fn test_copy_features_clones_strings() {
        let mut fx = fixture();
        let src = fx
            .cas
            .create_annotation(ViewId::INITIAL, fx.token, 2, 4)
            .unwrap();
        fx.cas.set_string_value(src, fx.label, Some("JJ")).unwrap();
        fx.cas.set_long_value(src, fx.big, 7).unwrap();
        let dst = fx.cas.create_fs(ViewId::INITIAL, fx.token).unwrap();
        fx.cas.copy_features(dst, src).unwrap();

        assert_eq!(fx.cas.get_int_value(dst, FeatureCode::BEGIN).unwrap(), 2);
        assert_eq!(fx.cas.get_long_value(dst, fx.big).unwrap(), 7);
        let src_ref = fx.cas.ll_get_feature_cell(src, fx.label);
        let dst_ref = fx.cas.ll_get_feature_cell(dst, fx.label);
        assert_ne!(src_ref, dst_ref);
        assert_eq!(
            fx.cas.get_string_value(dst, fx.label).unwrap().as_deref(),
            Some("JJ")
        );

        let other = fx
            .cas
            .create_annotation(ViewId::INITIAL, TypeCode::ANNOTATION, 0, 0)
            .unwrap();
        assert!(matches!(
            fx.cas.copy_features(other, src),
            Err(CasError::TypeMismatch { .. })
        ));
    }
}
