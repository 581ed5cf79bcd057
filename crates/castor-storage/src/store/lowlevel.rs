//! Unchecked accessors.
//!
//! Nothing here validates its arguments. A wrong feature code, a reference
//! to a record of the wrong type, or an out-of-range index reads or writes
//! an unrelated cell, or panics on a slice bound. The checked tier wraps
//! these after validating.
//!
//! Record layout:
//! ```text
//! plain record:   [type][feature 1]...[feature n]
//! inline array:   [type][length][elem 0]...[elem length-1]
//! aux array:      [type][length][offset into aux heap]
//! ```

use castor_common::{CasError, FeatureCode, FsRef, Result, TypeClass, TypeCode};

use super::marker::AuxKind;
use super::{Cas, ViewId};
use crate::heap::constants::{
    ARRAY_CONTENT_OFFSET, ARRAY_LENGTH_OFFSET, AUX_ARRAY_CELLS, FALSE, TRUE, TRUE_BYTE,
};

impl Cas {
    // =========================================================================
    // Records
    // =========================================================================

    /// Returns the type of a record.
    #[inline]
    pub fn ll_type(&self, fs: FsRef) -> TypeCode {
        self.type_of(fs)
    }

    /// Returns the number of heap cells a record occupies.
    pub fn ll_record_cells(&self, fs: FsRef) -> usize {
        let t = self.type_of(fs);
        let class = self.ts.type_class(t);
        if class.is_inline_array() {
            ARRAY_CONTENT_OFFSET + self.ll_get_array_size(fs)
        } else if class.is_aux_array() {
            AUX_ARRAY_CELLS
        } else {
            self.layout.type_cells(t)
        }
    }

    /// Allocates a zeroed record of type `t` in `view`.
    ///
    /// Annotation-base records created in a view other than the base store
    /// get that view's Sofa in their sofa feature; the initial view's Sofa
    /// is created here if it does not exist yet.
    pub fn ll_create_fs(&mut self, view: ViewId, t: TypeCode) -> Result<FsRef> {
        let cells = self.layout.type_cells(t);
        let fs = self.heaps.heap.allocate(cells, t.0 as i32)?;
        if !view.is_base() && self.ts.is_annotation_base(t) {
            let sofa = self.ensure_view_sofa(view)?;
            let addr = self.feature_cell(fs, FeatureCode::SOFA_REF);
            self.heaps.heap.set(addr, sofa.as_cell());
        }
        Ok(fs)
    }

    /// Allocates a zeroed array of array type `t`.
    pub fn ll_create_array(&mut self, t: TypeCode, len: usize) -> Result<FsRef> {
        let class = self.ts.type_class(t);
        let fs = if class.is_aux_array() {
            let fs = self.heaps.heap.allocate(AUX_ARRAY_CELLS, t.0 as i32)?;
            let offset = match class {
                TypeClass::ShortArray => self.heaps.shorts.reserve(len),
                TypeClass::LongArray | TypeClass::DoubleArray => self.heaps.longs.reserve(len),
                _ => self.heaps.bytes.reserve(len),
            };
            self.heaps
                .heap
                .set(fs.addr() + ARRAY_CONTENT_OFFSET, offset as i32);
            fs
        } else {
            let cells = ARRAY_CONTENT_OFFSET
                .checked_add(len)
                .ok_or(CasError::RecordTooLarge {
                    requested: len,
                    page_size: self.heaps.heap.page_size(),
                })?;
            self.heaps.heap.allocate(cells, t.0 as i32)?
        };
        self.heaps
            .heap
            .set(fs.addr() + ARRAY_LENGTH_OFFSET, len as i32);
        Ok(fs)
    }

    #[inline]
    fn feature_cell(&self, fs: FsRef, f: FeatureCode) -> usize {
        fs.addr() + self.layout.feature_offset(f)
    }

    /// Returns the raw cell of feature `f`.
    #[inline]
    pub fn ll_get_feature_cell(&self, fs: FsRef, f: FeatureCode) -> i32 {
        self.heaps.heap.get(self.feature_cell(fs, f))
    }

    /// Writes the raw cell of feature `f`.
    #[inline]
    pub fn ll_set_feature_cell(&mut self, fs: FsRef, f: FeatureCode, value: i32) {
        let addr = self.feature_cell(fs, f);
        self.heaps.heap.set(addr, value);
        self.log_heap_cell(fs, addr);
    }

    // =========================================================================
    // Scalar features
    // =========================================================================

    pub fn ll_get_int_value(&self, fs: FsRef, f: FeatureCode) -> i32 {
        self.ll_get_feature_cell(fs, f)
    }

    pub fn ll_set_int_value(&mut self, fs: FsRef, f: FeatureCode, value: i32) {
        self.ll_set_feature_cell(fs, f, value);
    }

    pub fn ll_get_float_value(&self, fs: FsRef, f: FeatureCode) -> f32 {
        f32::from_bits(self.ll_get_feature_cell(fs, f) as u32)
    }

    pub fn ll_set_float_value(&mut self, fs: FsRef, f: FeatureCode, value: f32) {
        self.ll_set_feature_cell(fs, f, value.to_bits() as i32);
    }

    pub fn ll_get_boolean_value(&self, fs: FsRef, f: FeatureCode) -> bool {
        self.ll_get_feature_cell(fs, f) == TRUE
    }

    pub fn ll_set_boolean_value(&mut self, fs: FsRef, f: FeatureCode, value: bool) {
        self.ll_set_feature_cell(fs, f, if value { TRUE } else { FALSE });
    }

    pub fn ll_get_byte_value(&self, fs: FsRef, f: FeatureCode) -> i8 {
        self.ll_get_feature_cell(fs, f) as i8
    }

    pub fn ll_set_byte_value(&mut self, fs: FsRef, f: FeatureCode, value: i8) {
        self.ll_set_feature_cell(fs, f, value as i32);
    }

    pub fn ll_get_short_value(&self, fs: FsRef, f: FeatureCode) -> i16 {
        self.ll_get_feature_cell(fs, f) as i16
    }

    pub fn ll_set_short_value(&mut self, fs: FsRef, f: FeatureCode, value: i16) {
        self.ll_set_feature_cell(fs, f, value as i32);
    }

    /// Long values live in the long heap; the cell holds their offset.
    pub fn ll_get_long_value(&self, fs: FsRef, f: FeatureCode) -> i64 {
        let offset = self.ll_get_feature_cell(fs, f) as usize;
        self.heaps.longs.get(offset)
    }

    /// Appends the value to the long heap and points the cell at it.
    pub fn ll_set_long_value(&mut self, fs: FsRef, f: FeatureCode, value: i64) {
        let offset = self.heaps.longs.push(value);
        self.ll_set_feature_cell(fs, f, offset as i32);
    }

    pub fn ll_get_double_value(&self, fs: FsRef, f: FeatureCode) -> f64 {
        f64::from_bits(self.ll_get_long_value(fs, f) as u64)
    }

    pub fn ll_set_double_value(&mut self, fs: FsRef, f: FeatureCode, value: f64) {
        self.ll_set_long_value(fs, f, value.to_bits() as i64);
    }

    pub fn ll_get_string_value(&self, fs: FsRef, f: FeatureCode) -> Option<String> {
        self.heaps.strings.get_string(self.ll_get_feature_cell(fs, f))
    }

    /// Stores `value` as a new string ref, or the null ref for None.
    pub fn ll_set_string_value(&mut self, fs: FsRef, f: FeatureCode, value: Option<&str>) {
        let r = match value {
            Some(s) => self.heaps.strings.add_string(s),
            None => 0,
        };
        self.ll_set_feature_cell(fs, f, r);
    }

    pub fn ll_get_ref_value(&self, fs: FsRef, f: FeatureCode) -> FsRef {
        FsRef::from_cell(self.ll_get_feature_cell(fs, f))
    }

    pub fn ll_set_ref_value(&mut self, fs: FsRef, f: FeatureCode, value: FsRef) {
        self.ll_set_feature_cell(fs, f, value.as_cell());
    }

    // =========================================================================
    // Arrays
    // =========================================================================

    /// Returns the element count of an array.
    pub fn ll_get_array_size(&self, fs: FsRef) -> usize {
        self.heaps.heap.get(fs.addr() + ARRAY_LENGTH_OFFSET) as usize
    }

    #[inline]
    fn inline_cell(&self, fs: FsRef, index: usize) -> usize {
        fs.addr() + ARRAY_CONTENT_OFFSET + index
    }

    #[inline]
    fn aux_offset(&self, fs: FsRef, index: usize) -> usize {
        self.heaps.heap.get(fs.addr() + ARRAY_CONTENT_OFFSET) as usize + index
    }

    /// Returns the element cells of an inline array.
    pub fn ll_array_cells(&self, fs: FsRef) -> &[i32] {
        let len = self.ll_get_array_size(fs);
        self.heaps.heap.slice(fs.addr() + ARRAY_CONTENT_OFFSET, len)
    }

    fn set_inline_element(&mut self, fs: FsRef, index: usize, value: i32) {
        let addr = self.inline_cell(fs, index);
        self.heaps.heap.set(addr, value);
        self.log_heap_cell(fs, addr);
    }

    pub fn ll_get_int_array_value(&self, fs: FsRef, index: usize) -> i32 {
        self.heaps.heap.get(self.inline_cell(fs, index))
    }

    pub fn ll_set_int_array_value(&mut self, fs: FsRef, index: usize, value: i32) {
        self.set_inline_element(fs, index, value);
    }

    pub fn ll_get_float_array_value(&self, fs: FsRef, index: usize) -> f32 {
        f32::from_bits(self.ll_get_int_array_value(fs, index) as u32)
    }

    pub fn ll_set_float_array_value(&mut self, fs: FsRef, index: usize, value: f32) {
        self.set_inline_element(fs, index, value.to_bits() as i32);
    }

    pub fn ll_get_string_array_value(&self, fs: FsRef, index: usize) -> Option<String> {
        self.heaps
            .strings
            .get_string(self.ll_get_int_array_value(fs, index))
    }

    pub fn ll_set_string_array_value(&mut self, fs: FsRef, index: usize, value: Option<&str>) {
        let r = match value {
            Some(s) => self.heaps.strings.add_string(s),
            None => 0,
        };
        self.set_inline_element(fs, index, r);
    }

    pub fn ll_get_ref_array_value(&self, fs: FsRef, index: usize) -> FsRef {
        FsRef::from_cell(self.ll_get_int_array_value(fs, index))
    }

    pub fn ll_set_ref_array_value(&mut self, fs: FsRef, index: usize, value: FsRef) {
        self.set_inline_element(fs, index, value.as_cell());
    }

    pub fn ll_get_byte_array_value(&self, fs: FsRef, index: usize) -> i8 {
        self.heaps.bytes.get(self.aux_offset(fs, index))
    }

    pub fn ll_set_byte_array_value(&mut self, fs: FsRef, index: usize, value: i8) {
        let offset = self.aux_offset(fs, index);
        self.heaps.bytes.set(offset, value);
        self.log_aux_cell(AuxKind::Byte, offset);
    }

    pub fn ll_get_boolean_array_value(&self, fs: FsRef, index: usize) -> bool {
        self.ll_get_byte_array_value(fs, index) == TRUE_BYTE
    }

    pub fn ll_set_boolean_array_value(&mut self, fs: FsRef, index: usize, value: bool) {
        self.ll_set_byte_array_value(fs, index, if value { TRUE_BYTE } else { 0 });
    }

    pub fn ll_get_short_array_value(&self, fs: FsRef, index: usize) -> i16 {
        self.heaps.shorts.get(self.aux_offset(fs, index))
    }

    pub fn ll_set_short_array_value(&mut self, fs: FsRef, index: usize, value: i16) {
        let offset = self.aux_offset(fs, index);
        self.heaps.shorts.set(offset, value);
        self.log_aux_cell(AuxKind::Short, offset);
    }

    pub fn ll_get_long_array_value(&self, fs: FsRef, index: usize) -> i64 {
        self.heaps.longs.get(self.aux_offset(fs, index))
    }

    pub fn ll_set_long_array_value(&mut self, fs: FsRef, index: usize, value: i64) {
        let offset = self.aux_offset(fs, index);
        self.heaps.longs.set(offset, value);
        self.log_aux_cell(AuxKind::Long, offset);
    }

    pub fn ll_get_double_array_value(&self, fs: FsRef, index: usize) -> f64 {
        f64::from_bits(self.ll_get_long_array_value(fs, index) as u64)
    }

    pub fn ll_set_double_array_value(&mut self, fs: FsRef, index: usize, value: f64) {
        self.ll_set_long_array_value(fs, index, value.to_bits() as i64);
    }

    /// Copies `dest.len()` element cells of an inline array, starting at
    /// `src_offset`, into `dest`.
    pub fn ll_copy_to_array(&self, fs: FsRef, src_offset: usize, dest: &mut [i32]) {
        let start = self.inline_cell(fs, src_offset);
        dest.copy_from_slice(self.heaps.heap.slice(start, dest.len()));
    }

    /// Copies `src` into the element cells of an inline array, starting at
    /// `dest_offset`.
    pub fn ll_copy_from_array(&mut self, src: &[i32], fs: FsRef, dest_offset: usize) {
        let start = self.inline_cell(fs, dest_offset);
        self.heaps
            .heap
            .slice_mut(start, src.len())
            .copy_from_slice(src);
        self.log_heap_range(fs, start, src.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::test_cas;

    #[test]
    fn test_array_layout_inline() {
        let mut cas = test_cas();
        let arr = cas.ll_create_array(TypeCode::INT_ARRAY, 3).unwrap();
        assert_eq!(cas.ll_get_array_size(arr), 3);
        assert_eq!(cas.ll_record_cells(arr), 5);
        cas.ll_set_int_array_value(arr, 2, 9);
        assert_eq!(cas.ll_array_cells(arr), &[0, 0, 9]);
    }

    #[test]
    fn test_array_layout_aux() {
        let mut cas = test_cas();
        let arr = cas.ll_create_array(TypeCode::LONG_ARRAY, 2).unwrap();
        assert_eq!(cas.ll_record_cells(arr), 3);
        cas.ll_set_long_array_value(arr, 1, i64::MAX);
        assert_eq!(cas.ll_get_long_array_value(arr, 1), i64::MAX);
        assert_eq!(cas.heaps().longs.len(), 3);

        let flags = cas.ll_create_array(TypeCode::BOOLEAN_ARRAY, 2).unwrap();
        cas.ll_set_boolean_array_value(flags, 0, true);
        assert!(cas.ll_get_boolean_array_value(flags, 0));
        assert!(!cas.ll_get_boolean_array_value(flags, 1));
    }

    #[test]
    fn test_long_feature_out_of_line() {
        let mut cas = test_cas();
        let mut ts = castor_common::TypeSystem::new();
        let t = ts.add_type("test.Holder", TypeCode::TOP).unwrap();
        let big = ts.add_feature(t, "big", TypeCode::LONG).unwrap();
        let real = ts.add_feature(t, "real", TypeCode::DOUBLE).unwrap();
        ts.commit();
        cas = Cas::new(std::sync::Arc::new(ts), cas.config().clone()).unwrap();

        let fs = cas.ll_create_fs(ViewId::BASE, t).unwrap();
        assert_eq!(cas.ll_get_long_value(fs, big), 0);
        cas.ll_set_long_value(fs, big, -5);
        cas.ll_set_double_value(fs, real, 0.25);
        assert_eq!(cas.ll_get_long_value(fs, big), -5);
        assert_eq!(cas.ll_get_double_value(fs, real), 0.25);
        assert_ne!(cas.ll_get_feature_cell(fs, big), 0);
    }

    #[test]
    fn test_annotation_stamped_with_view_sofa() {
        let mut cas = test_cas();
        assert!(cas.view_sofa(ViewId::INITIAL).unwrap().is_null());
        let a = cas.ll_create_fs(ViewId::INITIAL, TypeCode::ANNOTATION).unwrap();
        let sofa = cas.view_sofa(ViewId::INITIAL).unwrap();
        assert!(!sofa.is_null());
        assert_eq!(cas.ll_get_ref_value(a, FeatureCode::SOFA_REF), sofa);
    }

    #[test]
    fn test_string_values() {
        let mut cas = test_cas();
        let arr = cas.ll_create_array(TypeCode::STRING_ARRAY, 2).unwrap();
        cas.ll_set_string_array_value(arr, 0, Some("x"));
        assert_eq!(cas.ll_get_string_array_value(arr, 0).as_deref(), Some("x"));
        assert_eq!(cas.ll_get_string_array_value(arr, 1), None);
    }

    #[test]
    fn test_copy_to_and_from_array() {
        let mut cas = test_cas();
        let arr = cas.ll_create_array(TypeCode::INT_ARRAY, 4).unwrap();
        cas.ll_copy_from_array(&[1, 2], arr, 1);
        let mut out = [0; 3];
        cas.ll_copy_to_array(arr, 1, &mut out);
        assert_eq!(out, [1, 2, 0]);
    }
}
