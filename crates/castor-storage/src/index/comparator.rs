//! Record comparison for sorted and set indexes.

use std::cmp::Ordering;

use castor_common::{FsRef, Result, TypeClass, TypeCode, TypeSystem};

use super::spec::{IndexKey, IndexSpec, KeyDirection};
use crate::heap::constants::TYPE_CELL;
use crate::heap::Heaps;
use crate::layout::Layout;

/// How a key's cell is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    /// Signed cell value: int, boolean, byte, short, and record addresses.
    Int,
    /// Float bit pattern.
    Float,
    /// String ref, null first.
    String,
    /// Offset into the long heap.
    Long,
    /// Offset into the long heap holding a double's bit pattern.
    Double,
    /// The record's type in the default type order.
    TypeOrder,
}

#[derive(Debug, Clone, Copy)]
struct CompiledKey {
    offset: usize,
    kind: KeyKind,
    reverse: bool,
}

/// A comparator resolved against one layout.
///
/// Keys are evaluated in order; a full tie always falls back to type order
/// so results are deterministic.
#[derive(Debug, Clone)]
pub struct Comparator {
    keys: Vec<CompiledKey>,
    type_rank: Vec<u32>,
}

impl Comparator {
    /// Resolves the keys of `spec`.
    pub fn compile(spec: &IndexSpec, ts: &TypeSystem, layout: &Layout) -> Result<Self> {
        spec.validate(ts)?;
        let keys = spec
            .keys
            .iter()
            .map(|key| match key {
                IndexKey::Feature { feature, direction } => {
                    let kind = match ts.range_class(*feature) {
                        TypeClass::Float => KeyKind::Float,
                        TypeClass::String => KeyKind::String,
                        TypeClass::Long => KeyKind::Long,
                        TypeClass::Double => KeyKind::Double,
                        _ => KeyKind::Int,
                    };
                    CompiledKey {
                        offset: layout.feature_offset(*feature),
                        kind,
                        reverse: *direction == KeyDirection::Reverse,
                    }
                }
                IndexKey::TypeOrder => CompiledKey {
                    offset: TYPE_CELL,
                    kind: KeyKind::TypeOrder,
                    reverse: false,
                },
            })
            .collect();
        let type_rank = (0..ts.type_count() as u32)
            .map(|t| ts.type_order(TypeCode(t)))
            .collect();
        Ok(Self { keys, type_rank })
    }

    /// Returns true if the comparator has no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Compares two records by every key, then by type order.
    pub fn compare(&self, heaps: &Heaps, a: FsRef, b: FsRef) -> Ordering {
        for key in &self.keys {
            let ord = self.compare_key(heaps, key, a, b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.rank(heaps, a).cmp(&self.rank(heaps, b))
    }

    fn rank(&self, heaps: &Heaps, fs: FsRef) -> u32 {
        let t = heaps.heap.get(fs.addr() + TYPE_CELL) as usize;
        self.type_rank.get(t).copied().unwrap_or(u32::MAX)
    }

    fn compare_key(&self, heaps: &Heaps, key: &CompiledKey, a: FsRef, b: FsRef) -> Ordering {
        let cell_a = heaps.heap.get(a.addr() + key.offset);
        let cell_b = heaps.heap.get(b.addr() + key.offset);
        let ord = match key.kind {
            KeyKind::Int => cell_a.cmp(&cell_b),
            KeyKind::Float => f32::from_bits(cell_a as u32).total_cmp(&f32::from_bits(cell_b as u32)),
            KeyKind::String => heaps.string_units(cell_a).cmp(&heaps.string_units(cell_b)),
            KeyKind::Long => heaps
                .longs
                .get(cell_a as usize)
                .cmp(&heaps.longs.get(cell_b as usize)),
            KeyKind::Double => f64::from_bits(heaps.longs.get(cell_a as usize) as u64)
                .total_cmp(&f64::from_bits(heaps.longs.get(cell_b as usize) as u64)),
            KeyKind::TypeOrder => self.rank(heaps, a).cmp(&self.rank(heaps, b)),
        };
        if key.reverse {
            ord.reverse()
        } else {
            ord
        }
    }
}
