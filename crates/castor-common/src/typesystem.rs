//! Type system: single-inheritance type hierarchy with typed features.
//!
//! The store only reads a committed type system. Before commit, types and
//! features can be added; `commit()` freezes the hierarchy and precomputes
//! the tables queried on hot paths:
//!
//! ```text
//!   TOP ─┬─ primitives (final)
//!        ├─ ArrayBase ── nine array types (final)
//!        ├─ Sofa (final)
//!        └─ AnnotationBase ── Annotation ── DocumentAnnotation
//! ```
//!
//! Subsumption is answered in O(1) from pre-order numbering: `a` subsumes
//! `b` iff `pre[a] <= pre[b] <= last[a]`, where `last[a]` is the largest
//! pre-order number in `a`'s subtree.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{CasError, Result};
use crate::types::{FeatureCode, TypeClass, TypeCode};

/// Name of the root type.
pub const TOP_NAME: &str = "cas.TOP";

/// Definition of one type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// Fully qualified type name.
    pub name: String,
    /// Supertype, None only for the root.
    pub parent: Option<TypeCode>,
    /// Features introduced by this type, in declaration order.
    pub introduced: Vec<FeatureCode>,
    /// Storage class of values of this type.
    pub class: TypeClass,
    /// Whether subtypes may be declared.
    pub inheritance_final: bool,
    /// Whether a generic create call may instantiate this type.
    pub creatable: bool,
}

/// Definition of one feature.
#[derive(Debug, Clone)]
pub struct FeatureInfo {
    /// Short name, unique within the domain type's hierarchy line.
    pub name: String,
    /// Type that introduces the feature.
    pub domain: TypeCode,
    /// Type of the feature's values.
    pub range: TypeCode,
}

/// A type hierarchy with features.
#[derive(Debug, Clone)]
pub struct TypeSystem {
    types: Vec<TypeInfo>,
    features: Vec<FeatureInfo>,
    type_names: HashMap<String, TypeCode>,
    children: Vec<Vec<TypeCode>>,
    committed: bool,

    // Computed at commit
    pre: Vec<u32>,
    last: Vec<u32>,
    appropriate: Vec<Vec<FeatureCode>>,
    subtypes: Vec<Vec<TypeCode>>,
}

impl TypeSystem {
    /// Creates an uncommitted type system holding the built-in types.
    pub fn new() -> Self {
        let mut ts = Self {
            types: Vec::new(),
            features: Vec::new(),
            type_names: HashMap::new(),
            children: Vec::new(),
            committed: false,
            pre: Vec::new(),
            last: Vec::new(),
            appropriate: Vec::new(),
            subtypes: Vec::new(),
        };

        // Code 0 is reserved in both tables.
        ts.types.push(TypeInfo {
            name: String::new(),
            parent: None,
            introduced: Vec::new(),
            class: TypeClass::Fs,
            inheritance_final: true,
            creatable: false,
        });
        ts.children.push(Vec::new());
        ts.features.push(FeatureInfo {
            name: String::new(),
            domain: TypeCode::INVALID,
            range: TypeCode::INVALID,
        });

        ts.define(TOP_NAME, None, TypeClass::Fs, false, true);
        let top = Some(TypeCode::TOP);
        ts.define("cas.Integer", top, TypeClass::Int, true, false);
        ts.define("cas.Float", top, TypeClass::Float, true, false);
        ts.define("cas.String", top, TypeClass::String, true, false);
        ts.define("cas.Boolean", top, TypeClass::Boolean, true, false);
        ts.define("cas.Byte", top, TypeClass::Byte, true, false);
        ts.define("cas.Short", top, TypeClass::Short, true, false);
        ts.define("cas.Long", top, TypeClass::Long, true, false);
        ts.define("cas.Double", top, TypeClass::Double, true, false);

        ts.define("cas.ArrayBase", top, TypeClass::Fs, true, false);
        let array = Some(TypeCode::ARRAY_BASE);
        ts.define("cas.FSArray", array, TypeClass::FsArray, true, false);
        ts.define("cas.IntegerArray", array, TypeClass::IntArray, true, false);
        ts.define("cas.FloatArray", array, TypeClass::FloatArray, true, false);
        ts.define("cas.StringArray", array, TypeClass::StringArray, true, false);
        ts.define("cas.BooleanArray", array, TypeClass::BooleanArray, true, false);
        ts.define("cas.ByteArray", array, TypeClass::ByteArray, true, false);
        ts.define("cas.ShortArray", array, TypeClass::ShortArray, true, false);
        ts.define("cas.LongArray", array, TypeClass::LongArray, true, false);
        ts.define("cas.DoubleArray", array, TypeClass::DoubleArray, true, false);

        ts.define("cas.Sofa", top, TypeClass::Fs, true, false);
        ts.define("cas.AnnotationBase", top, TypeClass::Fs, false, true);
        ts.define(
            "text.Annotation",
            Some(TypeCode::ANNOTATION_BASE),
            TypeClass::Fs,
            false,
            true,
        );
        ts.define(
            "text.DocumentAnnotation",
            Some(TypeCode::ANNOTATION),
            TypeClass::Fs,
            false,
            true,
        );
        debug_assert_eq!(ts.types.len() as u32, TypeCode::BUILTIN_COUNT);

        ts.define_feature(TypeCode::SOFA, "sofaNum", TypeCode::INT);
        ts.define_feature(TypeCode::SOFA, "sofaID", TypeCode::STRING);
        ts.define_feature(TypeCode::SOFA, "mimeType", TypeCode::STRING);
        ts.define_feature(TypeCode::SOFA, "sofaArray", TypeCode::TOP);
        ts.define_feature(TypeCode::SOFA, "sofaString", TypeCode::STRING);
        ts.define_feature(TypeCode::SOFA, "sofaURI", TypeCode::STRING);
        ts.define_feature(TypeCode::ANNOTATION_BASE, "sofa", TypeCode::SOFA);
        ts.define_feature(TypeCode::ANNOTATION, "begin", TypeCode::INT);
        ts.define_feature(TypeCode::ANNOTATION, "end", TypeCode::INT);
        ts.define_feature(TypeCode::DOCUMENT_ANNOTATION, "language", TypeCode::STRING);
        debug_assert_eq!(ts.features.len() as u32, FeatureCode::BUILTIN_COUNT);

        ts
    }

    fn define(
        &mut self,
        name: &str,
        parent: Option<TypeCode>,
        class: TypeClass,
        inheritance_final: bool,
        creatable: bool,
    ) -> TypeCode {
        let code = TypeCode(self.types.len() as u32);
        self.types.push(TypeInfo {
            name: name.to_string(),
            parent,
            introduced: Vec::new(),
            class,
            inheritance_final,
            creatable,
        });
        self.children.push(Vec::new());
        if let Some(p) = parent {
            self.children[p.index()].push(code);
        }
        self.type_names.insert(name.to_string(), code);
        code
    }

    fn define_feature(&mut self, domain: TypeCode, name: &str, range: TypeCode) -> FeatureCode {
        let code = FeatureCode(self.features.len() as u32);
        self.features.push(FeatureInfo {
            name: name.to_string(),
            domain,
            range,
        });
        self.types[domain.index()].introduced.push(code);
        code
    }

    // =========================================================================
    // Definition
    // =========================================================================

    /// Declares a new type under `parent`.
    pub fn add_type(&mut self, name: &str, parent: TypeCode) -> Result<TypeCode> {
        if self.committed {
            return Err(CasError::TypeSystemCommitted);
        }
        if self.type_names.contains_key(name) {
            return Err(CasError::DuplicateType(name.to_string()));
        }
        let parent_info = self.type_info(parent)?;
        if parent_info.inheritance_final {
            return Err(CasError::InheritanceFinal(parent_info.name.clone()));
        }
        Ok(self.define(name, Some(parent), TypeClass::Fs, false, true))
    }

    /// Declares a feature introduced by `domain` with values of type `range`.
    ///
    /// The name must not already be used by a feature of any ancestor or
    /// descendant of `domain`, so every feature keeps a single offset in
    /// every type that carries it.
    pub fn add_feature(
        &mut self,
        domain: TypeCode,
        name: &str,
        range: TypeCode,
    ) -> Result<FeatureCode> {
        if self.committed {
            return Err(CasError::TypeSystemCommitted);
        }
        let domain_info = self.type_info(domain)?;
        if domain_info.class != TypeClass::Fs || domain_info.inheritance_final {
            return Err(CasError::InheritanceFinal(domain_info.name.clone()));
        }
        self.type_info(range)?;

        let duplicate = || CasError::DuplicateFeature {
            feature: name.to_string(),
            type_name: self.types[domain.index()].name.clone(),
        };

        let mut cursor = Some(domain);
        while let Some(t) = cursor {
            if self.introduces(t, name) {
                return Err(duplicate());
            }
            cursor = self.types[t.index()].parent;
        }

        let mut stack = self.children[domain.index()].clone();
        while let Some(t) = stack.pop() {
            if self.introduces(t, name) {
                return Err(duplicate());
            }
            stack.extend_from_slice(&self.children[t.index()]);
        }

        Ok(self.define_feature(domain, name, range))
    }

    fn introduces(&self, t: TypeCode, name: &str) -> bool {
        self.types[t.index()]
            .introduced
            .iter()
            .any(|f| self.features[f.index()].name == name)
    }

    /// Freezes the type system and computes the lookup tables.
    pub fn commit(&mut self) {
        if self.committed {
            return;
        }
        let n = self.types.len();
        self.pre = vec![0; n];
        self.last = vec![0; n];
        self.appropriate = vec![Vec::new(); n];
        self.subtypes = vec![Vec::new(); n];

        // Iterative pre-order walk carrying the inherited feature list.
        let mut order: Vec<TypeCode> = Vec::with_capacity(n);
        let mut stack: Vec<(TypeCode, bool)> = vec![(TypeCode::TOP, false)];
        while let Some((t, finished)) = stack.pop() {
            if finished {
                self.last[t.index()] = order.len() as u32 - 1;
                continue;
            }
            self.pre[t.index()] = order.len() as u32;
            order.push(t);

            let mut features = match self.types[t.index()].parent {
                Some(p) => self.appropriate[p.index()].clone(),
                None => Vec::new(),
            };
            features.extend_from_slice(&self.types[t.index()].introduced);
            self.appropriate[t.index()] = features;

            stack.push((t, true));
            for child in self.children[t.index()].iter().rev() {
                stack.push((*child, false));
            }
        }

        for t in &order {
            let first = self.pre[t.index()] as usize;
            let end = self.last[t.index()] as usize + 1;
            self.subtypes[t.index()] = order[first..end].to_vec();
        }

        self.committed = true;
        debug!(
            types = n - 1,
            features = self.features.len() - 1,
            "type system committed"
        );
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns true once `commit()` has run.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Returns the number of type codes, including the reserved code 0.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Returns the number of feature codes, including the reserved code 0.
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Returns true if `t` names a defined type.
    pub fn is_valid_type(&self, t: TypeCode) -> bool {
        t.is_valid() && t.index() < self.types.len()
    }

    /// Returns true if `f` names a defined feature.
    pub fn is_valid_feature(&self, f: FeatureCode) -> bool {
        f.is_valid() && f.index() < self.features.len()
    }

    /// Returns the definition of a type.
    pub fn type_info(&self, t: TypeCode) -> Result<&TypeInfo> {
        if !self.is_valid_type(t) {
            return Err(CasError::InvalidTypeCode(t.0));
        }
        Ok(&self.types[t.index()])
    }

    /// Returns the definition of a feature.
    pub fn feature_info(&self, f: FeatureCode) -> Result<&FeatureInfo> {
        if !self.is_valid_feature(f) {
            return Err(CasError::InvalidFeatureCode(f.0));
        }
        Ok(&self.features[f.index()])
    }

    /// Returns a type's name, or an empty string for invalid codes.
    pub fn type_name(&self, t: TypeCode) -> &str {
        self.types.get(t.index()).map(|i| i.name.as_str()).unwrap_or("")
    }

    /// Returns a feature's qualified name `Type:feature`.
    pub fn feature_name(&self, f: FeatureCode) -> String {
        match self.features.get(f.index()) {
            Some(info) if f.is_valid() => format!("{}:{}", self.type_name(info.domain), info.name),
            _ => String::new(),
        }
    }

    /// Looks up a type by name.
    pub fn type_by_name(&self, name: &str) -> Option<TypeCode> {
        self.type_names.get(name).copied()
    }

    /// Looks up a feature by short name among the features appropriate to `t`.
    pub fn feature_by_name(&self, t: TypeCode, name: &str) -> Option<FeatureCode> {
        self.appropriate_features(t)
            .iter()
            .copied()
            .find(|f| self.features[f.index()].name == name)
    }

    /// Returns true if `sup` is `sub` or one of its ancestors.
    pub fn subsumes(&self, sup: TypeCode, sub: TypeCode) -> bool {
        if !self.is_valid_type(sup) || !self.is_valid_type(sub) {
            return false;
        }
        if self.committed {
            let p = self.pre[sub.index()];
            return self.pre[sup.index()] <= p && p <= self.last[sup.index()];
        }
        let mut cursor = Some(sub);
        while let Some(t) = cursor {
            if t == sup {
                return true;
            }
            cursor = self.types[t.index()].parent;
        }
        false
    }

    /// Returns the supertype of `t`.
    pub fn parent(&self, t: TypeCode) -> Option<TypeCode> {
        self.types.get(t.index()).and_then(|i| i.parent)
    }

    /// Returns the immediate subtypes of `t`.
    pub fn direct_subtypes(&self, t: TypeCode) -> &[TypeCode] {
        self.children.get(t.index()).map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// Returns `t` and every type it subsumes, in pre-order. Empty before commit.
    pub fn all_subtypes(&self, t: TypeCode) -> &[TypeCode] {
        self.subtypes.get(t.index()).map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// Returns every feature appropriate to `t`, inherited ones first.
    /// Empty before commit.
    pub fn appropriate_features(&self, t: TypeCode) -> &[FeatureCode] {
        self.appropriate
            .get(t.index())
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the features `t` itself introduces.
    pub fn introduced_features(&self, t: TypeCode) -> &[FeatureCode] {
        self.types
            .get(t.index())
            .map(|i| i.introduced.as_slice())
            .unwrap_or(&[])
    }

    /// Returns true if `f` is appropriate to `t`.
    pub fn is_appropriate(&self, t: TypeCode, f: FeatureCode) -> bool {
        match self.features.get(f.index()) {
            Some(info) if f.is_valid() => self.subsumes(info.domain, t),
            _ => false,
        }
    }

    /// Returns the range type of a feature.
    pub fn range(&self, f: FeatureCode) -> TypeCode {
        self.features
            .get(f.index())
            .map(|i| i.range)
            .unwrap_or(TypeCode::INVALID)
    }

    /// Returns the storage class of a type.
    pub fn type_class(&self, t: TypeCode) -> TypeClass {
        self.types
            .get(t.index())
            .map(|i| i.class)
            .unwrap_or(TypeClass::Fs)
    }

    /// Returns the storage class of a feature's values.
    pub fn range_class(&self, f: FeatureCode) -> TypeClass {
        self.type_class(self.range(f))
    }

    /// Returns true if a generic create call may instantiate `t`.
    pub fn is_creatable(&self, t: TypeCode) -> bool {
        self.types
            .get(t.index())
            .map(|i| i.creatable && t.is_valid())
            .unwrap_or(false)
    }

    /// Returns the position of `t` in the default type order.
    ///
    /// Used to break ties between otherwise equal index entries.
    pub fn type_order(&self, t: TypeCode) -> u32 {
        self.pre.get(t.index()).copied().unwrap_or(u32::MAX)
    }

    /// Returns true if `t` is an annotation-base type or one of its subtypes.
    pub fn is_annotation_base(&self, t: TypeCode) -> bool {
        self.subsumes(TypeCode::ANNOTATION_BASE, t)
    }

    /// Returns true if `t` is an annotation type or one of its subtypes.
    pub fn is_annotation(&self, t: TypeCode) -> bool {
        self.subsumes(TypeCode::ANNOTATION, t)
    }
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::new()
    }
}
