//! Error types for the castor record store.

use thiserror::Error;

/// Result type alias using CasError.
pub type Result<T> = std::result::Result<T, CasError>;

/// Broad fault family an error belongs to.
///
/// Callers layered above the store can dispatch on the family without
/// matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A record could not be created.
    Creation,
    /// A view-only operation was invoked on the base store.
    Level,
    /// An array index was out of range.
    Bounds,
    /// A checked access failed its domain or range validation.
    Type,
    /// A Sofa or view name was duplicated or unknown.
    Naming,
    /// An iterator observed a changed index.
    Concurrency,
    /// A blob could not be read or written.
    Serialization,
    /// The store or type system is in the wrong administrative state.
    Admin,
    /// An invariant inside the store was violated.
    Internal,
}

/// Errors that can occur in record store operations.
#[derive(Debug, Error)]
pub enum CasError {
    // Creation errors
    #[error("Type {type_name} cannot be created with a generic create call")]
    NonCreatableType { type_name: String },

    #[error("Cannot create annotation of type {type_name} on the base store")]
    AnnotationInBaseStore { type_name: String },

    #[error("Record of {requested} cells exceeds the heap page size of {page_size}")]
    RecordTooLarge { requested: usize, page_size: usize },

    #[error("Array of {requested} elements exceeds the limit of {limit}")]
    ArrayTooLarge { requested: usize, limit: usize },

    // Level errors
    #[error("Operation {0} is not supported on the base store")]
    BaseStoreOperation(String),

    #[error("Annotation {fs} belongs to a different view than {view}")]
    AnnotationInWrongView { fs: u32, view: u32 },

    // Bounds errors
    #[error("Array index {index} out of bounds for length {length}")]
    ArrayIndexOutOfBounds { index: usize, length: usize },

    // Type errors
    #[error("Feature {feature} is not appropriate for type {type_name}")]
    FeatureNotAppropriate { feature: String, type_name: String },

    #[error("Value of type {actual} is not in the range {expected} of feature {feature}")]
    RangeMismatch {
        feature: String,
        expected: String,
        actual: String,
    },

    #[error("Feature {feature} does not hold a {requested} value")]
    WrongValueKind { feature: String, requested: String },

    #[error("Expected a record of type {expected}, found {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Record {0} is not a valid reference")]
    InvalidFsRef(u32),

    #[error("Invalid type code: {0}")]
    InvalidTypeCode(u32),

    #[error("Invalid feature code: {0}")]
    InvalidFeatureCode(u32),

    #[error("Cannot parse {value:?} for feature {feature}")]
    ValueParse { feature: String, value: String },

    // Naming errors
    #[error("Sofa name already in use: {0}")]
    DuplicateSofaName(String),

    #[error("No view named {0}")]
    SofaNotFound(String),

    #[error("Sofa reference {0} does not name a Sofa record")]
    SofaRefNotFound(u32),

    #[error("Sofa data already set for {0}")]
    SofaDataAlreadySet(String),

    #[error("View {0} does not exist")]
    InvalidView(u32),

    // Concurrency errors
    #[error("Index {index} was modified during iteration")]
    ConcurrentModification { index: String },

    #[error("Iterator is not positioned on an element")]
    NoSuchElement,

    // Serialization errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed blob: {0}")]
    MalformedBlob(String),

    #[error("Unsupported blob version: {0}")]
    UnsupportedVersion(u32),

    // Administrative errors
    #[error("Flush is disabled for this store")]
    FlushDisabled,

    #[error("Type system is not committed")]
    TypeSystemNotCommitted,

    #[error("Type system is already committed")]
    TypeSystemCommitted,

    #[error("Type already defined: {0}")]
    DuplicateType(String),

    #[error("Feature {feature} already defined on {type_name} or a related type")]
    DuplicateFeature { feature: String, type_name: String },

    #[error("Type not found: {0}")]
    TypeNotFound(String),

    #[error("Type {0} cannot be subclassed")]
    InheritanceFinal(String),

    #[error("A marker already exists for this store")]
    MarkerAlreadyCreated,

    #[error("Marker is no longer valid for this store")]
    InvalidMarker,

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index already defined: {0}")]
    DuplicateIndex(String),

    #[error("Invalid index key: {0}")]
    InvalidIndexKey(String),

    #[error("Operation not supported: {0}")]
    UnsupportedOperation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CasError {
    /// Returns the fault family of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CasError::NonCreatableType { .. }
            | CasError::AnnotationInBaseStore { .. }
            | CasError::RecordTooLarge { .. }
            | CasError::ArrayTooLarge { .. } => ErrorKind::Creation,

            CasError::BaseStoreOperation(_) | CasError::AnnotationInWrongView { .. } => {
                ErrorKind::Level
            }

            CasError::ArrayIndexOutOfBounds { .. } => ErrorKind::Bounds,

            CasError::FeatureNotAppropriate { .. }
            | CasError::RangeMismatch { .. }
            | CasError::WrongValueKind { .. }
            | CasError::TypeMismatch { .. }
            | CasError::InvalidFsRef(_)
            | CasError::InvalidTypeCode(_)
            | CasError::InvalidFeatureCode(_)
            | CasError::ValueParse { .. } => ErrorKind::Type,

            CasError::DuplicateSofaName(_)
            | CasError::SofaNotFound(_)
            | CasError::SofaRefNotFound(_)
            | CasError::SofaDataAlreadySet(_)
            | CasError::InvalidView(_) => ErrorKind::Naming,

            CasError::ConcurrentModification { .. } | CasError::NoSuchElement => {
                ErrorKind::Concurrency
            }

            CasError::Io(_) | CasError::MalformedBlob(_) | CasError::UnsupportedVersion(_) => {
                ErrorKind::Serialization
            }

            CasError::FlushDisabled
            | CasError::TypeSystemNotCommitted
            | CasError::TypeSystemCommitted
            | CasError::DuplicateType(_)
            | CasError::DuplicateFeature { .. }
            | CasError::TypeNotFound(_)
            | CasError::InheritanceFinal(_)
            | CasError::MarkerAlreadyCreated
            | CasError::InvalidMarker
            | CasError::IndexNotFound(_)
            | CasError::DuplicateIndex(_)
            | CasError::InvalidIndexKey(_)
            | CasError::UnsupportedOperation(_)
            | CasError::ConfigError(_) => ErrorKind::Admin,

            CasError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Wraps a serialization error with the blob section being processed.
    pub fn with_context(self, context: &str) -> CasError {
        match self {
            CasError::MalformedBlob(reason) => {
                CasError::MalformedBlob(format!("{}: {}", context, reason))
            }
            CasError::Io(e) => CasError::MalformedBlob(format!("{}: {}", context, e)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind as IoErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(IoErrorKind::UnexpectedEof, "short read");
        let err: CasError = io_err.into();
        assert!(matches!(err, CasError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn test_creation_errors_display() {
        let err = CasError::NonCreatableType {
            type_name: "cas.Sofa".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Type cas.Sofa cannot be created with a generic create call"
        );
        assert_eq!(err.kind(), ErrorKind::Creation);

        let err = CasError::RecordTooLarge {
            requested: 2000,
            page_size: 1000,
        };
        assert_eq!(
            err.to_string(),
            "Record of 2000 cells exceeds the heap page size of 1000"
        );

        let err = CasError::ArrayTooLarge {
            requested: usize::MAX,
            limit: 10,
        };
        assert!(err.to_string().starts_with("Array of "));
        assert_eq!(err.kind(), ErrorKind::Creation);
    }

    #[test]
    fn test_bounds_error_display() {
        let err = CasError::ArrayIndexOutOfBounds {
            index: 3,
            length: 3,
        };
        assert_eq!(err.to_string(), "Array index 3 out of bounds for length 3");
        assert_eq!(err.kind(), ErrorKind::Bounds);
    }

    #[test]
    fn test_type_errors_display() {
        let err = CasError::RangeMismatch {
            feature: "ref".to_string(),
            expected: "text.Annotation".to_string(),
            actual: "cas.Sofa".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Value of type cas.Sofa is not in the range text.Annotation of feature ref"
        );
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn test_naming_errors_display() {
        let err = CasError::DuplicateSofaName("en".to_string());
        assert_eq!(err.to_string(), "Sofa name already in use: en");
        assert_eq!(err.kind(), ErrorKind::Naming);

        let err = CasError::SofaNotFound("de".to_string());
        assert_eq!(err.to_string(), "No view named de");
    }

    #[test]
    fn test_concurrency_error_display() {
        let err = CasError::ConcurrentModification {
            index: "AnnotationIndex".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Index AnnotationIndex was modified during iteration"
        );
        assert_eq!(err.kind(), ErrorKind::Concurrency);
    }

    #[test]
    fn test_level_error_kind() {
        let err = CasError::BaseStoreOperation("set_document_text".to_string());
        assert_eq!(err.kind(), ErrorKind::Level);
        assert!(err.to_string().contains("set_document_text"));
    }

    #[test]
    fn test_admin_errors_display() {
        assert_eq!(
            CasError::FlushDisabled.to_string(),
            "Flush is disabled for this store"
        );
        assert_eq!(CasError::FlushDisabled.kind(), ErrorKind::Admin);
        assert_eq!(
            CasError::UnsupportedVersion(9).to_string(),
            "Unsupported blob version: 9"
        );
    }

    #[test]
    fn test_with_context() {
        let err = CasError::MalformedBlob("truncated".to_string()).with_context("string heap");
        assert_eq!(err.to_string(), "Malformed blob: string heap: truncated");

        let err = CasError::FlushDisabled.with_context("ignored");
        assert!(matches!(err, CasError::FlushDisabled));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CasError>();
    }
}
