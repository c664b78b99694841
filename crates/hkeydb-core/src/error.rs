use crate::kv::StoreError;
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Every failure surfaced by the adapter and cursor layer is one of these;
/// normal exhaustion is reported as `Ok(None)`, never as an error.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Attach the failing table and row position.
    #[must_use]
    pub fn with_row(mut self, table: impl Into<String>, hkey: impl Into<String>) -> Self {
        self.detail = Some(ErrorDetail::Row {
            table: table.into(),
            hkey: Some(hkey.into()),
        });
        self
    }

    /// Attach the failing table, and the row position when known. A storage
    /// cause already recorded is kept; existing row context wins.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>, hkey: Option<String>) -> Self {
        let table = table.into();
        self.detail = Some(match self.detail.take() {
            None => ErrorDetail::Row { table, hkey },
            Some(ErrorDetail::Store(source)) => ErrorDetail::RowStore {
                table,
                hkey,
                source,
            },
            Some(detail) => detail,
        });
        self
    }

    /// Construct a cursor-origin precondition violation.
    pub(crate) fn cursor_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Cursor,
            message.into(),
        )
    }

    /// Construct a cursor-origin capability error.
    pub(crate) fn cursor_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Cursor, message.into())
    }

    /// Construct an hkey-origin invariant violation.
    pub(crate) fn hkey_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::HKey,
            message.into(),
        )
    }

    /// Construct an hkey-origin corruption error.
    pub(crate) fn hkey_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::HKey, message.into())
    }

    /// Construct a row-type-origin invariant violation.
    pub(crate) fn row_type_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::RowType,
            message.into(),
        )
    }

    /// Construct a row-origin invariant violation.
    pub(crate) fn row_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Row,
            message.into(),
        )
    }

    /// Construct a row-origin capability error.
    pub(crate) fn row_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Row, message.into())
    }

    /// Construct a schema-origin invariant violation.
    pub(crate) fn schema_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Schema,
            message.into(),
        )
    }

    /// Construct an adapter-origin precondition violation.
    pub(crate) fn adapter_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Adapter,
            message.into(),
        )
    }

    /// Construct an adapter-origin capability error.
    pub(crate) fn adapter_unsupported(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::Unsupported,
            ErrorOrigin::Adapter,
            message.into(),
        )
    }

    /// Construct a store-origin corruption error.
    pub(crate) fn store_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Store, message.into())
    }

    /// Construct a store-origin not-found error.
    pub(crate) fn store_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotFound, ErrorOrigin::Store, message.into())
    }

    /// Construct a sort-origin invariant violation.
    pub(crate) fn sort_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Sort,
            message.into(),
        )
    }

    /// Construct a config-origin invariant violation.
    pub(crate) fn config_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Config,
            message.into(),
        )
    }

    /// Construct a serialize-origin internal error.
    pub(crate) fn serialize_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Serialize, message.into())
    }

    /// Construct a serialize-origin corruption error.
    pub(crate) fn serialize_corruption(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::Corruption,
            ErrorOrigin::Serialize,
            message.into(),
        )
    }

    /// Construct a missing-sequence error.
    pub fn no_such_sequence(name: &str) -> Self {
        Self::new(
            ErrorClass::NotFound,
            ErrorOrigin::Sequence,
            format!("no such sequence: '{name}'"),
        )
    }

    /// Translate one storage-layer failure into the engine taxonomy.
    ///
    /// Interruption (direct or wrapped) becomes cancellation, duplicate keys
    /// keep their own class, everything else is an adapter-wrapped storage
    /// failure.
    #[must_use]
    pub fn from_store(err: StoreError) -> Self {
        let (class, message) = if err.is_from_interruption() {
            (ErrorClass::Cancelled, format!("query canceled: {err}"))
        } else if matches!(err, StoreError::DuplicateKey { .. }) {
            (ErrorClass::DuplicateKey, err.to_string())
        } else {
            (ErrorClass::Storage, format!("storage failure: {err}"))
        };

        Self {
            class,
            origin: ErrorOrigin::Adapter,
            message,
            detail: Some(ErrorDetail::Store(err)),
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.class, ErrorClass::Cancelled)
    }

    #[must_use]
    pub const fn requires_rollback(&self) -> bool {
        self.class.requires_rollback()
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<StoreError> for InternalError {
    fn from(err: StoreError) -> Self {
        Self::from_store(err)
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Store(StoreError),

    #[error("table '{table}'{}", row_suffix(.hkey.as_deref()))]
    Row { table: String, hkey: Option<String> },

    /// A storage failure while touching a row of `table`.
    #[error("table '{table}'{}: {source}", row_suffix(.hkey.as_deref()))]
    RowStore {
        table: String,
        hkey: Option<String>,
        source: StoreError,
    },
}

impl ErrorDetail {
    /// The underlying storage failure, if any.
    #[must_use]
    pub const fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(err) | Self::RowStore { source: err, .. } => Some(err),
            Self::Row { .. } => None,
        }
    }

    /// Name of the failing table, if recorded.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Row { table, .. } | Self::RowStore { table, .. } => Some(table.as_str()),
            Self::Store(_) => None,
        }
    }
}

fn row_suffix(hkey: Option<&str>) -> String {
    hkey.map(|hkey| format!(" row {hkey}")).unwrap_or_default()
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Wrong cursor state, mismatched row types, unrelated branches.
    InvariantViolation,
    Cancelled,
    DuplicateKey,
    Storage,
    /// Operation not offered by this cursor or row variant.
    Unsupported,
    NotFound,
    Corruption,
    Internal,
}

impl ErrorClass {
    /// Classes that force the active transaction to roll back.
    #[must_use]
    pub const fn requires_rollback(self) -> bool {
        matches!(self, Self::DuplicateKey | Self::Storage | Self::Cancelled)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvariantViolation => "invariant_violation",
            Self::Cancelled => "cancelled",
            Self::DuplicateKey => "duplicate_key",
            Self::Storage => "storage",
            Self::Unsupported => "unsupported",
            Self::NotFound => "not_found",
            Self::Corruption => "corruption",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Cursor,
    HKey,
    RowType,
    Row,
    Schema,
    Adapter,
    Store,
    Sort,
    Sequence,
    Serialize,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Cursor => "cursor",
            Self::HKey => "hkey",
            Self::RowType => "row_type",
            Self::Row => "row",
            Self::Schema => "schema",
            Self::Adapter => "adapter",
            Self::Store => "store",
            Self::Sort => "sort",
            Self::Sequence => "sequence",
            Self::Serialize => "serialize",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn interrupted_store_error_translates_to_cancellation() {
        let err = InternalError::from(StoreError::Interrupted);

        assert_eq!(err.class, ErrorClass::Cancelled);
        assert!(err.requires_rollback());
    }

    #[test]
    fn wrapped_io_interruption_translates_to_cancellation() {
        let io_err = io::Error::new(io::ErrorKind::Interrupted, "read interrupted");
        let err = InternalError::from(StoreError::Io(io_err));

        assert!(err.is_cancelled());
    }

    #[test]
    fn other_store_failures_translate_to_storage() {
        let io_err = io::Error::other("disk on fire");
        let err = InternalError::from(StoreError::Io(io_err));

        assert_eq!(err.class, ErrorClass::Storage);
        assert_eq!(err.origin, ErrorOrigin::Adapter);
        assert!(matches!(err.detail, Some(ErrorDetail::Store(_))));
    }

    #[test]
    fn duplicate_key_keeps_its_class() {
        let err = InternalError::from(StoreError::DuplicateKey {
            key: "customers(1)".to_string(),
        });

        assert_eq!(err.class, ErrorClass::DuplicateKey);
        assert!(err.requires_rollback());
    }

    #[test]
    fn precondition_and_capability_errors_never_force_rollback() {
        assert!(!InternalError::cursor_invariant("x").requires_rollback());
        assert!(!InternalError::cursor_unsupported("x").requires_rollback());
        assert!(!InternalError::no_such_sequence("s").requires_rollback());
    }

    #[test]
    fn row_detail_renders_table_and_position() {
        let err = InternalError::adapter_invariant("boom").with_row("orders", "{1,(1)}");

        let detail = err.detail.expect("row detail should be attached");
        assert_eq!(detail.to_string(), "table 'orders' row {1,(1)}");
    }

    #[test]
    fn table_context_keeps_the_storage_cause() {
        let err = InternalError::from(StoreError::Io(io::Error::other("disk on fire")))
            .with_table("customers", None);

        let detail = err.detail.expect("table detail should be attached");
        assert_eq!(detail.table(), Some("customers"));
        assert!(matches!(detail.store_error(), Some(StoreError::Io(_))));
        assert!(detail.to_string().starts_with("table 'customers': "));
    }

    #[test]
    fn table_context_does_not_replace_row_context() {
        let err = InternalError::adapter_invariant("boom")
            .with_row("orders", "{1,(1)}")
            .with_table("customers", None);

        let detail = err.detail.expect("row detail should be kept");
        assert_eq!(detail.to_string(), "table 'orders' row {1,(1)}");
    }
}
