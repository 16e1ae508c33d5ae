//! Error types for the automigration library.

use std::fmt;
use thiserror::Error;

/// Main error type for automigration operations.
#[derive(Error, Debug)]
pub enum AutomigrateError {
    /// Attribute value is not a plain structure, or carries invalid fields.
    #[error("Invalid definition for {table}.{column}: {reason}")]
    InvalidDefinition {
        table: String,
        column: String,
        reason: String,
    },

    /// Column name uses the reserved `__` separator.
    #[error("Invalid column name {table}.{column}: `__` is reserved and may not be used in attribute or column names")]
    InvalidColumnName { table: String, column: String },

    /// Table, column or schema name that cannot be used as a PostgreSQL identifier.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Auto-increment column declared with a numeric type that cannot auto-increment.
    #[error(
        "Incompatible column type `{column_type}` for auto-incrementing column {table}.{column}: \
         leave the column type undefined or use SERIAL, BIGSERIAL or SMALLSERIAL"
    )]
    IncompatibleAutoIncrementType {
        table: String,
        column: String,
        column_type: String,
    },

    /// A connection could not be obtained or used.
    #[error("Connection failure: {message}\n  Context: {context}")]
    ConnectionFailure { message: String, context: String },

    /// Statement execution failed in the database driver.
    #[error("Database error: {0}")]
    Driver(#[from] DriverError),

    /// The constraint is already present in the database.
    #[error("Constraint {0} already exists")]
    ConstraintAlreadyExists(String),

    /// The constraint target table does not exist yet.
    #[error("Constraint {constraint} references missing table {target}")]
    ReferencedTableMissing { constraint: String, target: String },

    /// A deferred constraint could not be applied.
    #[error("Failed to apply constraint {constraint}: {message}")]
    ConstraintApplication { constraint: String, message: String },

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session was cancelled (SIGINT, teardown, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl AutomigrateError {
    /// Create a ConnectionFailure error with context about where it occurred.
    pub fn connection(message: impl fmt::Display, context: impl Into<String>) -> Self {
        AutomigrateError::ConnectionFailure {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an InvalidDefinition error.
    pub fn invalid_definition(
        table: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        AutomigrateError::InvalidDefinition {
            table: table.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error fails a single table definition (as opposed to the session).
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            AutomigrateError::InvalidDefinition { .. }
                | AutomigrateError::InvalidColumnName { .. }
                | AutomigrateError::InvalidIdentifier(_)
                | AutomigrateError::IncompatibleAutoIncrementType { .. }
        )
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            AutomigrateError::Config(_)
            | AutomigrateError::Yaml(_)
            | AutomigrateError::Json(_) => 1,
            AutomigrateError::ConnectionFailure { .. } => 2,
            AutomigrateError::InvalidDefinition { .. }
            | AutomigrateError::InvalidColumnName { .. }
            | AutomigrateError::InvalidIdentifier(_)
            | AutomigrateError::IncompatibleAutoIncrementType { .. } => 3,
            AutomigrateError::Driver(_)
            | AutomigrateError::ConstraintAlreadyExists(_)
            | AutomigrateError::ReferencedTableMissing { .. }
            | AutomigrateError::ConstraintApplication { .. } => 4,
            AutomigrateError::Cancelled => 5,
            AutomigrateError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Classified driver error code used by the duplicate-skip and retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverErrorCode {
    /// The object (constraint, table) already exists.
    DuplicateObject,
    /// A referenced relation does not exist.
    UndefinedTable,
    /// Anything else, carrying the raw SQLSTATE when known.
    Other(String),
}

/// Error returned by statement execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} ({code})")]
pub struct DriverError {
    pub code: DriverErrorCode,
    pub message: String,
}

impl fmt::Display for DriverErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverErrorCode::DuplicateObject => write!(f, "duplicate object"),
            DriverErrorCode::UndefinedTable => write!(f, "undefined table"),
            DriverErrorCode::Other(code) if code.is_empty() => write!(f, "unclassified"),
            DriverErrorCode::Other(code) => write!(f, "SQLSTATE {}", code),
        }
    }
}

impl DriverError {
    pub fn new(code: DriverErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Classify an error from a SQLSTATE code, falling back to the message text.
    pub fn classify(sqlstate: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        let code = match sqlstate {
            Some("42710") | Some("42P07") => DriverErrorCode::DuplicateObject,
            Some("42P01") => DriverErrorCode::UndefinedTable,
            Some(other) => DriverErrorCode::Other(other.to_string()),
            None if message.contains("already exists") => DriverErrorCode::DuplicateObject,
            None if message.contains("does not exist") => DriverErrorCode::UndefinedTable,
            None => DriverErrorCode::Other(String::new()),
        };
        Self { code, message }
    }

    pub fn is_duplicate(&self) -> bool {
        self.code == DriverErrorCode::DuplicateObject
    }

    pub fn is_undefined_table(&self) -> bool {
        self.code == DriverErrorCode::UndefinedTable
    }
}

impl From<tokio_postgres::Error> for DriverError {
    fn from(e: tokio_postgres::Error) -> Self {
        match e.as_db_error() {
            Some(db) => DriverError::classify(Some(db.code().code()), db.message()),
            None => DriverError::classify(None, e.to_string()),
        }
    }
}

impl From<tokio_postgres::Error> for AutomigrateError {
    fn from(e: tokio_postgres::Error) -> Self {
        AutomigrateError::Driver(e.into())
    }
}

/// Result type alias for automigration operations.
pub type Result<T> = std::result::Result<T, AutomigrateError>;
