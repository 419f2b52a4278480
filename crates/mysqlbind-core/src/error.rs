//! Error types for the binding layer.
//!
//! Native failures keep the client library's errno, SQLSTATE and message
//! verbatim. The `kind` fields are a classification layered on top and never
//! replace the original code.

use std::fmt;

/// The primary error type for all binding operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-level failures (init, connect, ping, options)
    Connection(ConnectionError),
    /// Prepared statement failures (prepare, bind, execute, fetch)
    Statement(StatementError),
    /// Descriptor misuse caught before reaching the native library
    Bind(BindError),
    /// Configuration errors
    Config(ConfigError),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    /// Native errno (`mysql_errno`), 0 when the failure happened before a handle existed
    pub errno: u32,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Library or handle initialization failed
    Init,
    /// Failed to establish connection
    Connect,
    /// Authentication failed
    Authentication,
    /// Connection lost during operation
    Disconnected,
    /// Connection refused or host unreachable
    Refused,
    /// Setting an option or character set failed
    Option,
}

#[derive(Debug)]
pub struct StatementError {
    pub kind: StatementErrorKind,
    /// Native errno (`mysql_stmt_errno`)
    pub errno: u32,
    pub sqlstate: Option<String>,
    pub message: String,
    pub sql: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementErrorKind {
    /// Statement handle could not be allocated
    Init,
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Data too large for the bound buffer
    DataTruncation,
    /// Deadlock detected
    Deadlock,
    /// Connection dropped while the statement was running
    Disconnected,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct BindError {
    pub kind: BindErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindErrorKind {
    /// Descriptor count does not match the prepared statement
    CountMismatch,
    /// Fetch attempted without bound result descriptors
    NotBound,
}

impl BindError {
    /// `what` descriptors were supplied where the statement has `expected`.
    pub fn count_mismatch(what: &str, expected: usize, actual: usize) -> Self {
        Self {
            kind: BindErrorKind::CountMismatch,
            message: format!("{what}: statement expects {expected} descriptors, got {actual}"),
        }
    }

    pub fn not_bound() -> Self {
        Self {
            kind: BindErrorKind::NotBound,
            message: "no result descriptors are bound to the statement".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(c) => matches!(
                c.kind,
                ConnectionErrorKind::Connect
                    | ConnectionErrorKind::Authentication
                    | ConnectionErrorKind::Disconnected
                    | ConnectionErrorKind::Refused
            ),
            Error::Statement(s) => s.kind == StatementErrorKind::Disconnected,
            _ => false,
        }
    }

    /// The native errno, if this error came from the client library.
    pub fn errno(&self) -> Option<u32> {
        match self {
            Error::Connection(c) if c.errno != 0 => Some(c.errno),
            Error::Statement(s) if s.errno != 0 => Some(s.errno),
            _ => None,
        }
    }

    /// Get SQLSTATE if available (e.g., "23000" for a duplicate key)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Statement(s) => s.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Statement(s) => s.sql.as_deref(),
            _ => None,
        }
    }
}

impl ConnectionErrorKind {
    /// Classify a client/server errno raised on a connection handle.
    pub fn from_errno(errno: u32) -> Self {
        match errno {
            codes::ER_ACCESS_DENIED_ERROR | codes::ER_DBACCESS_DENIED_ERROR => {
                ConnectionErrorKind::Authentication
            }
            codes::CR_CONNECTION_ERROR | codes::CR_CONN_HOST_ERROR | codes::CR_UNKNOWN_HOST => {
                ConnectionErrorKind::Refused
            }
            codes::CR_SERVER_GONE_ERROR | codes::CR_SERVER_LOST => {
                ConnectionErrorKind::Disconnected
            }
            _ => ConnectionErrorKind::Connect,
        }
    }
}

impl StatementErrorKind {
    /// Classify an errno raised on a statement handle.
    pub fn from_errno(errno: u32) -> Self {
        match errno {
            codes::ER_PARSE_ERROR | codes::ER_SYNTAX_ERROR => StatementErrorKind::Syntax,
            codes::ER_DUP_ENTRY
            | codes::ER_NO_REFERENCED_ROW_2
            | codes::ER_ROW_IS_REFERENCED_2
            | codes::ER_BAD_NULL_ERROR => StatementErrorKind::Constraint,
            codes::ER_NO_SUCH_TABLE | codes::ER_BAD_FIELD_ERROR => StatementErrorKind::NotFound,
            codes::ER_TABLEACCESS_DENIED_ERROR | codes::ER_SPECIFIC_ACCESS_DENIED_ERROR => {
                StatementErrorKind::Permission
            }
            codes::ER_DATA_TOO_LONG | codes::ER_WARN_DATA_OUT_OF_RANGE => {
                StatementErrorKind::DataTruncation
            }
            codes::ER_LOCK_DEADLOCK | codes::ER_LOCK_WAIT_TIMEOUT => StatementErrorKind::Deadlock,
            codes::CR_SERVER_GONE_ERROR | codes::CR_SERVER_LOST => {
                StatementErrorKind::Disconnected
            }
            _ => StatementErrorKind::Database,
        }
    }
}

/// Client (`CR_*`) and server (`ER_*`) error numbers used for classification.
pub mod codes {
    pub const CR_CONNECTION_ERROR: u32 = 2002;
    pub const CR_CONN_HOST_ERROR: u32 = 2003;
    pub const CR_UNKNOWN_HOST: u32 = 2005;
    pub const CR_SERVER_GONE_ERROR: u32 = 2006;
    pub const CR_OUT_OF_MEMORY: u32 = 2008;
    pub const CR_SERVER_LOST: u32 = 2013;

    pub const ER_DBACCESS_DENIED_ERROR: u32 = 1044;
    pub const ER_ACCESS_DENIED_ERROR: u32 = 1045;
    pub const ER_BAD_NULL_ERROR: u32 = 1048;
    pub const ER_BAD_FIELD_ERROR: u32 = 1054;
    pub const ER_DUP_ENTRY: u32 = 1062;
    pub const ER_PARSE_ERROR: u32 = 1064;
    pub const ER_NO_SUCH_TABLE: u32 = 1146;
    pub const ER_SYNTAX_ERROR: u32 = 1149;
    pub const ER_TABLEACCESS_DENIED_ERROR: u32 = 1142;
    pub const ER_SPECIFIC_ACCESS_DENIED_ERROR: u32 = 1227;
    pub const ER_LOCK_WAIT_TIMEOUT: u32 = 1205;
    pub const ER_LOCK_DEADLOCK: u32 = 1213;
    pub const ER_WARN_DATA_OUT_OF_RANGE: u32 = 1264;
    pub const ER_NO_REFERENCED_ROW_2: u32 = 1452;
    pub const ER_ROW_IS_REFERENCED_2: u32 = 1451;
    pub const ER_DATA_TOO_LONG: u32 = 1406;
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e),
            Error::Statement(e) => write!(f, "Statement error: {}", e),
            Error::Bind(e) => write!(f, "Bind error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errno == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} (errno {})", self.message, self.errno)
        }
    }
}

impl fmt::Display for StatementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sqlstate {
            Some(sqlstate) => write!(
                f,
                "{} (errno {}, SQLSTATE {})",
                self.message, self.errno, sqlstate
            ),
            None => write!(f, "{} (errno {})", self.message, self.errno),
        }
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<StatementError> for Error {
    fn from(err: StatementError) -> Self {
        Error::Statement(err)
    }
}

impl From<BindError> for Error {
    fn from(err: BindError) -> Self {
        Error::Bind(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for binding operations.
pub type Result<T> = std::result::Result<T, Error>;
