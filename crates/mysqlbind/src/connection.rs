//! Native connection handle.
//!
//! A thin wrapper over `MYSQL*`: options, connect, ping, character set and
//! version queries are passed straight through to the client library. The
//! only decision made here is the descriptor flag representation, resolved
//! once per connection from the linked library's version.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]

use std::ffi::{CString, c_uint, c_void};
use std::ptr::{self, NonNull};
use std::sync::OnceLock;

use mysqlbind_core::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, LibraryVersion, Result,
    StatementError, StatementErrorKind,
};

use crate::codec::FlagRepr;
use crate::config::ClientConfig;
use crate::ffi;
use crate::statement::{Statement, StmtHandle};

static LIBRARY_INIT: OnceLock<std::result::Result<(), i32>> = OnceLock::new();

/// Run `mysql_library_init` once per process.
fn init_library() -> Result<()> {
    let outcome = LIBRARY_INIT.get_or_init(|| {
        // SAFETY: no arguments and no option groups; guarded by OnceLock
        let rc = unsafe { ffi::mysql_server_init(0, ptr::null_mut(), ptr::null_mut()) };
        tracing::debug!(rc, "initialized client library");
        if rc == 0 { Ok(()) } else { Err(rc) }
    });

    outcome.map_err(|rc| {
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Init,
            errno: 0,
            message: format!("mysql_library_init failed with code {rc}"),
        })
    })
}

/// Version of the linked client library.
///
/// Taken from `mysql_get_client_version()`, or parsed from
/// [`client_info`] when the library reports a zero id.
pub fn client_version() -> LibraryVersion {
    // SAFETY: reads a compile-time constant of the library
    let id = unsafe { ffi::mysql_get_client_version() };
    let id = u32::try_from(id).unwrap_or(0);
    let info = client_info();
    LibraryVersion::from_client(id, info.as_deref()).unwrap_or_else(|| {
        tracing::warn!(id, info = ?info, "cannot determine client library version");
        LibraryVersion::from_id(id)
    })
}

/// Version string of the linked client library, e.g. `"8.0.36"`.
pub fn client_info() -> Option<String> {
    // SAFETY: returns a static string or null
    unsafe { ffi::owned_string(ffi::mysql_get_client_info()) }
}

fn cstring(name: &str, value: &str) -> Result<CString> {
    CString::new(value).map_err(|e| {
        Error::Config(ConfigError {
            message: format!("{name} contains a NUL byte"),
            source: Some(Box::new(e)),
        })
    })
}

/// A connection to a MySQL-family server through libmysqlclient.
pub struct Connection {
    handle: NonNull<ffi::MYSQL>,
    repr: FlagRepr,
}

// SAFETY: a MYSQL handle may move between threads as long as it is used by
// one thread at a time, which `&mut self`/`!Sync` enforces.
unsafe impl Send for Connection {}

impl Connection {
    /// Open a connection with the given configuration.
    #[tracing::instrument(level = "debug", skip(config), fields(host = %config.host, port = config.port))]
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        init_library()?;

        // SAFETY: a null argument asks the library to allocate the handle
        let raw = unsafe { ffi::mysql_init(ptr::null_mut()) };
        let handle = NonNull::new(raw).ok_or_else(|| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Init,
                errno: mysqlbind_core::error::codes::CR_OUT_OF_MEMORY,
                message: "mysql_init returned null".to_string(),
            })
        })?;

        let detected = FlagRepr::for_version(client_version());
        let repr = config.flag_repr.unwrap_or(detected);
        if repr != detected {
            tracing::warn!(%repr, %detected, "flag representation overridden by configuration");
        }

        // Closes the handle on every early return below
        let conn = Self { handle, repr };
        conn.apply_options(config)?;

        let host = cstring("host", &config.host)?;
        let user = cstring("user", &config.user)?;
        let password = config
            .password
            .as_deref()
            .map(|p| cstring("password", p))
            .transpose()?;
        let database = config
            .database
            .as_deref()
            .map(|d| cstring("database", d))
            .transpose()?;
        let socket = config
            .unix_socket
            .as_deref()
            .map(|s| cstring("unix_socket", s))
            .transpose()?;

        let host_ptr = if config.host.is_empty() {
            ptr::null()
        } else {
            host.as_ptr()
        };

        // SAFETY: every pointer is a live CString or null
        let connected = unsafe {
            ffi::mysql_real_connect(
                conn.handle.as_ptr(),
                host_ptr,
                user.as_ptr(),
                password.as_ref().map_or(ptr::null(), |p| p.as_ptr()),
                database.as_ref().map_or(ptr::null(), |d| d.as_ptr()),
                c_uint::from(config.port),
                socket.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
                config.capability_flags(),
            )
        };
        if connected.is_null() {
            let err = conn.last_error();
            tracing::warn!(errno = err.errno, message = %err.message, "connect failed");
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::from_errno(err.errno),
                ..err
            }));
        }

        conn.set_character_set(&config.charset)?;

        tracing::debug!(
            server = %conn.server_version(),
            client = %client_version(),
            %repr,
            "connected"
        );
        Ok(conn)
    }

    fn apply_options(&self, config: &ClientConfig) -> Result<()> {
        let timeouts = [
            (ffi::MYSQL_OPT_CONNECT_TIMEOUT, config.connect_timeout),
            (ffi::MYSQL_OPT_READ_TIMEOUT, config.read_timeout),
            (ffi::MYSQL_OPT_WRITE_TIMEOUT, config.write_timeout),
        ];
        for (option, timeout) in timeouts {
            if timeout.is_zero() {
                continue;
            }
            let secs = c_uint::try_from(timeout.as_secs()).unwrap_or(c_uint::MAX);
            self.set_option(option, ptr::from_ref(&secs).cast())?;
        }

        let protocol = config.protocol();
        self.set_option(ffi::MYSQL_OPT_PROTOCOL, ptr::from_ref(&protocol).cast())?;

        let local_infile = c_uint::from(config.local_infile);
        self.set_option(ffi::MYSQL_OPT_LOCAL_INFILE, ptr::from_ref(&local_infile).cast())?;

        if config.compression {
            self.set_option(ffi::MYSQL_OPT_COMPRESS, ptr::null())?;
        }

        let charset = cstring("charset", &config.charset)?;
        self.set_option(ffi::MYSQL_SET_CHARSET_NAME, charset.as_ptr().cast())?;

        if let Some(sql) = &config.init_command {
            let sql = cstring("init_command", sql)?;
            self.set_option(ffi::MYSQL_INIT_COMMAND, sql.as_ptr().cast())?;
        }

        Ok(())
    }

    fn set_option(&self, option: ffi::mysql_option, arg: *const c_void) -> Result<()> {
        // SAFETY: the handle is live; the library copies `arg` before returning
        let rc = unsafe { ffi::mysql_options(self.handle.as_ptr(), option, arg) };
        if rc == 0 {
            Ok(())
        } else {
            Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Option,
                errno: 0,
                message: format!("mysql_options rejected option {option}"),
            }))
        }
    }

    /// Flag representation used for every statement of this connection.
    pub fn flag_repr(&self) -> FlagRepr {
        self.repr
    }

    /// Version of the server this connection talks to.
    pub fn server_version(&self) -> LibraryVersion {
        // SAFETY: the handle is live
        let id = unsafe { ffi::mysql_get_server_version(self.handle.as_ptr()) };
        LibraryVersion::from_id(id as u32)
    }

    /// Version of the linked client library.
    pub fn client_version(&self) -> LibraryVersion {
        client_version()
    }

    /// Check that the server is still reachable.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn ping(&self) -> Result<()> {
        // SAFETY: the handle is live
        let rc = unsafe { ffi::mysql_ping(self.handle.as_ptr()) };
        if rc == 0 {
            return Ok(());
        }
        let err = self.last_error();
        Err(Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::from_errno(err.errno),
            ..err
        }))
    }

    /// Change the connection character set.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn set_character_set(&self, name: &str) -> Result<()> {
        let c_name = cstring("charset", name)?;
        // SAFETY: the handle is live and the name NUL-terminated
        let rc = unsafe { ffi::mysql_set_character_set(self.handle.as_ptr(), c_name.as_ptr()) };
        if rc == 0 {
            return Ok(());
        }
        Err(Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Option,
            ..self.last_error()
        }))
    }

    /// Name of the current connection character set.
    pub fn character_set_name(&self) -> String {
        // SAFETY: the handle is live; the name is owned by the library
        unsafe { ffi::owned_string(ffi::mysql_character_set_name(self.handle.as_ptr())) }
            .unwrap_or_default()
    }

    /// The last error reported on this connection handle.
    pub fn last_error(&self) -> ConnectionError {
        // SAFETY: the handle is live
        let (errno, message) = unsafe {
            (
                ffi::mysql_errno(self.handle.as_ptr()),
                ffi::owned_string(ffi::mysql_error(self.handle.as_ptr())),
            )
        };
        ConnectionError {
            kind: ConnectionErrorKind::from_errno(errno),
            errno,
            message: message.unwrap_or_default(),
        }
    }

    fn last_sqlstate(&self) -> Option<String> {
        // SAFETY: the handle is live
        unsafe { ffi::owned_string(ffi::mysql_sqlstate(self.handle.as_ptr())) }
    }

    /// Prepare a statement on this connection.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        // SAFETY: the handle is live
        let raw = unsafe { ffi::mysql_stmt_init(self.handle.as_ptr()) };
        if raw.is_null() {
            let err = self.last_error();
            return Err(Error::Statement(StatementError {
                kind: StatementErrorKind::Init,
                errno: err.errno,
                sqlstate: self.last_sqlstate(),
                message: err.message,
                sql: Some(sql.to_string()),
            }));
        }

        // Closes the statement handle if prepare fails
        let handle = StmtHandle::new(raw);

        // SAFETY: the statement handle is live; the length bounds the text
        let rc = unsafe {
            ffi::mysql_stmt_prepare(raw, sql.as_ptr().cast(), sql.len() as std::ffi::c_ulong)
        };
        if rc != 0 {
            let err = handle.error(Some(sql));
            tracing::warn!(errno = err.errno, message = %err.message, "prepare failed");
            return Err(Error::Statement(err));
        }

        Ok(Statement::new(handle, self.repr, sql))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // SAFETY: the handle is live and closed exactly once
        unsafe { ffi::mysql_close(self.handle.as_ptr()) };
        tracing::trace!("closed connection");
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("handle", &self.handle)
            .field("repr", &self.repr)
            .finish()
    }
}
