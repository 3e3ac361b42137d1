//! Structured logging.
//!
//! Log entries carry the connection and request identifiers assigned
//! by the server so lines from concurrent connections can be
//! correlated. Output goes to stderr in either JSON or a compact
//! single-line format; the minimum level is a process-wide atomic so
//! level checks stay cheap on hot paths.
//!
//! # Usage
//!
//! ```
//! use hearth_core::logging::LogContext;
//! use hearth_core::log_info;
//!
//! let ctx = LogContext::new(0x1234, Some(0x5678));
//! log_info!(ctx, "request completed", status => 200, bytes => 512);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Log severity, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Most verbose, for byte-level tracing.
    Trace,
    /// Debug information.
    Debug,
    /// Normal operation.
    Info,
    /// Unexpected but recoverable.
    Warn,
    /// An error that affected processing.
    Error,
}

impl LogLevel {
    /// Lowercase name, as emitted in JSON output.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Single-letter tag for compact output, derived from the name.
    #[must_use]
    pub fn tag(self) -> char {
        self.name()
            .chars()
            .next()
            .map_or('?', |c| c.to_ascii_uppercase())
    }

    fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Trace,
            1 => Self::Debug,
            2 => Self::Info,
            3 => Self::Warn,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static GLOBAL_LOG_LEVEL: AtomicUsize = AtomicUsize::new(LogLevel::Info as usize);
static JSON_OUTPUT: AtomicBool = AtomicBool::new(false);

/// Current process-wide minimum level.
#[inline]
#[must_use]
pub fn global_log_level() -> LogLevel {
    LogLevel::from_index(GLOBAL_LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set the process-wide minimum level.
pub fn set_global_log_level(level: LogLevel) {
    GLOBAL_LOG_LEVEL.store(level as usize, Ordering::Relaxed);
}

/// Select JSON (true) or compact (false) output.
pub fn set_json_output(json: bool) {
    JSON_OUTPUT.store(json, Ordering::Relaxed);
}

/// Returns true if `level` would currently be emitted.
#[inline]
#[must_use]
pub fn level_enabled(level: LogLevel) -> bool {
    level >= global_log_level()
}

/// Identifiers attached to every log entry from a connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogContext {
    /// Connection identifier, zero for server-level entries.
    pub connection_id: u64,
    /// Request identifier, when inside request processing.
    pub request_id: Option<u64>,
}

impl LogContext {
    /// Create a context from raw ids.
    #[must_use]
    pub fn new(connection_id: u64, request_id: Option<u64>) -> Self {
        Self {
            connection_id,
            request_id,
        }
    }

    /// Context for entries not tied to any connection.
    #[must_use]
    pub fn server() -> Self {
        Self::default()
    }

    /// The same context with a request id filled in.
    #[must_use]
    pub fn with_request(self, request_id: u64) -> Self {
        Self {
            request_id: Some(request_id),
            ..self
        }
    }
}

/// A structured log entry.
#[derive(Debug)]
pub struct LogEntry {
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Connection identifier (zero for server-level entries).
    pub connection_id: u64,
    /// Request identifier, when applicable.
    pub request_id: Option<u64>,
    /// Structured key-value fields (capped at 16).
    pub fields: Vec<(String, String)>,
    /// Milliseconds since the Unix epoch at creation.
    pub timestamp_ms: u64,
}

const MAX_FIELDS: usize = 16;

impl LogEntry {
    /// Create an entry with the given context.
    #[must_use]
    pub fn new(ctx: LogContext, level: LogLevel, message: impl Into<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            level,
            message: message.into(),
            connection_id: ctx.connection_id,
            request_id: ctx.request_id,
            fields: Vec::new(),
            timestamp_ms,
        }
    }

    /// Attach a structured field. Fields beyond the cap are dropped.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        if self.fields.len() < MAX_FIELDS {
            self.fields.push((key.into(), value.to_string()));
        }
        self
    }

    /// Render as a single JSON object.
    #[must_use]
    pub fn to_json(&self) -> String {
        let mut json = format!(
            r#"{{"timestamp_ms":{},"level":"{}","message":"{}","connection_id":{}"#,
            self.timestamp_ms,
            self.level,
            escape_json(&self.message),
            self.connection_id,
        );
        if let Some(request_id) = self.request_id {
            json.push_str(&format!(r#","request_id":{request_id}"#));
        }
        if !self.fields.is_empty() {
            json.push_str(r#","fields":{"#);
            for (i, (key, value)) in self.fields.iter().enumerate() {
                if i > 0 {
                    json.push(',');
                }
                json.push_str(&format!(
                    r#""{}":"{}""#,
                    escape_json(key),
                    escape_json(value)
                ));
            }
            json.push('}');
        }
        json.push('}');
        json
    }

    /// Render in compact single-line format.
    #[must_use]
    pub fn to_compact(&self) -> String {
        let mut output = format!("[{}] conn={:016x}", self.level.tag(), self.connection_id);
        if let Some(request_id) = self.request_id {
            output.push_str(&format!(" req={request_id:016x}"));
        }
        output.push(' ');
        output.push_str(&self.message);
        if !self.fields.is_empty() {
            output.push_str(" {");
            for (i, (key, value)) in self.fields.iter().enumerate() {
                if i > 0 {
                    output.push_str(", ");
                }
                output.push_str(&format!("{key}={value}"));
            }
            output.push('}');
        }
        output
    }
}

/// Escape a string for embedding in a JSON field, in one pass.
fn escape_json(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Emit an entry to stderr if its level is enabled.
pub fn emit(entry: &LogEntry) {
    if !level_enabled(entry.level) {
        return;
    }
    if JSON_OUTPUT.load(Ordering::Relaxed) {
        eprintln!("{}", entry.to_json());
    } else {
        eprintln!("{}", entry.to_compact());
    }
}

/// Build and emit an entry in one call; used by the level macros.
pub fn log(ctx: LogContext, level: LogLevel, message: impl Into<String>) {
    if level_enabled(level) {
        emit(&LogEntry::new(ctx, level, message));
    }
}

/// Log at TRACE level with context.
///
/// ```ignore
/// log_trace!(ctx, "reading headers");
/// log_trace!(ctx, "chunk received", bytes => n);
/// ```
#[macro_export]
macro_rules! log_trace {
    ($ctx:expr, $msg:expr) => {
        $crate::logging::log($ctx, $crate::logging::LogLevel::Trace, $msg)
    };
    ($ctx:expr, $msg:expr, $($key:ident => $value:expr),+ $(,)?) => {
        if $crate::logging::level_enabled($crate::logging::LogLevel::Trace) {
            let entry = $crate::logging::LogEntry::new($ctx, $crate::logging::LogLevel::Trace, $msg)
                $(.field(stringify!($key), $value))+;
            $crate::logging::emit(&entry);
        }
    };
}

/// Log at DEBUG level with context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $msg:expr) => {
        $crate::logging::log($ctx, $crate::logging::LogLevel::Debug, $msg)
    };
    ($ctx:expr, $msg:expr, $($key:ident => $value:expr),+ $(,)?) => {
        if $crate::logging::level_enabled($crate::logging::LogLevel::Debug) {
            let entry = $crate::logging::LogEntry::new($ctx, $crate::logging::LogLevel::Debug, $msg)
                $(.field(stringify!($key), $value))+;
            $crate::logging::emit(&entry);
        }
    };
}

/// Log at INFO level with context.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $msg:expr) => {
        $crate::logging::log($ctx, $crate::logging::LogLevel::Info, $msg)
    };
    ($ctx:expr, $msg:expr, $($key:ident => $value:expr),+ $(,)?) => {
        if $crate::logging::level_enabled($crate::logging::LogLevel::Info) {
            let entry = $crate::logging::LogEntry::new($ctx, $crate::logging::LogLevel::Info, $msg)
                $(.field(stringify!($key), $value))+;
            $crate::logging::emit(&entry);
        }
    };
}

/// Log at WARN level with context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $msg:expr) => {
        $crate::logging::log($ctx, $crate::logging::LogLevel::Warn, $msg)
    };
    ($ctx:expr, $msg:expr, $($key:ident => $value:expr),+ $(,)?) => {
        if $crate::logging::level_enabled($crate::logging::LogLevel::Warn) {
            let entry = $crate::logging::LogEntry::new($ctx, $crate::logging::LogLevel::Warn, $msg)
                $(.field(stringify!($key), $value))+;
            $crate::logging::emit(&entry);
        }
    };
}

/// Log at ERROR level with context.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $msg:expr) => {
        $crate::logging::log($ctx, $crate::logging::LogLevel::Error, $msg)
    };
    ($ctx:expr, $msg:expr, $($key:ident => $value:expr),+ $(,)?) => {
        if $crate::logging::level_enabled($crate::logging::LogLevel::Error) {
            let entry = $crate::logging::LogEntry::new($ctx, $crate::logging::LogLevel::Error, $msg)
                $(.field(stringify!($key), $value))+;
            $crate::logging::emit(&entry);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn level_names_and_tags() {
        assert_eq!(LogLevel::Info.name(), "info");
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Warn.tag(), 'W');
        assert_eq!(LogLevel::Error.tag(), 'E');
    }

    #[test]
    fn level_survives_global_round_trip() {
        let previous = global_log_level();
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            set_global_log_level(level);
            assert_eq!(global_log_level(), level);
        }
        set_global_log_level(previous);
    }

    #[test]
    fn entry_json_shape() {
        let ctx = LogContext::new(7, Some(9));
        let entry = LogEntry::new(ctx, LogLevel::Info, "served file")
            .field("path", "/assets/doc.txt")
            .field("bytes", 20);

        let json = entry.to_json();
        assert!(json.contains(r#""level":"info""#));
        assert!(json.contains(r#""message":"served file""#));
        assert!(json.contains(r#""connection_id":7"#));
        assert!(json.contains(r#""request_id":9"#));
        assert!(json.contains(r#""path":"/assets/doc.txt""#));
        assert!(json.contains(r#""bytes":"20""#));
    }

    #[test]
    fn entry_compact_shape() {
        let entry = LogEntry::new(LogContext::new(0xab, None), LogLevel::Warn, "recv timeout");
        let compact = entry.to_compact();
        assert!(compact.starts_with("[W] conn=00000000000000ab"));
        assert!(compact.contains("recv timeout"));
        assert!(!compact.contains("req="));
    }

    #[test]
    fn json_escaping() {
        let entry = LogEntry::new(LogContext::server(), LogLevel::Error, "bad \"value\"\n");
        assert!(entry.to_json().contains(r#"bad \"value\"\n"#));
    }

    #[test]
    fn fields_are_capped() {
        let mut entry = LogEntry::new(LogContext::server(), LogLevel::Info, "caps");
        for i in 0..32 {
            entry = entry.field(format!("k{i}"), i);
        }
        assert_eq!(entry.fields.len(), 16);
    }

    #[test]
    fn context_with_request() {
        let ctx = LogContext::new(1, None).with_request(2);
        assert_eq!(ctx.connection_id, 1);
        assert_eq!(ctx.request_id, Some(2));
    }
}
