//! Static file serving.
//!
//! Activated for GET requests whose path begins with the configured
//! URL prefix. The handler strips the prefix, rejects traversal
//! attempts, resolves the target under the root with a weak
//! canonicalization (symlinks resolved where the path exists, a
//! missing tail tolerated), and then serves the file either from the
//! in-memory cache or as a stream descriptor depending on size.
//!
//! # Security
//!
//! Two independent checks guard the root: the relative path may not
//! contain `..` anywhere, and the canonicalized target must remain a
//! prefix-descendant of the canonicalized root. Either violation is a
//! 403.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::cache::FileCache;
use crate::log_debug;
use crate::log_error;
use crate::logging::LogContext;
use crate::range::content_range_unsatisfiable;
use crate::request::{Method, Request};
use crate::response::{
    mime_type_for_extension, Response, StatusCode, StreamDescriptor,
};
use crate::routing::error_response;

/// Files larger than this are streamed from disk instead of cached.
pub const DEFAULT_STREAM_THRESHOLD: u64 = 1024 * 1024;

/// Static file handler configuration: filesystem root and URL prefix.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    url_prefix: String,
    stream_threshold: u64,
}

impl StaticFiles {
    /// Create a handler serving `root` under `url_prefix`.
    ///
    /// The prefix is normalized to start and end with `/`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        let mut prefix = String::from(url_prefix);
        if !prefix.starts_with('/') {
            prefix.insert(0, '/');
        }
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self {
            root: root.into(),
            url_prefix: prefix,
            stream_threshold: DEFAULT_STREAM_THRESHOLD,
        }
    }

    /// Override the size threshold above which files are streamed.
    #[must_use]
    pub fn with_stream_threshold(mut self, threshold: u64) -> Self {
        self.stream_threshold = threshold;
        self
    }

    /// The configured URL prefix (always `/`-wrapped).
    #[must_use]
    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Serve a request if it targets the static prefix.
    ///
    /// Returns `None` when the request is not for this handler (wrong
    /// method or prefix); the router then falls through to its routes.
    #[must_use]
    pub fn serve(&self, request: &Request, cache: &FileCache, ctx: LogContext) -> Option<Response> {
        if request.method != Method::Get {
            return None;
        }
        let relative = request.path.strip_prefix(self.url_prefix.as_str())?;

        let prefers_html = request.prefers_html();

        if relative.contains("..") {
            log_error!(ctx, "path traversal attempt", path => &request.path);
            return Some(error_response(StatusCode::FORBIDDEN, "Access denied", prefers_html));
        }

        let full_path = self.root.join(relative);

        let resolved = match weakly_canonicalize(&full_path) {
            Ok(path) => path,
            Err(err) => {
                log_error!(ctx, "failed to resolve path", path => full_path.display(), error => err);
                return Some(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to resolve file",
                    prefers_html,
                ));
            }
        };

        let canonical_root = self.root.canonicalize().ok();
        let inside_root = canonical_root
            .as_ref()
            .is_some_and(|root| resolved.starts_with(root));
        if !inside_root {
            log_error!(ctx, "resolved path escapes static root", path => resolved.display());
            return Some(error_response(StatusCode::FORBIDDEN, "Access denied", prefers_html));
        }

        if !full_path.exists() || full_path.is_dir() {
            log_debug!(ctx, "static file not found", path => full_path.display());
            return Some(error_response(StatusCode::NOT_FOUND, "File not found", prefers_html));
        }

        let metadata = match std::fs::metadata(&full_path) {
            Ok(metadata) => metadata,
            Err(err) => {
                log_error!(ctx, "failed to stat file", path => full_path.display(), error => err);
                return Some(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to read file",
                    prefers_html,
                ));
            }
        };
        let file_size = metadata.len();
        let mtime = match metadata.modified() {
            Ok(mtime) => mtime,
            Err(err) => {
                log_error!(ctx, "failed to read mtime", path => full_path.display(), error => err);
                return Some(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to read file metadata",
                    prefers_html,
                ));
            }
        };

        let content_type = content_type_for(&full_path);

        // Range validation is identical for cached and streamed paths.
        let range = match request.range {
            Some(spec) => match spec.resolve(file_size) {
                Ok(resolved_range) => Some(resolved_range),
                Err(_) => {
                    log_debug!(
                        ctx,
                        "range not satisfiable",
                        path => full_path.display(),
                        size => file_size
                    );
                    let response =
                        error_response(StatusCode::RANGE_NOT_SATISFIABLE, "Invalid range", prefers_html)
                            .header("Content-Range", content_range_unsatisfiable(file_size));
                    return Some(response);
                }
            },
            None => None,
        };

        let mut response = if file_size <= self.stream_threshold {
            let content = match self.cached_content(&full_path, mtime, cache, ctx) {
                Ok(content) => content,
                Err(err) => {
                    log_error!(ctx, "failed to read file", path => full_path.display(), error => err);
                    return Some(error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to read file",
                        prefers_html,
                    ));
                }
            };
            match range {
                Some(r) => {
                    let slice = content[r.start as usize..=r.end as usize].to_vec();
                    Response::new(StatusCode::PARTIAL_CONTENT, slice, content_type)
                        .header("Content-Range", r.content_range(file_size))
                }
                None => Response::new(StatusCode::OK, content, content_type),
            }
        } else {
            match range {
                Some(r) => Response::stream(
                    StatusCode::PARTIAL_CONTENT,
                    StreamDescriptor {
                        path: full_path.clone(),
                        total_bytes: r.len(),
                        offset: r.start,
                    },
                    content_type,
                )
                .header("Content-Range", r.content_range(file_size)),
                None => Response::stream(
                    StatusCode::OK,
                    StreamDescriptor {
                        path: full_path.clone(),
                        total_bytes: file_size,
                        offset: 0,
                    },
                    content_type,
                ),
            }
        };

        response.set_header("Accept-Ranges", "bytes");
        response.set_header("Last-Modified", format_http_date(mtime));
        response.set_header("Cache-Control", "max-age=3600");
        log_debug!(
            ctx,
            "serving static file",
            path => full_path.display(),
            size => file_size,
            status => response.status.as_u16()
        );
        Some(response)
    }

    fn cached_content(
        &self,
        path: &Path,
        mtime: SystemTime,
        cache: &FileCache,
        ctx: LogContext,
    ) -> io::Result<Vec<u8>> {
        if let Some(entry) = cache.get(path, mtime) {
            log_debug!(ctx, "cache hit", path => path.display(), bytes => entry.content.len());
            return Ok(entry.content);
        }
        log_debug!(ctx, "cache miss", path => path.display());
        let content = std::fs::read(path)?;
        cache.put(path, content.clone(), mtime);
        Ok(content)
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => mime_type_for_extension(&format!(".{ext}")),
        None => "application/octet-stream",
    }
}

/// Resolve a path to absolute form, resolving symlinks where the path
/// exists and tolerating a non-existent tail. The deepest existing
/// ancestor is canonicalized and the remaining components appended
/// verbatim.
fn weakly_canonicalize(path: &Path) -> io::Result<PathBuf> {
    if let Ok(resolved) = path.canonicalize() {
        return Ok(resolved);
    }

    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(resolved) => {
                let mut out = resolved;
                for component in tail.iter().rev() {
                    out.push(component);
                }
                return Ok(out);
            }
            Err(_) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
                    tail.push(name.to_os_string());
                    existing = parent.to_path_buf();
                }
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        "no resolvable ancestor",
                    ))
                }
            },
        }
    }
}

const SECONDS_PER_DAY: u64 = 86_400;
// The Unix epoch fell on a Thursday.
const EPOCH_WEEKDAY: u64 = 4;

/// Format a timestamp as an RFC 7231 HTTP date, e.g.
/// `Sun, 02 Aug 2026 10:30:45 GMT`. Pre-epoch timestamps clamp to the
/// epoch.
#[must_use]
pub fn format_http_date(time: SystemTime) -> String {
    let secs = time
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs());

    let days = secs / SECONDS_PER_DAY;
    let time_of_day = secs % SECONDS_PER_DAY;
    let (year, month, day) = civil_from_days(days);

    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        weekday_name((days + EPOCH_WEEKDAY) % 7),
        day,
        month_name(month),
        year,
        time_of_day / 3600,
        time_of_day / 60 % 60,
        time_of_day % 60
    )
}

/// Convert days since the Unix epoch to a `(year, month, day)` civil
/// date, proleptic Gregorian.
///
/// Works on a calendar shifted to start on March 1st, so the leap day
/// lands at the end of the shifted year and every 400-year era is a
/// fixed 146097 days. No per-year iteration.
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    // Days since 0000-03-01 of the shifted calendar.
    let shifted = days + 719_468;
    let era = shifted / 146_097;
    let day_of_era = shifted % 146_097;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    // Months count from March here; 153 days per 5-month cycle.
    let month_from_march = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * month_from_march + 2) / 5 + 1;

    let year = year_of_era + era * 400;
    if month_from_march < 10 {
        (year, month_from_march + 3, day)
    } else {
        (year + 1, month_from_march - 9, day)
    }
}

fn weekday_name(weekday: u64) -> &'static str {
    match weekday {
        0 => "Sun",
        1 => "Mon",
        2 => "Tue",
        3 => "Wed",
        4 => "Thu",
        5 => "Fri",
        _ => "Sat",
    }
}

fn month_name(month: u64) -> &'static str {
    match month {
        1 => "Jan",
        2 => "Feb",
        3 => "Mar",
        4 => "Apr",
        5 => "May",
        6 => "Jun",
        7 => "Jul",
        8 => "Aug",
        9 => "Sep",
        10 => "Oct",
        11 => "Nov",
        _ => "Dec",
    }
}
