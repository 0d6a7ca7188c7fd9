//! Access-log line parsing
//!
//! Two line formats are supported, tried in priority order:
//!
//! 1. **Structured**: the whole line is a JSON object, as written by a
//!    `log_format ... escape=json` nginx config.
//! 2. **Pattern**: freeform combined-log lines annotated with `key=value`
//!    pairs (`pool=`, `release=`, `upstream_status=`, `upstream_addr=`),
//!    matched with compiled regular expressions.
//!
//! Each variant returns a record or an explicit no-match; a line neither
//! variant understands yields `None` and is dropped by the caller. Parsing
//! never panics and never raises on the happy path.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One parsed access-log entry
///
/// Created from a raw line, consumed immediately by the detector, not
/// retained beyond window membership.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessRecord {
    /// Backend pool that served (or tried to serve) the request
    pub pool: Option<String>,

    /// Release/version tag carried by the log line
    pub release: Option<String>,

    /// Response status code; may be unknown for garbled lines
    pub status: Option<u16>,

    /// Status reported by the upstream, as logged
    pub upstream_status: Option<String>,

    /// Address of the specific upstream instance
    pub upstream_addr: Option<String>,

    /// Ingestion timestamp
    pub observed_at: DateTime<Utc>,
}

impl AccessRecord {
    /// Whether the response was a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        matches!(self.status, Some(s) if (500..600).contains(&s))
    }

    /// Whether the record carries a pool and can drive detection
    pub fn has_pool(&self) -> bool {
        self.pool.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// JSON field that arrives as a number or a quoted string
///
/// nginx emits `$status` as a string under `escape=json`; other log
/// pipelines write it as a number. Both are accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    String(String),
}

impl NumberOrString {
    fn as_status(&self) -> Option<u16> {
        match self {
            NumberOrString::Number(n) => u16::try_from(*n).ok(),
            NumberOrString::String(s) => s.trim().parse().ok(),
        }
    }

    fn into_string(self) -> String {
        match self {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::String(s) => s,
        }
    }
}

/// Structured access-log line shape
#[derive(Debug, Deserialize)]
struct StructuredLine {
    #[serde(default)]
    pool: Option<String>,
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    status: Option<NumberOrString>,
    #[serde(default)]
    upstream_status: Option<NumberOrString>,
    #[serde(default)]
    upstream_addr: Option<String>,
}

/// Ordered chain of line parsers; first match wins
pub struct ParserChain {
    pattern: PatternParser,
}

impl ParserChain {
    pub fn new() -> Self {
        Self {
            pattern: PatternParser::new(),
        }
    }

    /// Parse one raw line; `None` means no variant matched
    pub fn parse(&self, line: &str) -> Option<AccessRecord> {
        parse_structured(line).or_else(|| self.pattern.parse(line))
    }
}

impl Default for ParserChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Structured variant: the whole line is one JSON object
fn parse_structured(line: &str) -> Option<AccessRecord> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }

    let raw: StructuredLine = match serde_json::from_str(trimmed) {
        Ok(raw) => raw,
        Err(err) => {
            debug!(error = %err, "structured line rejected");
            return None;
        }
    };

    Some(AccessRecord {
        pool: raw.pool,
        release: raw.release,
        status: raw.status.as_ref().and_then(NumberOrString::as_status),
        upstream_status: raw.upstream_status.map(NumberOrString::into_string),
        upstream_addr: raw.upstream_addr,
        observed_at: Utc::now(),
    })
}

/// Pattern variant for freeform lines carrying `key=value` annotations
pub struct PatternParser {
    pool: Regex,
    release: Regex,
    status: Regex,
    upstream_status: Regex,
    upstream_addr: Regex,
}

impl PatternParser {
    pub fn new() -> Self {
        Self {
            pool: Regex::new(r"pool=(\w+)").expect("static pattern"),
            release: Regex::new(r"release=([\w.\-]+)").expect("static pattern"),
            status: Regex::new(r#""[A-Z]+\s+\S+\s+HTTP/[\d.]+"\s+(\d{3})"#)
                .expect("static pattern"),
            upstream_status: Regex::new(r"upstream_status=(\d+)").expect("static pattern"),
            upstream_addr: Regex::new(r"upstream_addr=([\d.:]+)").expect("static pattern"),
        }
    }

    /// Parse one freeform line; `None` when no field pattern matches
    pub fn parse(&self, line: &str) -> Option<AccessRecord> {
        let pool = capture(&self.pool, line);
        let release = capture(&self.release, line);
        let status = capture(&self.status, line).and_then(|s| s.parse().ok());
        let upstream_status = capture(&self.upstream_status, line);
        let upstream_addr = capture(&self.upstream_addr, line);

        if pool.is_none()
            && release.is_none()
            && status.is_none()
            && upstream_status.is_none()
            && upstream_addr.is_none()
        {
            return None;
        }

        Some(AccessRecord {
            pool,
            release,
            status,
            upstream_status,
            upstream_addr,
            observed_at: Utc::now(),
        })
    }
}

impl Default for PatternParser {
    fn default() -> Self {
        Self::new()
    }
}

fn capture(re: &Regex, line: &str) -> Option<String> {
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
