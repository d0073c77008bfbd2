// Stats fetcher: one HTTP/1.1 round trip over a raw TCP socket, then the CSV line parser.
// The socket lives only inside `round_trip`, so it is closed on every exit path.

use std::fmt;
use std::io;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::instrument;

use crate::config::ServerConfig;
use crate::models::MetricsSnapshot;
use crate::version;

/// Fields every stats line must carry, in wire order.
pub const REQUIRED_FIELDS: usize = 6;

/// How many comma-separated fields a stats line may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCountPolicy {
    /// Exactly six fields; anything else is a format error.
    #[default]
    Exact,
    /// Six or more; a seventh field is read as used network, the rest are ignored.
    AtLeast,
}

impl FieldCountPolicy {
    fn accepts(self, count: usize) -> bool {
        match self {
            FieldCountPolicy::Exact => count == REQUIRED_FIELDS,
            FieldCountPolicy::AtLeast => count >= REQUIRED_FIELDS,
        }
    }
}

impl fmt::Display for FieldCountPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldCountPolicy::Exact => write!(f, "{}", REQUIRED_FIELDS),
            FieldCountPolicy::AtLeast => write!(f, "at least {}", REQUIRED_FIELDS),
        }
    }
}

/// What `used_network` becomes when the line carries no seventh field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingNetworkUsage {
    /// Report zero; with the evaluator's usage gate the network check is skipped.
    #[default]
    Zero,
    /// Assume the link is saturated (used = total).
    Total,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseOptions {
    pub field_count: FieldCountPolicy,
    pub missing_network_usage: MissingNetworkUsage,
}

/// Coarse classification of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Connection,
    BadStatus,
    Format,
    Parse,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("connection failed: {0}")]
    Connect(#[source] io::Error),

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{stage} failed: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("non-200 status: {0}")]
    BadStatus(String),

    #[error("invalid data format: expected {expected} values, got {got}")]
    Format { expected: FieldCountPolicy, got: usize },

    #[error("parse {field} failed: {raw:?}")]
    Parse { field: &'static str, raw: String },
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Connect(_) | FetchError::Timeout(_) | FetchError::Io { .. } => {
                FetchErrorKind::Connection
            }
            FetchError::BadStatus(_) => FetchErrorKind::BadStatus,
            FetchError::Format { .. } => FetchErrorKind::Format,
            FetchError::Parse { .. } => FetchErrorKind::Parse,
        }
    }

    fn io(stage: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| FetchError::Io { stage, source }
    }

    fn eof(stage: &'static str) -> Self {
        FetchError::Io {
            stage,
            source: io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"),
        }
    }
}

/// Anything that can produce one metrics sample per call.
pub trait StatsSource {
    fn fetch(&self) -> impl Future<Output = Result<MetricsSnapshot, FetchError>> + Send;
}

pub struct StatsFetcher {
    host: String,
    port: u16,
    path: String,
    timeout: Duration,
    options: ParseOptions,
}

impl StatsFetcher {
    pub fn new(server: &ServerConfig, options: ParseOptions) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            path: server.path.clone(),
            timeout: server.timeout(),
            options,
        }
    }

    /// `host:port/path`, for logs.
    pub fn endpoint(&self) -> String {
        format!("{}:{}{}", self.host, self.port, self.path)
    }

    fn request(&self) -> String {
        let host = if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        };
        format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: text/plain\r\nConnection: close\r\n\r\n",
            self.path,
            host,
            version::user_agent()
        )
    }

    /// Connects, sends the request and returns the first body line with surrounding
    /// whitespace stripped.
    async fn round_trip(&self) -> Result<String, FetchError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(FetchError::Connect)?;
        let mut reader = BufReader::new(stream);

        reader
            .get_mut()
            .write_all(self.request().as_bytes())
            .await
            .map_err(FetchError::io("send request"))?;

        let status_line = read_line(&mut reader, "read status")
            .await?
            .ok_or_else(|| FetchError::eof("read status"))?;
        if !is_ok_status(&status_line) {
            return Err(FetchError::BadStatus(status_line.trim().to_string()));
        }

        let mut chunked = false;
        loop {
            let header = read_line(&mut reader, "read headers")
                .await?
                .ok_or_else(|| FetchError::eof("read headers"))?;
            let header = header.trim();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':')
                && name.trim().eq_ignore_ascii_case("transfer-encoding")
                && value.trim().eq_ignore_ascii_case("chunked")
            {
                chunked = true;
            }
        }

        if chunked {
            // chunk-size line precedes the payload
            read_line(&mut reader, "read body").await?;
        }
        let body = read_line(&mut reader, "read body").await?.unwrap_or_default();
        Ok(body.trim().to_string())
    }
}

impl StatsSource for StatsFetcher {
    #[instrument(skip(self), fields(endpoint = %self.endpoint()))]
    async fn fetch(&self) -> Result<MetricsSnapshot, FetchError> {
        let line = tokio::time::timeout(self.timeout, self.round_trip())
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;
        tracing::debug!(line = %line, "stats line received");
        parse_stats_line(&line, &self.options)
    }
}

/// Reads one line; `None` at EOF. A final line without a trailing newline is returned as-is.
async fn read_line(
    reader: &mut BufReader<TcpStream>,
    stage: &'static str,
) -> Result<Option<String>, FetchError> {
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .await
        .map_err(FetchError::io(stage))?;
    Ok((n > 0).then_some(line))
}

/// True for an `HTTP/x.y 200 ...` status line.
fn is_ok_status(status_line: &str) -> bool {
    let mut parts = status_line.split_whitespace();
    matches!(
        (parts.next(), parts.next()),
        (Some(proto), Some("200")) if proto.starts_with("HTTP/")
    )
}

fn parse_count(raw: &str, field: &'static str) -> Result<u64, FetchError> {
    raw.parse::<u64>().map_err(|_| FetchError::Parse {
        field,
        raw: raw.to_string(),
    })
}

fn parse_load_average(raw: &str) -> Result<f64, FetchError> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(FetchError::Parse {
            field: "load average",
            raw: raw.to_string(),
        }),
    }
}

/// Parses `load,total_mem,used_mem,total_disk,used_disk,total_net[,used_net]`.
///
/// Fields are trimmed individually. The first field that fails to parse is reported.
pub fn parse_stats_line(line: &str, options: &ParseOptions) -> Result<MetricsSnapshot, FetchError> {
    let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
    if !options.field_count.accepts(fields.len()) {
        return Err(FetchError::Format {
            expected: options.field_count,
            got: fields.len(),
        });
    }

    let load_average = parse_load_average(fields[0])?;
    let total_memory = parse_count(fields[1], "total memory")?;
    let used_memory = parse_count(fields[2], "used memory")?;
    let total_disk = parse_count(fields[3], "total disk")?;
    let used_disk = parse_count(fields[4], "used disk")?;
    let total_network = parse_count(fields[5], "total network")?;
    let used_network = match fields.get(REQUIRED_FIELDS) {
        Some(raw) => parse_count(raw, "used network")?,
        None => match options.missing_network_usage {
            MissingNetworkUsage::Zero => 0,
            MissingNetworkUsage::Total => total_network,
        },
    };

    Ok(MetricsSnapshot {
        load_average,
        total_memory,
        used_memory,
        total_disk,
        used_disk,
        total_network,
        used_network,
    })
}
