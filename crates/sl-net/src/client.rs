//! Blocking HTTP/1.1 client, one request per connection.

use crate::http::Header;
use crate::http::HttpMethod;
use crate::http::HttpRequest;
use crate::http::HttpResponse;
use crate::http::HttpStatusCode;
use crate::http::HttpVersion;
use crate::tls::TlsSettings;
use crate::tls::connect_tls;
use crate::url::RemoteUrl;
use brotli::Decompressor;
use flate2::read::DeflateDecoder;
use flate2::read::GzDecoder;
use flate2::read::ZlibDecoder;
use sl_core::LoaderError;
use sl_core::LoaderResult;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::io::Write;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
use std::time::Duration;
use tracing::debug;

const MAX_RESPONSE_HEAD_BYTES: usize = 128 * 1024;
const MAX_CHUNK_LINE_BYTES: usize = 8 * 1024;
const DEFAULT_USER_AGENT: &str = concat!("shell-loader/", env!("CARGO_PKG_VERSION"));

/// Object-safe stream for plain and TLS connections.
pub trait IoStream: Read + Write {}
impl<T> IoStream for T where T: Read + Write {}

pub type BoxedIoStream = Box<dyn IoStream>;

/// Client limits and identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Upper bound on the decoded body size.
    pub max_body_bytes: usize,
    pub user_agent: String,
    pub tls: TlsSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(20),
            max_body_bytes: 16 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            tls: TlsSettings::default(),
        }
    }
}

/// Client used to talk to the content proxy and third-party script hosts.
#[derive(Debug, Clone, Default)]
pub struct ProxyClient {
    config: ClientConfig,
}

impl ProxyClient {
    pub fn new(config: ClientConfig) -> LoaderResult<Self> {
        config.tls.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `GET url` with the default request headers.
    pub fn get(&self, raw_url: &str) -> LoaderResult<HttpResponse> {
        let url = RemoteUrl::parse(raw_url)?;
        let request = HttpRequest::get(url)
            .with_header("User-Agent", &self.config.user_agent)?
            .with_header("Accept", "*/*")?
            .with_header("Accept-Encoding", "gzip, deflate, br")?;
        self.execute(&request)
    }

    pub fn execute(&self, request: &HttpRequest) -> LoaderResult<HttpResponse> {
        debug!(url = request.url.as_str(), method = request.method.as_str(), "http request");
        let mut stream = self.open_stream(&request.url)?;

        stream.write_all(&request.encode()).map_err(|error| {
            LoaderError::new(
                "net.http.write_failed",
                format!("failed to write HTTP request bytes: {error}"),
            )
        })?;
        stream.flush().map_err(|error| {
            LoaderError::new(
                "net.http.flush_failed",
                format!("failed to flush HTTP request bytes: {error}"),
            )
        })?;

        let response = read_response(&mut *stream, request.method, self.config.max_body_bytes)?;
        debug!(
            url = request.url.as_str(),
            status = response.status.as_u16(),
            bytes = response.body.len(),
            "http response"
        );
        Ok(response)
    }

    fn open_stream(&self, url: &RemoteUrl) -> LoaderResult<BoxedIoStream> {
        let stream = connect(url, self.config.connect_timeout, self.config.read_timeout)?;
        if url.is_secure() {
            connect_tls(stream, url.connect_host(), &self.config.tls)
        } else {
            Ok(Box::new(stream))
        }
    }
}

fn connect(url: &RemoteUrl, connect_timeout: Duration, read_timeout: Duration) -> LoaderResult<TcpStream> {
    let addresses = (url.connect_host(), url.port())
        .to_socket_addrs()
        .map_err(|error| {
            LoaderError::new(
                "net.dns.resolve_failed",
                format!("failed to resolve `{}`: {error}", url.host()),
            )
        })?
        .collect::<Vec<_>>();

    let mut last_error = LoaderError::new(
        "net.transport.no_addresses",
        format!("no addresses available for `{}`", url.host()),
    );
    for address in addresses {
        match TcpStream::connect_timeout(&address, connect_timeout) {
            Ok(stream) => {
                let configured = stream
                    .set_read_timeout(Some(read_timeout))
                    .and_then(|()| stream.set_write_timeout(Some(read_timeout)))
                    .and_then(|()| stream.set_nodelay(true));
                if let Err(error) = configured {
                    last_error = LoaderError::new(
                        "net.transport.configure_failed",
                        format!("failed to configure socket for `{address}`: {error}"),
                    );
                    continue;
                }
                return Ok(stream);
            }
            Err(error) => {
                last_error = LoaderError::new(
                    "net.transport.connect_failed",
                    format!("failed to connect to `{address}`: {error}"),
                );
            }
        }
    }

    Err(last_error)
}

fn read_response(
    stream: &mut dyn Read,
    method: HttpMethod,
    max_body_bytes: usize,
) -> LoaderResult<HttpResponse> {
    let mut reader = BufReader::new(stream);
    let mut head = read_head(&mut reader)?.into_iter();
    let (version, status) = parse_status_line(&head.next().unwrap_or_default())?;
    let headers = head
        .map(|line| parse_header_line(&line))
        .collect::<LoaderResult<Vec<_>>>()?;

    if method == HttpMethod::Head || status.disallows_body() {
        return Ok(HttpResponse {
            version,
            status,
            headers,
            body: Vec::new(),
        });
    }

    let framing = headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case("transfer-encoding"));
    let chunked = header_contains(&headers, "transfer-encoding", "chunked");
    if framing.is_some() && !chunked {
        return Err(LoaderError::new(
            "net.http.transfer_encoding_unsupported",
            "only chunked transfer encoding is supported",
        ));
    }

    let raw_body = if chunked {
        read_chunked_body(&mut reader, max_body_bytes)?
    } else if let Some(length) = parse_content_length(&headers)? {
        ensure_within_cap(length, max_body_bytes)?;
        let mut body = vec![0_u8; length];
        reader
            .read_exact(&mut body)
            .map_err(|error| body_read_failed("content-length body", &error))?;
        body
    } else {
        // Every request is sent with `Connection: close`, so EOF ends the body.
        read_to_eof(&mut reader, max_body_bytes)?
    };

    let body = decode_content_encoding(&headers, raw_body)?;
    ensure_within_cap(body.len(), max_body_bytes)?;

    Ok(HttpResponse {
        version,
        status,
        headers,
        body,
    })
}

fn ensure_within_cap(len: usize, max_body_bytes: usize) -> LoaderResult<()> {
    if len > max_body_bytes {
        return Err(LoaderError::new(
            "net.http.body_too_large",
            format!("response body of {len} bytes exceeds the {max_body_bytes} byte cap"),
        ));
    }
    Ok(())
}

fn body_read_failed(what: &str, error: &std::io::Error) -> LoaderError {
    LoaderError::new(
        "net.http.read_body_failed",
        format!("failed while reading {what}: {error}"),
    )
}

enum Line {
    Complete(String),
    Eof,
    Overlong,
}

/// One LF-terminated line with its CR/LF stripped, reading at most `limit` bytes.
fn next_line(reader: &mut impl BufRead, limit: usize) -> std::io::Result<Line> {
    let mut raw = Vec::new();
    let read = reader
        .by_ref()
        .take(u64::try_from(limit).unwrap_or(u64::MAX))
        .read_until(b'\n', &mut raw)?;
    if raw.ends_with(b"\n") {
        raw.truncate(raw.len() - 1);
        if raw.ends_with(b"\r") {
            raw.truncate(raw.len() - 1);
        }
        return Ok(Line::Complete(String::from_utf8_lossy(&raw).into_owned()));
    }
    Ok(if read >= limit { Line::Overlong } else { Line::Eof })
}

/// Status line and header lines up to the blank line that ends the head.
fn read_head(reader: &mut impl BufRead) -> LoaderResult<Vec<String>> {
    let mut lines = Vec::new();
    let mut budget = MAX_RESPONSE_HEAD_BYTES;
    loop {
        let line = next_line(reader, budget).map_err(|error| {
            LoaderError::new(
                "net.http.read_head_failed",
                format!("failed while reading HTTP response head: {error}"),
            )
        })?;
        match line {
            Line::Complete(text) if text.is_empty() => return Ok(lines),
            Line::Complete(text) => {
                budget = budget.saturating_sub(text.len().saturating_add(2));
                lines.push(text);
            }
            Line::Eof => {
                return Err(LoaderError::new(
                    "net.http.unexpected_eof",
                    "unexpected EOF before response head completed",
                ));
            }
            Line::Overlong => {
                return Err(LoaderError::new(
                    "net.http.head_too_large",
                    format!("HTTP response head exceeds {MAX_RESPONSE_HEAD_BYTES} bytes"),
                ));
            }
        }
    }
}

fn parse_header_line(line: &str) -> LoaderResult<Header> {
    let Some((name, value)) = line.split_once(':') else {
        return Err(LoaderError::new(
            "net.http.header_invalid",
            format!("invalid HTTP header line `{line}`"),
        ));
    };
    Header::new(name.trim(), value.trim())
}

fn read_to_eof(reader: &mut impl Read, max_bytes: usize) -> LoaderResult<Vec<u8>> {
    // One byte past the cap is enough to tell an oversized body apart.
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let mut body = Vec::new();
    reader
        .by_ref()
        .take(limit)
        .read_to_end(&mut body)
        .map_err(|error| body_read_failed("response body", &error))?;
    ensure_within_cap(body.len(), max_bytes)?;
    Ok(body)
}

fn read_chunk_line(reader: &mut impl BufRead) -> LoaderResult<String> {
    let line = next_line(reader, MAX_CHUNK_LINE_BYTES)
        .map_err(|error| body_read_failed("chunked transfer line", &error))?;
    match line {
        Line::Complete(text) => Ok(text),
        Line::Eof => Err(LoaderError::new(
            "net.http.read_body_failed",
            "chunked body ended before its last chunk",
        )),
        Line::Overlong => Err(LoaderError::new(
            "net.http.chunk_line_too_large",
            format!("chunk metadata line exceeds {MAX_CHUNK_LINE_BYTES} bytes"),
        )),
    }
}

fn read_chunked_body(reader: &mut impl BufRead, max_bytes: usize) -> LoaderResult<Vec<u8>> {
    let mut decoded = Vec::new();
    loop {
        let size_line = read_chunk_line(reader)?;
        let size_token = size_line.split(';').next().unwrap_or_default().trim();
        if size_token.is_empty() {
            continue;
        }
        let size = usize::from_str_radix(size_token, 16).map_err(|error| {
            LoaderError::new(
                "net.http.chunk_size_invalid",
                format!("invalid chunk size `{size_token}`: {error}"),
            )
        })?;
        if size == 0 {
            // Trailers end with an empty line.
            while !read_chunk_line(reader)?.is_empty() {}
            return Ok(decoded);
        }

        let start = decoded.len();
        let end = start.saturating_add(size);
        ensure_within_cap(end, max_bytes)?;
        decoded.resize(end, 0);
        reader
            .read_exact(&mut decoded[start..])
            .map_err(|error| body_read_failed("chunk data", &error))?;
        if !read_chunk_line(reader)?.is_empty() {
            return Err(LoaderError::new(
                "net.http.chunk_terminator_invalid",
                "chunk data is missing trailing CRLF",
            ));
        }
    }
}

fn parse_status_line(line: &str) -> LoaderResult<(HttpVersion, HttpStatusCode)> {
    let mut parts = line.splitn(3, ' ');
    let version = HttpVersion::parse(parts.next().unwrap_or_default())?;
    let code_text = parts.next().unwrap_or_default();
    let code = code_text.parse::<u16>().map_err(|error| {
        LoaderError::new(
            "net.http.status_line_invalid",
            format!("invalid status code `{code_text}` in `{line}`: {error}"),
        )
    })?;
    Ok((version, HttpStatusCode::new(code)?))
}

fn parse_content_length(headers: &[Header]) -> LoaderResult<Option<usize>> {
    let mut value: Option<usize> = None;
    for header in headers
        .iter()
        .filter(|header| header.name.eq_ignore_ascii_case("content-length"))
    {
        let parsed = header.value.trim().parse::<usize>().map_err(|error| {
            LoaderError::new(
                "net.http.content_length_invalid",
                format!("invalid Content-Length `{}`: {error}", header.value),
            )
        })?;

        match value {
            Some(existing) if existing != parsed => {
                return Err(LoaderError::new(
                    "net.http.content_length_conflict",
                    "conflicting Content-Length headers in response",
                ));
            }
            _ => value = Some(parsed),
        }
    }
    Ok(value)
}

fn header_contains(headers: &[Header], name: &str, value: &str) -> bool {
    headers.iter().any(|header| {
        header.name.eq_ignore_ascii_case(name)
            && header
                .value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case(value))
    })
}

fn decode_content_encoding(headers: &[Header], body: Vec<u8>) -> LoaderResult<Vec<u8>> {
    let encodings = headers
        .iter()
        .filter(|header| header.name.eq_ignore_ascii_case("content-encoding"))
        .flat_map(|header| header.value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>();

    let mut decoded = body;
    for encoding in encodings.iter().rev() {
        decoded = match encoding.as_str() {
            "identity" => decoded,
            "gzip" | "x-gzip" => read_all(GzDecoder::new(Cursor::new(decoded)), "gzip")?,
            "deflate" => decode_deflate(decoded)?,
            "br" => read_all(Decompressor::new(Cursor::new(decoded), 4096), "brotli")?,
            _ => {
                return Err(LoaderError::new(
                    "net.http.content_encoding_unsupported",
                    format!("unsupported content encoding `{encoding}`"),
                ));
            }
        };
    }
    Ok(decoded)
}

fn decode_deflate(body: Vec<u8>) -> LoaderResult<Vec<u8>> {
    // Servers disagree on whether "deflate" carries the zlib wrapper.
    let mut zlib = Vec::new();
    if ZlibDecoder::new(Cursor::new(&body)).read_to_end(&mut zlib).is_ok() {
        return Ok(zlib);
    }
    read_all(DeflateDecoder::new(Cursor::new(body)), "deflate")
}

fn read_all(mut decoder: impl Read, label: &str) -> LoaderResult<Vec<u8>> {
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded).map_err(|error| {
        LoaderError::new(
            "net.http.decode_failed",
            format!("{label} decode failed: {error}"),
        )
    })?;
    Ok(decoded)
}
