//! HTTP request/response types.

use crate::url::RemoteUrl;
use sl_core::LoaderError;
use sl_core::LoaderResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
        }
    }

    pub(crate) fn parse(token: &str) -> LoaderResult<Self> {
        match token {
            "HTTP/1.0" => Ok(Self::Http10),
            "HTTP/1.1" => Ok(Self::Http11),
            other => Err(LoaderError::new(
                "net.http.version_unsupported",
                format!("unsupported response version `{other}`"),
            )),
        }
    }
}

/// Single header with a wire-safe name and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: &str, value: &str) -> LoaderResult<Self> {
        if name.is_empty() || !name.bytes().all(is_token_char) {
            return Err(LoaderError::new(
                "net.http.header_name_invalid",
                format!("invalid HTTP header name `{name}`"),
            ));
        }

        if value.bytes().any(|byte| matches!(byte, b'\r' | b'\n' | 0)) {
            return Err(LoaderError::new(
                "net.http.header_value_invalid",
                format!("invalid characters found in HTTP header `{name}`"),
            ));
        }

        Ok(Self {
            name: name.to_owned(),
            value: value.to_owned(),
        })
    }
}

fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .map(|header| header.value.as_str())
}

/// Outgoing request. Always sent with `Connection: close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: RemoteUrl,
    pub headers: Vec<Header>,
}

impl HttpRequest {
    pub fn get(url: RemoteUrl) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> LoaderResult<Self> {
        let header = Header::new(name, value)?;
        self.headers
            .retain(|existing| !existing.name.eq_ignore_ascii_case(name));
        self.headers.push(header);
        Ok(self)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn request_target(&self) -> String {
        self.url.path_and_query()
    }

    /// Serializes the request head, adding `Host` and `Connection` when absent.
    pub fn encode(&self) -> Vec<u8> {
        let mut head = format!(
            "{} {} {}\r\n",
            self.method.as_str(),
            self.request_target(),
            HttpVersion::Http11.as_str()
        );
        if self.header("host").is_none() {
            head.push_str(&format!("Host: {}\r\n", self.url.authority()));
        }
        for header in &self.headers {
            head.push_str(&format!("{}: {}\r\n", header.name, header.value));
        }
        if self.header("connection").is_none() {
            head.push_str("Connection: close\r\n");
        }
        head.push_str("\r\n");
        head.into_bytes()
    }
}

/// HTTP status code wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HttpStatusCode(u16);

impl HttpStatusCode {
    pub fn new(code: u16) -> LoaderResult<Self> {
        if (100..=599).contains(&code) {
            return Ok(Self(code));
        }

        Err(LoaderError::new(
            "net.http.status_invalid",
            format!("status code must be 100-599, got `{code}`"),
        ))
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn is_success(self) -> bool {
        (200..=299).contains(&self.0)
    }

    pub(crate) fn disallows_body(self) -> bool {
        (100..200).contains(&self.0) || self.0 == 204 || self.0 == 304
    }
}

/// Decoded response: transfer and content encodings already removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub version: HttpVersion,
    pub status: HttpStatusCode,
    pub headers: Vec<Header>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or("")
    }

    /// Body decoded with the declared (or sniffed) charset.
    pub fn text(&self) -> String {
        crate::text::decode_text(&self.body, self.content_type())
    }

    /// Turns a non-2xx response into `net.http.status`.
    pub fn error_for_status(self) -> LoaderResult<Self> {
        if self.status.is_success() {
            return Ok(self);
        }
        Err(LoaderError::new(
            "net.http.status",
            format!("server answered with status {}", self.status.as_u16()),
        ))
    }
}

fn is_token_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte)
}

#[cfg(test)]
mod tests {
    use super::Header;
    use super::HttpRequest;
    use super::HttpResponse;
    use super::HttpStatusCode;
    use super::HttpVersion;
    use crate::url::RemoteUrl;

    fn url(raw: &str) -> RemoteUrl {
        match RemoteUrl::parse(raw) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    #[test]
    fn encoded_head_carries_host_and_close() {
        let request = match HttpRequest::get(url("http://127.0.0.1:5000/site/a%20b.html?t=9"))
            .with_header("Accept", "text/html")
        {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };

        let encoded = String::from_utf8_lossy(&request.encode()).into_owned();
        assert_eq!(
            encoded,
            "GET /site/a%20b.html?t=9 HTTP/1.1\r\nHost: 127.0.0.1:5000\r\nAccept: text/html\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn rejects_header_injection() {
        assert!(Header::new("X-Test", "a\r\nb: c").is_err());
        assert!(Header::new("Bad Name", "v").is_err());
    }

    #[test]
    fn status_helpers() {
        assert!(HttpStatusCode::new(99).is_err());
        assert!(HttpStatusCode::new(600).is_err());

        let status = match HttpStatusCode::new(503) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let response = HttpResponse {
            version: HttpVersion::Http11,
            status,
            headers: Vec::new(),
            body: Vec::new(),
        };
        match response.error_for_status() {
            Ok(_) => panic!("503 treated as success"),
            Err(error) => assert_eq!(error.code, "net.http.status"),
        }
    }
}
