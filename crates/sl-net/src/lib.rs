//! Networking: URL validation, HTTP messages, the blocking client and text decoding.

pub mod client;
pub mod http;
pub mod text;
pub mod tls;
pub mod url;

pub use client::ClientConfig;
pub use client::ProxyClient;
pub use http::Header;
pub use http::HttpMethod;
pub use http::HttpRequest;
pub use http::HttpResponse;
pub use http::HttpStatusCode;
pub use http::HttpVersion;
pub use text::decode_text;
pub use tls::TlsSettings;
pub use tls::TlsVersion;
pub use url::RemoteUrl;
pub use url::Scheme;
