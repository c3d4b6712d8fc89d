//! TLS settings and the rustls connector.

use crate::client::BoxedIoStream;
use sl_core::LoaderError;
use sl_core::LoaderResult;
use std::net::TcpStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    V1_2,
    V1_3,
}

/// Protocol bounds for HTTPS connections. Certificates are always verified
/// against the bundled WebPKI roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub minimum_version: TlsVersion,
    pub maximum_version: TlsVersion,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            minimum_version: TlsVersion::V1_2,
            maximum_version: TlsVersion::V1_3,
        }
    }
}

impl TlsSettings {
    pub fn validate(&self) -> LoaderResult<()> {
        if self.minimum_version > self.maximum_version {
            return Err(LoaderError::new(
                "net.tls.invalid_version_range",
                "minimum TLS version cannot be greater than maximum version",
            ));
        }
        Ok(())
    }
}

#[cfg(feature = "tls-rustls")]
pub(crate) fn connect_tls(
    mut stream: TcpStream,
    server_name: &str,
    settings: &TlsSettings,
) -> LoaderResult<BoxedIoStream> {
    use rustls::ClientConfig;
    use rustls::ClientConnection;
    use rustls::RootCertStore;
    use rustls::StreamOwned;
    use rustls::pki_types::ServerName;
    use std::sync::Arc;

    settings.validate()?;
    let versions = [TlsVersion::V1_3, TlsVersion::V1_2]
        .into_iter()
        .filter(|version| *version >= settings.minimum_version && *version <= settings.maximum_version)
        .map(|version| match version {
            TlsVersion::V1_2 => &rustls::version::TLS12,
            TlsVersion::V1_3 => &rustls::version::TLS13,
        })
        .collect::<Vec<_>>();

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&versions)
        .map_err(|error| {
            LoaderError::new(
                "net.tls.config_versions_invalid",
                format!("failed to configure TLS protocol versions: {error}"),
            )
        })?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    let name = ServerName::try_from(server_name.to_owned()).map_err(|error| {
        LoaderError::new(
            "net.tls.server_name_invalid",
            format!("invalid TLS server name `{server_name}`: {error}"),
        )
    })?;

    let mut connection = ClientConnection::new(Arc::new(config), name).map_err(|error| {
        LoaderError::new(
            "net.tls.connection_init_failed",
            format!("failed to initialize TLS connection for `{server_name}`: {error}"),
        )
    })?;

    connection.complete_io(&mut stream).map_err(|error| {
        LoaderError::new(
            "net.tls.handshake_failed",
            format!("TLS handshake failed for `{server_name}`: {error}"),
        )
    })?;

    Ok(Box::new(StreamOwned::new(connection, stream)))
}

#[cfg(not(feature = "tls-rustls"))]
pub(crate) fn connect_tls(
    _stream: TcpStream,
    _server_name: &str,
    _settings: &TlsSettings,
) -> LoaderResult<BoxedIoStream> {
    Err(LoaderError::new(
        "net.tls.backend_unavailable",
        "rustls backend is disabled for this build; enable `sl-net/tls-rustls`",
    ))
}
