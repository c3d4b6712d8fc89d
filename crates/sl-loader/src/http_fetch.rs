//! [`Fetch`] over the blocking `sl-net` client.

use crate::fetcher::Fetch;
use crate::fetcher::FetchRequest;
use crate::fetcher::FetchResponse;
use async_trait::async_trait;
use sl_core::LoaderError;
use sl_core::LoaderResult;
use sl_net::ClientConfig;
use sl_net::ProxyClient;
use std::sync::Arc;

/// Runs each request on tokio's blocking pool so timers keep running meanwhile.
#[derive(Debug, Clone)]
pub struct NetworkFetch {
    client: Arc<ProxyClient>,
}

impl NetworkFetch {
    pub fn new(config: ClientConfig) -> LoaderResult<Self> {
        Ok(Self {
            client: Arc::new(ProxyClient::new(config)?),
        })
    }

    pub fn client(&self) -> &ProxyClient {
        &self.client
    }
}

#[async_trait(?Send)]
impl Fetch for NetworkFetch {
    async fn get(&self, request: &FetchRequest) -> LoaderResult<FetchResponse> {
        let client = Arc::clone(&self.client);
        let url = request.url.clone();
        let response = tokio::task::spawn_blocking(move || client.get(&url))
            .await
            .map_err(|error| {
                LoaderError::new(
                    "loader.fetch.worker_failed",
                    format!("network worker stopped: {error}"),
                )
            })??;

        Ok(FetchResponse {
            status: response.status.as_u16(),
            content_type: response.content_type().to_owned(),
            body: response.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::NetworkFetch;
    use crate::fetcher::Fetch;
    use crate::fetcher::FetchRequest;
    use sl_net::ClientConfig;
    use std::io::Read;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    #[tokio::test]
    async fn bridges_the_blocking_client() {
        let listener = match TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => listener,
            Err(error) => panic!("{error}"),
        };
        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(error) => panic!("{error}"),
        };
        let server = thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buffer = [0_u8; 2048];
                let _ = stream.read(&mut buffer);
                let body = "<p>proxied</p>";
                let _ = write!(
                    stream,
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\n\r\n{body}",
                    body.len()
                );
            }
        });

        let fetch = match NetworkFetch::new(ClientConfig::default()) {
            Ok(fetch) => fetch,
            Err(error) => panic!("{error}"),
        };
        let url = format!("http://127.0.0.1:{port}/site/index.html");
        let response = match fetch.get(&FetchRequest::get(url)).await {
            Ok(response) => response,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "<p>proxied</p>");
        let _ = server.join();
    }
}
