//! Fetching raw source bytes for a dataset.
//!
//! Two modes: a declared local path wins outright; otherwise the download
//! link is fetched with a bounded timeout and the body is materialized into
//! the dataset's temp workdir. Materializing matters: container formats need
//! a seekable file before the parser can probe their layer registry.
//!
//! Fail-fast by policy: no retry, a broken feed fails only its own dataset.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use url::Url;

use arboretl_core::DatasetDescriptor;

/// Retrieval failures. All dataset-fatal, none run-fatal.
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// The HTTP client itself could not be constructed
    #[error("Failed to build HTTP client: {source}")]
    Client {
        /// The underlying error
        #[source]
        source: reqwest::Error,
    },

    /// A descriptor reached retrieval with no source at all
    #[error("Dataset '{dataset}' has no download link and no local path")]
    NoSource {
        /// The dataset name
        dataset: String,
    },

    /// The download link is not a valid URL
    #[error("Invalid download link '{url}': {source}")]
    InvalidUrl {
        /// The link as configured
        url: String,
        /// The underlying error
        #[source]
        source: url::ParseError,
    },

    /// Transport-level failure (connection, TLS, timeout)
    #[error("Request to '{url}' failed: {source}")]
    Request {
        /// The requested URL
        url: String,
        /// The underlying error
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("Request to '{url}' returned HTTP {status}")]
    Status {
        /// The requested URL
        url: String,
        /// The response status code
        status: u16,
    },

    /// The declared local path does not exist
    #[error("Local file '{path}' does not exist")]
    LocalMissing {
        /// The configured path
        path: PathBuf,
    },

    /// The response body could not be written to the workdir
    #[error("Failed to store downloaded body at '{path}': {source}")]
    Store {
        /// The destination path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Fetches dataset sources over HTTP(S) or from disk.
pub struct Retriever {
    client: reqwest::Client,
}

impl Retriever {
    /// Build a retriever whose requests abort after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, RetrieveError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|source| RetrieveError::Client { source })?;
        Ok(Self { client })
    }

    /// Produce a readable local path for the descriptor's source.
    ///
    /// A configured `local_path` is verified and returned as-is; a remote
    /// source is downloaded into `workdir` and named after the dataset. The
    /// format hint always comes from the descriptor, never from the path.
    pub async fn fetch(
        &self,
        descriptor: &DatasetDescriptor,
        workdir: &Path,
    ) -> Result<PathBuf, RetrieveError> {
        if let Some(local) = &descriptor.local_path {
            if !local.exists() {
                return Err(RetrieveError::LocalMissing {
                    path: local.clone(),
                });
            }
            log::debug!(
                "[{}] using local file '{}'",
                descriptor.name,
                local.display()
            );
            return Ok(local.clone());
        }

        let Some(link) = &descriptor.download_link else {
            return Err(RetrieveError::NoSource {
                dataset: descriptor.name.clone(),
            });
        };
        let url = Url::parse(link).map_err(|source| RetrieveError::InvalidUrl {
            url: link.clone(),
            source,
        })?;

        log::info!("[{}] downloading {url}", descriptor.name);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| RetrieveError::Request {
                url: link.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrieveError::Status {
                url: link.clone(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| RetrieveError::Request {
                url: link.clone(),
                source,
            })?;

        let destination = workdir.join(format!(
            "{}.{}",
            descriptor.name,
            descriptor.file_type.as_config_str()
        ));
        tokio::fs::write(&destination, &body)
            .await
            .map_err(|source| RetrieveError::Store {
                path: destination.clone(),
                source,
            })?;

        log::info!(
            "[{}] downloaded {} byte(s) to '{}'",
            descriptor.name,
            body.len(),
            destination.display()
        );
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn descriptor(name: &str, link: Option<&str>, local: Option<PathBuf>) -> DatasetDescriptor {
        DatasetDescriptor {
            name: name.to_string(),
            file_type: arboretl_core::FileType::Csv,
            download_link: link.map(str::to_string),
            local_path: local,
            crs: None,
            wkt_column: None,
            lon_column: None,
            lat_column: None,
            column_mapping: BTreeMap::new(),
            metadata: BTreeMap::new(),
            on_invalid_geometry: arboretl_core::InvalidGeometryPolicy::default(),
        }
    }

    /// One-shot HTTP responder; enough protocol for reqwest against localhost.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/bomen.csv")
    }

    #[tokio::test]
    async fn downloads_body_into_workdir() {
        let url = serve_once("200 OK", "id,geo\n1,POINT (5 52)\n").await;
        let dir = tempfile::tempdir().unwrap();
        let retriever = Retriever::new(Duration::from_secs(5)).unwrap();

        let path = retriever
            .fetch(&descriptor("Utrecht", Some(&url), None), dir.path())
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "Utrecht.csv");
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("POINT (5 52)"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let url = serve_once("404 Not Found", "").await;
        let dir = tempfile::tempdir().unwrap();
        let retriever = Retriever::new(Duration::from_secs(5)).unwrap();

        let err = retriever
            .fetch(&descriptor("Utrecht", Some(&url), None), dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, RetrieveError::Status { status: 404, .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_request_error() {
        // Reserved port on localhost that nothing listens on.
        let dir = tempfile::tempdir().unwrap();
        let retriever = Retriever::new(Duration::from_secs(2)).unwrap();

        let err = retriever
            .fetch(
                &descriptor("Utrecht", Some("http://127.0.0.1:9/x.csv"), None),
                dir.path(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RetrieveError::Request { .. }));
    }

    #[tokio::test]
    async fn local_path_takes_precedence_over_link() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("al-gedownload.csv");
        std::fs::write(&local, "id\n1\n").unwrap();
        let retriever = Retriever::new(Duration::from_secs(5)).unwrap();

        let path = retriever
            .fetch(
                &descriptor(
                    "Utrecht",
                    Some("http://127.0.0.1:9/onbereikbaar.csv"),
                    Some(local.clone()),
                ),
                dir.path(),
            )
            .await
            .unwrap();

        assert_eq!(path, local);
    }

    #[tokio::test]
    async fn missing_local_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = Retriever::new(Duration::from_secs(5)).unwrap();

        let err = retriever
            .fetch(
                &descriptor("Utrecht", None, Some(PathBuf::from("/nonexistent/b.csv"))),
                dir.path(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RetrieveError::LocalMissing { .. }));
    }

    #[tokio::test]
    async fn garbage_url_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = Retriever::new(Duration::from_secs(5)).unwrap();

        let err = retriever
            .fetch(
                &descriptor("Utrecht", Some("not a url"), None),
                dir.path(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RetrieveError::InvalidUrl { .. }));
    }
}
