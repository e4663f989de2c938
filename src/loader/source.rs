//! Score repositories: where the three artifact kinds (metadata, page graphics,
//! position table) of one score come from.

use crate::config::SourceLayout;
use crate::error::{Result, ScoreError};
use crate::models::{Locator, ScoreSource, SourceType};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed load future; repositories are used behind `dyn` from spawned tasks.
pub type LoadFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// Artifact access for one score source.
pub trait ScoreRepository: Send + Sync {
    /// Raw `meta.metajson` document.
    fn meta(&self) -> LoadFuture<String>;
    /// Raw position table (mpos XML or positions JSON).
    fn positions(&self) -> LoadFuture<String>;
    /// Graphic of one page, 0-based.
    fn page(&self, index: usize) -> LoadFuture<Vec<u8>>;
}

/// Opens a repository for each new score source.
pub trait RepositoryFactory: Send + Sync {
    fn open(&self, source: &ScoreSource) -> Arc<dyn ScoreRepository>;
}

/// Reads a pre-rendered `.wd` directory from disk or over HTTP.
pub struct DirectorySource {
    base: Locator,
    layout: SourceLayout,
}

impl DirectorySource {
    pub fn new(base: Locator, layout: SourceLayout) -> Self {
        Self { base, layout }
    }

    fn fetch_text(&self, name: &str) -> LoadFuture<String> {
        let locator = self.base.join(name);
        Box::pin(async move {
            let bytes = fetch(&locator).await?;
            String::from_utf8(bytes)
                .map_err(|e| ScoreError::Meta(format!("{} is not UTF-8: {}", locator, e)))
        })
    }
}

impl ScoreRepository for DirectorySource {
    fn meta(&self) -> LoadFuture<String> {
        self.fetch_text(&self.layout.meta_file)
    }

    fn positions(&self) -> LoadFuture<String> {
        self.fetch_text(&self.layout.positions_file)
    }

    fn page(&self, index: usize) -> LoadFuture<Vec<u8>> {
        let locator = self.base.join(&self.layout.graphic_file(index));
        Box::pin(async move { fetch(&locator).await })
    }
}

/// Fetches a file or URL without blocking the runtime.
pub async fn fetch(locator: &Locator) -> Result<Vec<u8>> {
    match locator {
        Locator::Path(path) => tokio::fs::read(path)
            .await
            .map_err(|e| ScoreError::io(path, e)),
        Locator::Url(url) => {
            let url = url.clone();
            tokio::task::spawn_blocking(move || http_get(&url))
                .await
                .map_err(|e| ScoreError::Aborted(e.to_string()))?
        }
    }
}

/// Downloads the whole body, without ureq's default 10 MiB read limit.
pub(crate) fn http_get(url: &str) -> Result<Vec<u8>> {
    let http_error = |message: String| ScoreError::Http {
        url: url.to_string(),
        message,
    };

    let mut response = ureq::get(url).call().map_err(|e| http_error(e.to_string()))?;
    response
        .body_mut()
        .with_config()
        .limit(u64::MAX)
        .read_to_vec()
        .map_err(|e| http_error(e.to_string()))
}

/// Default factory: directories are read directly, score files go through a
/// conversion session.
pub struct DefaultRepositoryFactory {
    layout: SourceLayout,
    converter: Arc<dyn super::convert::ScoreConverter>,
}

impl DefaultRepositoryFactory {
    pub fn new(layout: SourceLayout, converter: Arc<dyn super::convert::ScoreConverter>) -> Self {
        Self { layout, converter }
    }
}

impl RepositoryFactory for DefaultRepositoryFactory {
    fn open(&self, source: &ScoreSource) -> Arc<dyn ScoreRepository> {
        match source.source_type {
            SourceType::PreRenderedDirectory => Arc::new(DirectorySource::new(
                source.locator.clone(),
                self.layout.clone(),
            )),
            SourceType::DirectFileConversion => Arc::new(super::convert::ConversionSource::new(
                source.locator.clone(),
                self.converter.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serves `body` once over HTTP/1.1 and returns the URL.
    fn serve_once(body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .unwrap();
            stream.write_all(&body).unwrap();
        });
        format!("http://{}/soundfont.sf2", addr)
    }

    #[test]
    fn test_http_get_reads_bodies_over_ten_mib() {
        let size = 11 * 1024 * 1024;
        let url = serve_once(vec![7u8; size]);

        let bytes = http_get(&url).unwrap();
        assert_eq!(bytes.len(), size);
        assert!(bytes.iter().all(|b| *b == 7));
    }

    #[tokio::test]
    async fn test_directory_source_reads_protocol_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("meta.metajson"), r#"{"pages": 2}"#).unwrap();
        fs::write(dir.path().join("graphic-1.svg"), "<svg/>").unwrap();
        fs::write(dir.path().join("graphic-2.svg"), "<svg viewBox=\"0 0 1 1\"/>").unwrap();

        let source = DirectorySource::new(
            Locator::Path(dir.path().to_path_buf()),
            SourceLayout::default(),
        );

        assert_eq!(source.meta().await.unwrap(), r#"{"pages": 2}"#);
        assert_eq!(source.page(0).await.unwrap(), b"<svg/>".to_vec());
        assert!(source.page(1).await.unwrap().starts_with(b"<svg viewBox"));
        assert!(matches!(
            source.positions().await,
            Err(ScoreError::Io { .. })
        ));
    }
}
