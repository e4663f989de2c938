//! Direct-file protocol: one score file handed to a conversion collaborator.
//!
//! The session is opened lazily on the first artifact request and reused for
//! every later call of the same source. Conversion is blocking work, so every
//! call runs on tokio's blocking pool and calls are serialized on the session.

use super::source::{LoadFuture, ScoreRepository, http_get};
use crate::error::{Result, ScoreError};
use crate::models::Locator;
use std::sync::{Arc, Mutex};

/// One opened score inside a converter.
pub trait ConversionSession: Send {
    fn metadata(&mut self) -> Result<String>;
    fn graphic(&mut self, page: usize) -> Result<Vec<u8>>;
    fn positions(&mut self) -> Result<String>;
}

/// Turns score file bytes into a conversion session.
pub trait ScoreConverter: Send + Sync {
    fn open(&self, file_name: &str, bytes: Vec<u8>) -> Result<Box<dyn ConversionSession>>;
}

type SharedSession = Arc<Mutex<Option<Box<dyn ConversionSession>>>>;

pub struct ConversionSource {
    locator: Locator,
    converter: Arc<dyn ScoreConverter>,
    session: SharedSession,
}

impl ConversionSource {
    pub fn new(locator: Locator, converter: Arc<dyn ScoreConverter>) -> Self {
        Self {
            locator,
            converter,
            session: Arc::new(Mutex::new(None)),
        }
    }

    fn with_session<T, F>(&self, call: F) -> LoadFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Box<dyn ConversionSession>) -> Result<T> + Send + 'static,
    {
        let locator = self.locator.clone();
        let converter = self.converter.clone();
        let session = self.session.clone();

        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let mut guard = session
                    .lock()
                    .map_err(|_| ScoreError::Conversion("session lock poisoned".to_string()))?;

                if guard.is_none() {
                    let bytes = read_score_file(&locator)?;
                    let name = file_name(&locator);
                    log::info!("LOADER: Opening conversion session for {}", name);
                    *guard = Some(converter.open(&name, bytes)?);
                }

                let opened = guard
                    .as_mut()
                    .ok_or_else(|| ScoreError::Conversion("session unavailable".to_string()))?;
                call(opened)
            })
            .await
            .map_err(|e| ScoreError::Aborted(e.to_string()))?
        })
    }
}

impl ScoreRepository for ConversionSource {
    fn meta(&self) -> LoadFuture<String> {
        self.with_session(|session| session.metadata())
    }

    fn positions(&self) -> LoadFuture<String> {
        self.with_session(|session| session.positions())
    }

    fn page(&self, index: usize) -> LoadFuture<Vec<u8>> {
        self.with_session(move |session| session.graphic(index))
    }
}

fn read_score_file(locator: &Locator) -> Result<Vec<u8>> {
    match locator {
        Locator::Path(path) => std::fs::read(path).map_err(|e| ScoreError::io(path, e)),
        Locator::Url(url) => http_get(url),
    }
}

fn file_name(locator: &Locator) -> String {
    match locator {
        Locator::Path(path) => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "score".to_string()),
        Locator::Url(url) => url.rsplit('/').next().unwrap_or("score").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingConverter {
        opened: Arc<AtomicUsize>,
    }

    struct FakeSession {
        bytes: usize,
    }

    impl ConversionSession for FakeSession {
        fn metadata(&mut self) -> Result<String> {
            Ok(format!(r#"{{"pages": {}}}"#, self.bytes))
        }

        fn graphic(&mut self, page: usize) -> Result<Vec<u8>> {
            if page >= self.bytes {
                return Err(ScoreError::PageOutOfRange {
                    index: page,
                    count: self.bytes,
                });
            }
            Ok(format!("<svg id=\"{}\"/>", page).into_bytes())
        }

        fn positions(&mut self) -> Result<String> {
            Ok("{}".to_string())
        }
    }

    impl ScoreConverter for CountingConverter {
        fn open(&self, file_name: &str, bytes: Vec<u8>) -> Result<Box<dyn ConversionSession>> {
            assert_eq!(file_name, "etude.mscz");
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession { bytes: bytes.len() }))
        }
    }

    #[tokio::test]
    async fn test_session_opened_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etude.mscz");
        std::fs::write(&path, b"abc").unwrap();

        let opened = Arc::new(AtomicUsize::new(0));
        let source = ConversionSource::new(
            Locator::Path(path),
            Arc::new(CountingConverter {
                opened: opened.clone(),
            }),
        );

        assert_eq!(source.meta().await.unwrap(), r#"{"pages": 3}"#);
        assert_eq!(source.page(2).await.unwrap(), b"<svg id=\"2\"/>".to_vec());
        assert!(source.page(3).await.is_err());
        assert_eq!(source.positions().await.unwrap(), "{}");
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_file_fails_every_call() {
        let source = ConversionSource::new(
            Locator::Path("/nonexistent/etude.mscz".into()),
            Arc::new(CountingConverter {
                opened: Arc::new(AtomicUsize::new(0)),
            }),
        );
        assert!(matches!(source.meta().await, Err(ScoreError::Io { .. })));
        assert!(source.page(0).await.is_err());
    }
}
