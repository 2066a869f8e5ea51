use crate::content::SegmentId;
use crate::timing::table::WordTiming;
use crate::{ReadalongError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::PathBuf;
use tracing::debug;

/// Where per-segment timing lists are fetched from
pub trait TimingSource: Send + Sync {
    fn fetch<'a>(&'a self, segment: &'a SegmentId) -> BoxFuture<'a, Result<Vec<WordTiming>>>;
}

/// Fetches `{base_url}/{segment}.json`
#[derive(Clone, Debug)]
pub struct HttpTimingSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTimingSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, segment: &SegmentId) -> String {
        format!("{}/{}.json", self.base_url, segment)
    }
}

impl TimingSource for HttpTimingSource {
    fn fetch<'a>(&'a self, segment: &'a SegmentId) -> BoxFuture<'a, Result<Vec<WordTiming>>> {
        async move {
            let url = self.url_for(segment);
            debug!("Fetching timing table from {}", url);

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ReadalongError::ResourceUnavailable(format!("{}: {}", url, e)))?;

            if !response.status().is_success() {
                return Err(ReadalongError::ResourceUnavailable(format!(
                    "{} returned {}",
                    url,
                    response.status()
                )));
            }

            response
                .json::<Vec<WordTiming>>()
                .await
                .map_err(|e| ReadalongError::ResourceUnavailable(format!("{}: {}", url, e)))
        }
        .boxed()
    }
}

/// Reads `{dir}/{segment}.json` from disk
#[derive(Clone, Debug)]
pub struct FileTimingSource {
    dir: PathBuf,
}

impl FileTimingSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, segment: &SegmentId) -> PathBuf {
        self.dir.join(format!("{}.json", segment))
    }
}

impl TimingSource for FileTimingSource {
    fn fetch<'a>(&'a self, segment: &'a SegmentId) -> BoxFuture<'a, Result<Vec<WordTiming>>> {
        async move {
            let path = self.path_for(segment);
            let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
                ReadalongError::ResourceUnavailable(format!("{}: {}", path.display(), e))
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                ReadalongError::ResourceUnavailable(format!("{}: {}", path.display(), e))
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_url_layout() {
        let source = HttpTimingSource::new("https://cdn.example.com/timing/");
        assert_eq!(
            source.url_for(&"intro".into()),
            "https://cdn.example.com/timing/intro.json"
        );
    }

    #[tokio::test]
    async fn test_file_source_reads_and_ignores_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("intro.json"),
            r#"[{"word":"Picture","start":0.0,"end":0.4},{"word":"a","start":0.4}]"#,
        )
        .unwrap();

        let source = FileTimingSource::new(dir.path());
        let words = source.fetch(&"intro".into()).await.unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[1], WordTiming::new("a", 0.4));
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileTimingSource::new(dir.path());
        let result = source.fetch(&"nope".into()).await;
        assert!(matches!(result, Err(ReadalongError::ResourceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_file_source_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let source = FileTimingSource::new(dir.path());
        assert!(source.fetch(&"bad".into()).await.is_err());
    }
}
