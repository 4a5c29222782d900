//! Serves static markdown knowledge files over the MCP resources hooks.
//! Files are re-read per call; no caching. See §4.7.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::error::AirflowMcpError;

static NON_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex is valid"));

#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub uri: String,
    pub title: String,
    pub path: PathBuf,
}

pub struct KnowledgeResources {
    directory: PathBuf,
}

impl KnowledgeResources {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Discovers every `*.md` file under the configured directory, assigning
    /// each a stable `file:///<slug>` URI. Missing directory: warn and
    /// return an empty list rather than failing.
    pub async fn list(&self) -> Vec<ResourceEntry> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(err) => {
                warn!(dir = %self.directory.display(), error = %err, "knowledge resources directory unavailable");
                return Vec::new();
            }
        };

        let mut files = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("md") {
                files.push(path);
            }
        }
        files.sort();

        let mut seen_slugs: HashSet<String> = HashSet::new();
        let mut resources = Vec::with_capacity(files.len());
        for path in files {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("resource")
                .to_string();
            let slug = unique_slug(&stem, &mut seen_slugs);
            resources.push(ResourceEntry {
                uri: format!("file:///{slug}"),
                title: stem,
                path,
            });
        }

        resources
    }

    pub async fn read(&self, uri: &str) -> Result<String, AirflowMcpError> {
        let entries = self.list().await;
        let entry = entries
            .iter()
            .find(|e| e.uri == uri)
            .ok_or_else(|| AirflowMcpError::NotFound(uri.to_string()))?;

        tokio::fs::read_to_string(&entry.path)
            .await
            .map_err(|e| AirflowMcpError::NotFound(format!("{uri}: {e}")))
    }
}

fn unique_slug(stem: &str, seen: &mut HashSet<String>) -> String {
    let base = slugify(stem);
    if seen.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn slugify(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let replaced = NON_IDENTIFIER.replace_all(&lowered, "-");
    replaced.trim_matches('-').to_string()
}

pub fn default_directory() -> PathBuf {
    Path::new("knowledge").to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_directory_returns_empty_list() {
        let resources = KnowledgeResources::new("/nonexistent/path/for/tests");
        let entries = resources.list().await;
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn discovers_markdown_and_assigns_slugs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("DAG Overview.md"), "# DAGs").unwrap();
        std::fs::write(dir.path().join("dag-overview.md"), "# DAGs 2").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let resources = KnowledgeResources::new(dir.path());
        let mut entries = resources.list().await;
        entries.sort_by(|a, b| a.uri.cmp(&b.uri));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].uri, "file:///dag-overview");
        assert_eq!(entries[1].uri, "file:///dag-overview-2");
    }

    #[tokio::test]
    async fn read_returns_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.md"), "hello world").unwrap();
        let resources = KnowledgeResources::new(dir.path());
        let content = resources.read("file:///hello").await.unwrap();
        assert_eq!(content, "hello world");
    }
}
