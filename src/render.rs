//! Graph rendering
//!
//! Renders Graphviz DOT sources to PNG artifacts by shelling out to `dot`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::RenderError;

#[async_trait]
pub trait GraphRenderer: Send + Sync {
    /// Render `dot_source` and return the public artifact reference.
    async fn render(
        &self,
        dot_source: &str,
        namespace: &str,
        name: &str,
    ) -> Result<String, RenderError>;
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Directory PNGs are written under
    pub output_dir: PathBuf,
    /// Public URL prefix the output directory is served at
    pub url_prefix: String,
    pub dot_binary: String,
    pub timeout: Duration,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("static/graphs"),
            url_prefix: "/graphs".to_string(),
            dot_binary: "dot".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

pub struct GraphvizRenderer {
    config: GraphConfig,
}

impl GraphvizRenderer {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }
}

/// Keep path segments to `[A-Za-z0-9_-]`.
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

fn sanitize_namespace(namespace: &str) -> Vec<String> {
    namespace
        .split('/')
        .filter(|s| !s.is_empty())
        .map(sanitize_segment)
        .collect()
}

/// Cheap structural check before spawning a process.
fn validate_dot(dot_source: &str) -> Result<(), RenderError> {
    let trimmed = dot_source.trim();
    if trimmed.is_empty() {
        return Err(RenderError::InvalidSource("empty DOT source".to_string()));
    }

    let lowered = trimmed.to_lowercase();
    let has_header = lowered.starts_with("digraph")
        || lowered.starts_with("graph")
        || lowered.starts_with("strict");
    if !has_header || !trimmed.contains('{') || !trimmed.ends_with('}') {
        return Err(RenderError::InvalidSource(
            "expected `digraph <name> { ... }`".to_string(),
        ));
    }

    Ok(())
}

#[async_trait]
impl GraphRenderer for GraphvizRenderer {
    async fn render(
        &self,
        dot_source: &str,
        namespace: &str,
        name: &str,
    ) -> Result<String, RenderError> {
        validate_dot(dot_source)?;

        let segments = sanitize_namespace(namespace);
        let file_name = format!("{}.png", sanitize_segment(name));

        let mut dir = self.config.output_dir.clone();
        dir.extend(segments.iter());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| RenderError::Unavailable(format!("cannot create {}: {}", dir.display(), e)))?;
        let path = dir.join(&file_name);

        debug!(path = %path.display(), "Rendering graph");

        let mut child = Command::new(&self.config.dot_binary)
            .arg("-Tpng")
            .arg("-o")
            .arg(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::Unavailable(format!("{}: {}", self.config.dot_binary, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(dot_source.as_bytes())
                .await
                .map_err(|e| RenderError::Failed(e.to_string()))?;
        }

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout(self.config.timeout.as_secs()))?
            .map_err(|e| RenderError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(RenderError::Failed(stderr));
        }

        let mut url = self.config.url_prefix.trim_end_matches('/').to_string();
        for segment in &segments {
            url.push('/');
            url.push_str(segment);
        }
        url.push('/');
        url.push_str(&file_name);

        info!(artifact = %url, "Graph rendered");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_namespace() {
        assert_eq!(
            sanitize_namespace("u1/conv_abc/../m 1"),
            vec!["u1", "conv_abc", "__", "m_1"]
        );
        assert_eq!(sanitize_segment("add_cfg"), "add_cfg");
        assert_eq!(sanitize_segment(""), "_");
    }

    #[test]
    fn test_validate_dot() {
        assert!(validate_dot("digraph CFG_add {A->B;}").is_ok());
        assert!(validate_dot("  strict digraph G { a -> b }  ").is_ok());
        assert!(matches!(validate_dot(""), Err(RenderError::InvalidSource(_))));
        assert!(matches!(
            validate_dot("def add(a, b): return a + b"),
            Err(RenderError::InvalidSource(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_source_is_rejected_before_spawning() {
        let renderer = GraphvizRenderer::new(GraphConfig {
            dot_binary: "/nonexistent/dot".into(),
            ..GraphConfig::default()
        });

        let result = renderer.render("not a graph", "u/c/m", "f_cfg").await;
        assert!(matches!(result, Err(RenderError::InvalidSource(_))));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let dir = std::env::temp_dir().join(format!("render-test-{}", uuid::Uuid::new_v4()));
        let renderer = GraphvizRenderer::new(GraphConfig {
            output_dir: dir.clone(),
            dot_binary: "/nonexistent/dot".into(),
            ..GraphConfig::default()
        });

        let result = renderer.render("digraph G {A->B;}", "u/c/m", "f_cfg").await;
        assert!(matches!(result, Err(RenderError::Unavailable(_))));

        let _ = std::fs::remove_dir_all(dir);
    }
}
