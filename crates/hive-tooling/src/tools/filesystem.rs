use crate::registry::{Tool, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Reads a file's contents as UTF-8, rejecting any path that escapes
/// `root` once canonicalized. Arguments: `{"path": "relative/or/absolute"}`.
pub struct FsReadTool {
    root: PathBuf,
}

impl FsReadTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, requested: &str) -> Result<PathBuf, ToolError> {
        let candidate = self.root.join(requested);
        let canonical_root = self
            .root
            .canonicalize()
            .map_err(|e| ToolError::Failed(format!("sandbox root is not accessible: {e}")))?;
        let canonical = candidate
            .canonicalize()
            .map_err(|e| ToolError::Failed(format!("cannot resolve `{requested}`: {e}")))?;
        if !canonical.starts_with(&canonical_root) {
            return Err(ToolError::InvalidArguments(format!("`{requested}` escapes the sandbox root")));
        }
        Ok(canonical)
    }
}

#[async_trait]
impl Tool for FsReadTool {
    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let path = arguments
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("missing `path`".to_string()))?;

        let resolved = self.resolve(path)?;
        let contents = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::Failed(format!("failed to read `{path}`: {e}")))?;

        Ok(json!({ "contents": contents }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_a_file_inside_the_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("note.txt")).unwrap();
        file.write_all(b"hello").unwrap();

        let tool = FsReadTool::new(dir.path());
        let out = tool.call(json!({ "path": "note.txt" })).await.unwrap();
        assert_eq!(out.get("contents").unwrap(), "hello");
    }

    #[tokio::test]
    async fn rejects_a_path_that_escapes_the_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("inside.txt"), b"ok").unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"nope").unwrap();

        let tool = FsReadTool::new(dir.path());
        let requested = outside.path().join("secret.txt");
        let result = tool.call(json!({ "path": requested.to_str().unwrap() })).await;
        assert!(result.is_err());
    }
}
