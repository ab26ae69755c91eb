//! Document command handlers

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;

use docstore_core::{DocManager, DocMeta, DocUpdate, RangesJson};

use super::parse_doc_ids;
use crate::output::Output;

/// Print a full document, unarchiving it if needed
pub async fn get(manager: &DocManager, project_id: &str, doc_id: &str, output: &Output) -> Result<()> {
    let (project_id, doc_id) = parse_doc_ids(project_id, doc_id)?;
    let doc = manager.get_full_doc(project_id, doc_id).await?;
    output.print_document(&doc)
}

/// Print just the lines of a document
pub async fn lines(manager: &DocManager, project_id: &str, doc_id: &str, output: &Output) -> Result<()> {
    let (project_id, doc_id) = parse_doc_ids(project_id, doc_id)?;
    let lines = manager.get_doc_lines(project_id, doc_id).await?;
    output.print_lines(&lines)
}

/// Print a document without moving it out of the archive
pub async fn peek(manager: &DocManager, project_id: &str, doc_id: &str, output: &Output) -> Result<()> {
    let (project_id, doc_id) = parse_doc_ids(project_id, doc_id)?;
    let doc = manager.peek_doc(project_id, doc_id).await?;
    output.print_document(&doc)
}

pub async fn is_deleted(
    manager: &DocManager,
    project_id: &str,
    doc_id: &str,
    output: &Output,
) -> Result<()> {
    let (project_id, doc_id) = parse_doc_ids(project_id, doc_id)?;
    let deleted = manager.is_doc_deleted(project_id, doc_id).await?;
    output.print_flag("deleted", deleted);
    Ok(())
}

/// Write a document's lines from a file (or stdin) with the given version
pub async fn update(
    manager: &DocManager,
    project_id: &str,
    doc_id: &str,
    version: i64,
    file: Option<PathBuf>,
    ranges: Option<PathBuf>,
    output: &Output,
) -> Result<()> {
    let (project_id, doc_id) = parse_doc_ids(project_id, doc_id)?;

    let content = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read lines from stdin")?;
            buf
        }
    };
    let ranges = match ranges {
        Some(path) => read_ranges(&path)?,
        None => RangesJson::default(),
    };

    let outcome = manager
        .update_doc(
            project_id,
            doc_id,
            DocUpdate::new(split_lines(&content), version, ranges),
        )
        .await?;
    output.print_outcome(&outcome)
}

/// Merge name and deleted flag into an existing document
pub async fn patch(
    manager: &DocManager,
    project_id: &str,
    doc_id: &str,
    name: Option<String>,
    deleted: Option<bool>,
    output: &Output,
) -> Result<()> {
    if name.is_none() && deleted.is_none() {
        bail!("Nothing to patch: pass --name and/or --deleted");
    }
    let (project_id, doc_id) = parse_doc_ids(project_id, doc_id)?;

    let meta = DocMeta {
        name,
        deleted,
        deleted_at: (deleted == Some(true)).then(Utc::now),
    };
    manager.patch_doc(project_id, doc_id, meta).await?;

    output.success(&format!("Patched doc: {}", doc_id));
    Ok(())
}

/// Soft-delete a document
pub async fn delete(
    manager: &DocManager,
    project_id: &str,
    doc_id: &str,
    name: String,
    output: &Output,
) -> Result<()> {
    let (project_id, doc_id) = parse_doc_ids(project_id, doc_id)?;
    manager
        .patch_doc(project_id, doc_id, DocMeta::soft_delete(name))
        .await?;

    output.success(&format!("Deleted doc: {}", doc_id));
    Ok(())
}

fn read_ranges(path: &Path) -> Result<RangesJson> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid ranges JSON in {}", path.display()))
}

/// Split text into document lines, accepting both LF and CRLF endings
fn split_lines(content: &str) -> Vec<String> {
    content.lines().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines("a\nb\n"), vec!["a", "b"]);
        assert_eq!(split_lines("a\r\nb"), vec!["a", "b"]);
        assert_eq!(split_lines("a\n\nb"), vec!["a", "", "b"]);
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn test_read_ranges() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ranges.json");
        std::fs::write(
            &path,
            r#"{"comments":[{"id":"C1","op":{"p":4,"c":"word","t":"T1"}}]}"#,
        )
        .unwrap();

        let ranges = read_ranges(&path).unwrap();
        let comments = ranges.comments.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].id, "C1");
        assert!(ranges.changes.is_none());
    }

    #[test]
    fn test_read_ranges_rejects_bad_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ranges.json");
        std::fs::write(&path, "[not ranges").unwrap();

        let err = read_ranges(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid ranges JSON"));
    }
}
