//! Archive command handlers

use anyhow::Result;

use docstore_core::DocManager;

use super::{parse_doc_ids, parse_project_id};
use crate::output::Output;

/// Move one document to the cold archive
pub async fn archive(manager: &DocManager, project_id: &str, doc_id: &str, output: &Output) -> Result<()> {
    let (project_id, doc_id) = parse_doc_ids(project_id, doc_id)?;
    manager.archive_doc(project_id, doc_id).await?;
    output.success(&format!("Archived doc: {}", doc_id));
    Ok(())
}

/// Bring one document back into the hot store
pub async fn unarchive(
    manager: &DocManager,
    project_id: &str,
    doc_id: &str,
    output: &Output,
) -> Result<()> {
    let (project_id, doc_id) = parse_doc_ids(project_id, doc_id)?;
    manager.unarchive_doc(project_id, doc_id).await?;
    output.success(&format!("Unarchived doc: {}", doc_id));
    Ok(())
}

pub async fn archive_all(manager: &DocManager, project_id: &str, output: &Output) -> Result<()> {
    let project_id = parse_project_id(project_id)?;
    let count = manager.archive_all_docs(project_id).await?;
    output.success(&format!("Archived {} doc(s) in project {}", count, project_id));
    Ok(())
}

pub async fn unarchive_all(manager: &DocManager, project_id: &str, output: &Output) -> Result<()> {
    let project_id = parse_project_id(project_id)?;
    let count = manager.unarchive_all_docs(project_id).await?;
    output.success(&format!("Unarchived {} doc(s) in project {}", count, project_id));
    Ok(())
}
