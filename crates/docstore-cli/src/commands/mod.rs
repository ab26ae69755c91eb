//! Command handlers

use anyhow::{Context, Result};

use docstore_core::{DocId, ProjectId};

pub mod archive;
pub mod config;
pub mod doc;
pub mod list;

/// Parse a project id argument
pub fn parse_project_id(input: &str) -> Result<ProjectId> {
    input
        .parse()
        .with_context(|| format!("Invalid project id: {}", input))
}

/// Parse a project id and doc id argument pair
pub fn parse_doc_ids(project_id: &str, doc_id: &str) -> Result<(ProjectId, DocId)> {
    let project_id = parse_project_id(project_id)?;
    let doc_id = doc_id
        .parse()
        .with_context(|| format!("Invalid doc id: {}", doc_id))?;
    Ok((project_id, doc_id))
}
