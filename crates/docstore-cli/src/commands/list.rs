//! List command handler

use anyhow::Result;

use docstore_core::{DocManager, DocProjection};

use super::parse_project_id;
use crate::output::Output;

/// List live docs (unarchiving the project) or, with `deleted`, the trash
pub async fn list(manager: &DocManager, project_id: &str, deleted: bool, output: &Output) -> Result<()> {
    let project_id = parse_project_id(project_id)?;

    let records = if deleted {
        manager.get_all_deleted_docs(project_id).await?
    } else {
        manager
            .get_all_non_deleted_docs(project_id, DocProjection::LINES)
            .await?
    };

    output.print_records(&records)
}
