//! Background archive worker
//!
//! Soft-deleted documents are archived off the request path. The worker is a
//! single long-lived task fed through a bounded channel; it processes
//! commands in submission order and never reports failures back to the
//! submitter.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::archiver::DocArchiver;
use crate::ids::{DocId, ProjectId};

/// Commands sent to the archive worker
#[derive(Debug)]
pub enum ArchiveCommand {
    /// Archive one document
    Archive { project_id: ProjectId, doc_id: DocId },
    /// Signal once every earlier command has been processed
    Flush(oneshot::Sender<()>),
    /// Stop the worker
    Shutdown,
}

/// Handle to submit work to the archive worker
pub struct ArchiveWorkerHandle {
    command_tx: mpsc::Sender<ArchiveCommand>,
    task: JoinHandle<()>,
}

/// Spawn the archive worker on the current tokio runtime
pub fn spawn_archive_worker(archiver: Arc<DocArchiver>, capacity: usize) -> ArchiveWorkerHandle {
    let (command_tx, command_rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(worker_loop(archiver, command_rx));

    ArchiveWorkerHandle { command_tx, task }
}

impl ArchiveWorkerHandle {
    /// Queue a document for archiving without waiting
    ///
    /// Returns false if the command was dropped (queue full or worker gone);
    /// the document then simply stays hot.
    pub fn submit(&self, project_id: ProjectId, doc_id: DocId) -> bool {
        match self
            .command_tx
            .try_send(ArchiveCommand::Archive { project_id, doc_id })
        {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%project_id, %doc_id, "archive queue is full, doc stays in the hot store");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(%project_id, %doc_id, "archive worker has stopped, doc stays in the hot store");
                false
            }
        }
    }

    /// Wait until every previously submitted command has been processed
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .command_tx
            .send(ArchiveCommand::Flush(done_tx))
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }

    /// Process what is queued, then stop the worker and wait for it
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(ArchiveCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "archive worker ended abnormally");
        }
    }
}

async fn worker_loop(archiver: Arc<DocArchiver>, mut command_rx: mpsc::Receiver<ArchiveCommand>) {
    while let Some(command) = command_rx.recv().await {
        match command {
            ArchiveCommand::Archive { project_id, doc_id } => {
                match archiver.archive_doc_by_id(project_id, doc_id).await {
                    Ok(()) => debug!(%project_id, %doc_id, "background archive finished"),
                    Err(err) => {
                        warn!(%project_id, %doc_id, error = %err, "background archive failed")
                    }
                }
            }
            ArchiveCommand::Flush(done) => {
                let _ = done.send(());
            }
            ArchiveCommand::Shutdown => break,
        }
    }

    debug!("archive worker stopped");
}
