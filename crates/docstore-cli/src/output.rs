//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use anyhow::Result;
use serde::Serialize;

use docstore_core::{DocRecord, Document, UpdateOutcome};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a full document
    pub fn print_document(&self, doc: &Document) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                println!("Doc:      {}", doc.doc_id);
                println!("Project:  {}", doc.project_id);
                println!("Rev:      {}", doc.rev);
                println!("Version:  {}", doc.version);
                if doc.deleted {
                    println!("Deleted:  yes");
                }
                if !doc.ranges.is_empty() {
                    println!(
                        "Ranges:   {} change(s), {} comment(s)",
                        doc.ranges.changes.len(),
                        doc.ranges.comments.len()
                    );
                }
                println!();
                println!("── Lines ({}) ──", doc.lines.len());
                for line in &doc.lines {
                    println!("{}", line);
                }
            }
            OutputFormat::Json => print_json(doc)?,
            OutputFormat::Quiet => {
                for line in &doc.lines {
                    println!("{}", line);
                }
            }
        }
        Ok(())
    }

    /// Print document lines only
    pub fn print_lines(&self, lines: &[String]) -> Result<()> {
        match self.format {
            OutputFormat::Json => print_json(&lines)?,
            OutputFormat::Human | OutputFormat::Quiet => {
                for line in lines {
                    println!("{}", line);
                }
            }
        }
        Ok(())
    }

    /// Print a yes/no answer
    pub fn print_flag(&self, name: &str, value: bool) {
        match self.format {
            OutputFormat::Human => println!("{}: {}", name, if value { "yes" } else { "no" }),
            OutputFormat::Json => {
                let mut object = serde_json::Map::new();
                object.insert(name.to_string(), value.into());
                println!("{}", serde_json::Value::Object(object));
            }
            OutputFormat::Quiet => println!("{}", value),
        }
    }

    /// Print the result of a write
    pub fn print_outcome(&self, outcome: &UpdateOutcome) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if outcome.modified {
                    println!("✓ Doc updated (rev {})", outcome.rev);
                } else {
                    println!("Doc unchanged (rev {})", outcome.rev);
                }
            }
            OutputFormat::Json => print_json(outcome)?,
            OutputFormat::Quiet => println!("{}", outcome.rev),
        }
        Ok(())
    }

    /// Print a list of doc records
    pub fn print_records(&self, records: &[DocRecord]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if records.is_empty() {
                    println!("No docs found.");
                    return Ok(());
                }
                for record in records {
                    println!("{}", format_record_row(record));
                }
                println!("\n{} doc(s)", records.len());
            }
            OutputFormat::Json => print_json(&records)?,
            OutputFormat::Quiet => {
                for record in records {
                    println!("{}", record.doc_id);
                }
            }
        }
        Ok(())
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One line per record for list output
fn format_record_row(record: &DocRecord) -> String {
    let mut row = record.doc_id.to_string();

    if let Some(name) = &record.name {
        row.push_str(&format!(" | {}", truncate(name, 30)));
    }
    if let Some(lines) = &record.lines {
        let preview = lines.first().map(String::as_str).unwrap_or("");
        row.push_str(&format!(
            " | {} line(s) | {}",
            lines.len(),
            truncate(preview, 40)
        ));
    }
    if let Some(deleted_at) = record.deleted_at {
        row.push_str(&format!(" | deleted {}", deleted_at.format("%Y-%m-%d %H:%M")));
    }

    row
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
