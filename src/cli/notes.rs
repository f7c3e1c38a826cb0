//! Read-only view of the note store

use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::error::NoteguardResult;
use crate::models::Record;

use super::context::AppContext;

#[derive(Tabled)]
struct NoteRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Tags")]
    tags: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&Record> for NoteRow {
    fn from(record: &Record) -> Self {
        let title = if record.flags.encrypted {
            "(encrypted)".to_string()
        } else {
            record.title.clone()
        };

        Self {
            id: record.id,
            title,
            tags: record.tags.iter().cloned().collect::<Vec<_>>().join(", "),
            created: record.created_at.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Handle `notes`
pub fn handle_notes_command(ctx: &AppContext) -> NoteguardResult<()> {
    let records = ctx.store.get_all()?;

    if records.is_empty() {
        println!("No notes stored.");
        return Ok(());
    }

    let rows: Vec<NoteRow> = records.iter().map(NoteRow::from).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    println!("Total: {} note(s)", records.len());
    Ok(())
}
