use crate::diff::ChangeEvent;
use crate::record::Message;
use crate::store::DatabaseInfo;
use chrono::DateTime;
use std::fmt::Write;

const RULE_WIDTH: usize = 80;

/// Render a change event as a transcript block. `NoChange` renders to "".
pub fn render(event: &ChangeEvent) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = match event {
        ChangeEvent::NewConversation { record, .. } => {
            write_header(
                &mut out,
                '=',
                &[
                    format!("COMPOSER ID: {}", record.id),
                    format!("CREATED: {}", format_millis(record.created_at)),
                ],
            )
            .and_then(|_| write_messages(&mut out, &record.messages))
        }
        ChangeEvent::Appended {
            conversation_id,
            from,
            messages,
            ..
        } => write_header(
            &mut out,
            '-',
            &[
                format!("NEW MESSAGES IN CHAT: {}", conversation_id),
                format!(
                    "{} new message(s), {} -> {}",
                    messages.len(),
                    from,
                    from + messages.len()
                ),
            ],
        )
        .and_then(|_| write_messages(&mut out, messages)),
        ChangeEvent::NoChange { .. } => Ok(()),
    };
    out
}

fn write_header(out: &mut String, rule: char, lines: &[String]) -> std::fmt::Result {
    let rule_line = rule.to_string().repeat(RULE_WIDTH);
    writeln!(out)?;
    writeln!(out, "{}", rule_line)?;
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    writeln!(out)
}

fn write_messages(out: &mut String, messages: &[Message]) -> std::fmt::Result {
    for msg in messages.iter().filter(|m| !m.text.is_empty()) {
        write!(out, "[{}]:\n{}\n\n", msg.role.label(), msg.text)?;
    }
    Ok(())
}

/// Epoch milliseconds as UTC wall time; absent, zero or out of range is `unknown`.
pub fn format_millis(millis: Option<i64>) -> String {
    millis
        .filter(|&ms| ms != 0)
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Table overview for `--info`.
pub fn render_database_info(info: &DatabaseInfo) -> String {
    let mut out = String::new();
    let _ = write_database_info(&mut out, info);
    out
}

fn write_database_info(out: &mut String, info: &DatabaseInfo) -> std::fmt::Result {
    writeln!(out, "Database file: {}", info.path.display())?;
    writeln!(out, "File size: {} bytes", info.file_size)?;
    writeln!(out, "Tables: {}", info.tables.len())?;
    for table in &info.tables {
        writeln!(out)?;
        writeln!(out, "Table: {}", table.name)?;
        writeln!(out, "Columns: {}", table.columns.join(", "))?;
        writeln!(out, "Row count: {}", table.row_count)?;
    }
    Ok(())
}
