//! CSV export of table rows
//!
//! Fields are comma-joined without quoting; values containing commas are not
//! supported.

use crate::Result;
use std::path::Path;
use tracing::info;

pub fn render_csv(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

pub fn write_csv(rows: &[Vec<String>], path: &Path) -> Result<()> {
    std::fs::write(path, render_csv(rows))?;
    info!(path = %path.display(), rows = rows.len(), "Wrote CSV");
    Ok(())
}
