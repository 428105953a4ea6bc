//! Table formatting utilities using comfy-table.

use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

use super::Status;

/// A table with bold headers in the shared rounded style.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(*h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        )
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Prints one row per project; the first column is the project name.
pub fn print_project_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = new_table(headers);
    for row in rows {
        let cells: Vec<Cell> = row
            .into_iter()
            .enumerate()
            .map(|(idx, value)| {
                if idx == 0 {
                    Cell::new(value).fg(Color::White)
                } else {
                    Cell::new(value).fg(Color::DarkGrey)
                }
            })
            .collect();
        table.add_row(cells);
    }
    println!("{}", table);
}

/// Prints `(status, project, details)` rows.
pub fn print_status_table(rows: &[(Status, String, String)]) {
    let mut table = new_table(&["Status", "Project", "Details"]);
    for (status, project, details) in rows {
        let color = match status {
            Status::Success => Color::Green,
            Status::Error => Color::Red,
            Status::Warning => Color::Yellow,
            Status::Info => Color::Cyan,
        };
        table.add_row(vec![
            Cell::new(status.symbol()).fg(color),
            Cell::new(project).fg(Color::White),
            Cell::new(details),
        ]);
    }
    println!("{}", table);
}
