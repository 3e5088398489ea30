use comfy_table::{presets, CellAlignment, Table};
use serde::Serialize;

use crate::app::GlobalOptions;

/// Print `data` as JSON (if `--json`) or call `display_fn` for human-readable output.
pub fn print_output<T: Serialize>(
    data: &T,
    opts: &GlobalOptions,
    display_fn: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if opts.json {
        let json = serde_json::to_string_pretty(data)?;
        println!("{json}");
    } else {
        display_fn(data);
    }
    Ok(())
}

/// Header of one listing column. Counts are right-aligned.
pub struct Column {
    header: &'static str,
    count: bool,
}

impl Column {
    pub const fn text(header: &'static str) -> Self {
        Self {
            header,
            count: false,
        }
    }

    pub const fn count(header: &'static str) -> Self {
        Self {
            header,
            count: true,
        }
    }
}

/// A record printed as one or more rows of a borderless listing.
pub trait Listing {
    const COLUMNS: &'static [Column];

    /// Rows for this record, each with one cell per column.
    fn rows(&self) -> Vec<Vec<String>>;
}

/// Print `items` under their column headers, two spaces between columns.
pub fn print_listing<'a, T: Listing + 'a>(items: impl IntoIterator<Item = &'a T>) {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_header(T::COLUMNS.iter().map(|column| column.header));
    for item in items {
        for row in item.rows() {
            table.add_row(row);
        }
    }

    for (index, column) in T::COLUMNS.iter().enumerate() {
        if let Some(target) = table.column_mut(index) {
            target.set_padding((0, 2));
            if column.count {
                target.set_cell_alignment(CellAlignment::Right);
            }
        }
    }

    for line in table.lines() {
        println!("{}", line.trim_end());
    }
}
