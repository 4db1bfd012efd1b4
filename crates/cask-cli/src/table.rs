use std::io::IsTerminal;

use comfy_table::presets::NOTHING;
use comfy_table::{Attribute, Cell, Table};

/// Plain, borderless tables; headers and keys are bold on a color terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TableStyle {
    pub bold: bool,
}

impl TableStyle {
    pub(crate) fn detect() -> Self {
        style_for(std::io::stdout().is_terminal(), std::env::var_os("NO_COLOR").is_some())
    }

    fn emphasis(self, text: &str) -> Cell {
        let cell = Cell::new(text);
        if self.bold {
            cell.add_attribute(Attribute::Bold)
        } else {
            cell
        }
    }

    pub(crate) fn data_table(self, headers: &[&str]) -> Table {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_header(headers.iter().map(|h| self.emphasis(h)).collect::<Vec<_>>());
        table
    }

    pub(crate) fn kv_table(self) -> Table {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table
    }

    pub(crate) fn kv(self, table: &mut Table, key: &str, value: impl ToString) {
        table.add_row(vec![self.emphasis(key), Cell::new(value.to_string())]);
    }
}

fn style_for(is_tty: bool, no_color: bool) -> TableStyle {
    TableStyle {
        bold: is_tty && !no_color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_only_on_color_terminals() {
        assert!(style_for(true, false).bold);
        assert!(!style_for(true, true).bold);
        assert!(!style_for(false, false).bold);
    }

    #[test]
    fn kv_rows_render_without_borders() {
        let style = style_for(false, false);
        let mut table = style.kv_table();
        style.kv(&mut table, "Files", 3);
        let out = table.to_string();
        assert!(out.contains("Files"));
        assert!(!out.contains('|'));
    }
}
