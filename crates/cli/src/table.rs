//! Plain-text table rendering for report output.

use rust_decimal::Decimal;

/// An aligned text table. Columns whose cells are all numeric are right-aligned.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row; missing trailing cells render empty.
    pub fn add_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn render(&self) -> String {
        let columns = self.headers.len();
        let cell = |row: &[String], col: usize| row.get(col).map_or("", String::as_str).to_string();

        let widths: Vec<usize> = (0..columns)
            .map(|col| {
                self.rows
                    .iter()
                    .map(|row| cell(row, col).chars().count())
                    .chain(std::iter::once(self.headers[col].chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let numeric: Vec<bool> = (0..columns)
            .map(|col| {
                let mut cells = self.rows.iter().map(|row| cell(row, col)).filter(|c| !c.is_empty());
                let mut any = false;
                let all = cells.all(|c| {
                    any = true;
                    c.trim_end_matches('%').parse::<f64>().is_ok()
                });
                any && all
            })
            .collect();

        let format_line = |cells: Vec<String>, align_numeric: bool| -> String {
            cells
                .iter()
                .enumerate()
                .map(|(col, value)| {
                    if align_numeric && numeric[col] {
                        format!("{value:>width$}", width = widths[col])
                    } else {
                        format!("{value:<width$}", width = widths[col])
                    }
                })
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let total_width = widths.iter().sum::<usize>() + 2 * columns.saturating_sub(1);
        let mut output = String::new();
        output.push_str(&format_line(self.headers.clone(), false));
        output.push('\n');
        output.push_str(&"-".repeat(total_width));
        output.push('\n');
        for row in &self.rows {
            let cells = (0..columns).map(|col| cell(row, col)).collect();
            output.push_str(&format_line(cells, true));
            output.push('\n');
        }
        output
    }
}

/// Formats a float to `dp` decimal places.
pub fn fixed(value: f64, dp: usize) -> String {
    format!("{value:.dp$}")
}

/// Formats an optional float, empty when absent.
pub fn fixed_opt(value: Option<f64>, dp: usize) -> String {
    value.map(|v| fixed(v, dp)).unwrap_or_default()
}

/// Formats an optional decimal rounded to `dp` places, empty when absent.
pub fn money(value: Option<Decimal>, dp: u32) -> String {
    value
        .map(|v| v.round_dp(dp).to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_render_aligns_columns() {
        let mut table = TextTable::new(["gpu_name", "offers"]);
        table.add_row(vec!["RTX 4090".to_string(), "12".to_string()]);
        table.add_row(vec!["H100 SXM".to_string(), "3".to_string()]);

        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "gpu_name  offers");
        assert_eq!(lines[1], "-".repeat(16));
        assert_eq!(lines[2], "RTX 4090      12");
        assert_eq!(lines[3], "H100 SXM       3");
    }

    #[test]
    fn test_short_rows_render_empty_cells() {
        let mut table = TextTable::new(["a", "b"]);
        table.add_row(vec!["x".to_string()]);
        assert!(table.render().ends_with("x\n"));
    }

    #[test]
    fn test_formatters() {
        assert_eq!(fixed(1.23456, 2), "1.23");
        assert_eq!(fixed_opt(None, 2), "");
        assert_eq!(money(Some(dec!(0.34567)), 3), "0.346");
        assert_eq!(money(None, 3), "");
    }
}
