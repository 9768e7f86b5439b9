use std::fmt;

use anyhow::anyhow;

use crate::geofile::feature::AttributeValue;

/// Scalar cell of an output table. Tables never hold geometries, those are encoded into cells
/// when the coordinate columns are derived.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Integer(value) => write!(f, "{}", value),
            // Debug keeps the decimal point, e.g. `1.0` instead of `1`.
            Cell::Real(value) if value.is_finite() => write!(f, "{:?}", value),
            Cell::Real(_) => Ok(()),
            Cell::Text(value) => f.write_str(value),
        }
    }
}

impl From<&AttributeValue> for Cell {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Null => Cell::Null,
            AttributeValue::Integer(value) => Cell::Integer(*value),
            AttributeValue::Real(value) => Cell::Real(*value),
            AttributeValue::Text(value) => Cell::Text(value.to_owned()),
        }
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Cell::Null, Cell::Real)
    }
}

impl From<Option<&str>> for Cell {
    fn from(value: Option<&str>) -> Self {
        value.map_or(Cell::Null, |value| Cell::Text(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: &str, cells: Vec<Cell>) -> Self {
        Self {
            name: name.to_string(),
            cells,
        }
    }
}

/// Named columns of aligned cells. Column order is the CSV column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputTable {
    columns: Vec<Column>,
    row_count: usize,
}

impl OutputTable {
    pub fn new(row_count: usize) -> Self {
        Self {
            columns: Vec::new(),
            row_count,
        }
    }

    /// Append a column. Its length must match the table's row count and its name must be new.
    pub fn push_column(&mut self, column: Column) -> anyhow::Result<()> {
        if column.cells.len() != self.row_count {
            return Err(anyhow!(
                "Column '{}' has {} cells, table has {} rows",
                column.name,
                column.cells.len(),
                self.row_count
            ));
        }
        if self.column(&column.name).is_some() {
            return Err(anyhow!("Duplicate column '{}'", column.name));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Like `push_column`, except that a column with the same name is replaced in place, keeping
    /// its position.
    pub fn set_column(&mut self, column: Column) -> anyhow::Result<()> {
        match self
            .columns
            .iter()
            .position(|existing| existing.name == column.name)
        {
            Some(index) => {
                if column.cells.len() != self.row_count {
                    return Err(anyhow!(
                        "Column '{}' has {} cells, table has {} rows",
                        column.name,
                        column.cells.len(),
                        self.row_count
                    ));
                }
                self.columns[index] = column;
                Ok(())
            }
            None => self.push_column(column),
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.row_count, self.columns.len())
    }

    pub fn row(&self, index: usize) -> Option<Vec<&Cell>> {
        if index >= self.row_count {
            return None;
        }
        Some(self.columns.iter().map(|column| &column.cells[index]).collect())
    }

    /// Fixed-width rendering of the header and the first `max_rows` rows, with a leading row
    /// index column. Null cells read `NaN`.
    pub fn preview(&self, max_rows: usize) -> String {
        let rows: Vec<Vec<String>> = (0..self.row_count.min(max_rows))
            .filter_map(|index| self.row(index))
            .map(|row| row.iter().map(|cell| preview_text(cell)).collect())
            .collect();

        let index_width = rows.len().saturating_sub(1).to_string().len();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(column_index, column)| {
                rows.iter()
                    .map(|row| row[column_index].chars().count())
                    .chain(std::iter::once(column.name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut lines = Vec::with_capacity(rows.len() + 1);
        let mut header = " ".repeat(index_width);
        for (column, width) in self.columns.iter().zip(&widths) {
            header.push_str(&format!("  {:>width$}", column.name, width = width));
        }
        lines.push(header);
        for (index, row) in rows.iter().enumerate() {
            let mut line = format!("{:<width$}", index, width = index_width);
            for (value, width) in row.iter().zip(&widths) {
                line.push_str(&format!("  {:>width$}", value, width = width));
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

fn preview_text(cell: &Cell) -> String {
    match cell {
        Cell::Null => "NaN".to_string(),
        cell => cell.to_string(),
    }
}
