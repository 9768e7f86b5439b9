use std::path::Path;

use anyhow::Context;

use super::output_table::{Cell, Column, OutputTable};

/// Serializes output tables and reads them back for previews.
pub trait TabularWriter {
    fn write_csv(&self, table: &OutputTable, filepath: &Path) -> anyhow::Result<()>;

    fn read_csv(&self, filepath: &Path) -> anyhow::Result<OutputTable>;
}

/// Comma separated values with a header row and no row index column.
#[derive(Debug, Default)]
pub struct CsvTableWriter;

impl TabularWriter for CsvTableWriter {
    fn write_csv(&self, table: &OutputTable, filepath: &Path) -> anyhow::Result<()> {
        write_table_to_csv(table, filepath)
    }

    fn read_csv(&self, filepath: &Path) -> anyhow::Result<OutputTable> {
        read_table_from_csv(filepath)
    }
}

pub fn write_table_to_csv(table: &OutputTable, filepath: &Path) -> anyhow::Result<()> {
    if table.columns().is_empty() {
        std::fs::File::create(filepath).with_context(|| format!("Creating {:?}", filepath))?;
        return Ok(());
    }
    let mut writer =
        csv::Writer::from_path(filepath).with_context(|| format!("Creating {:?}", filepath))?;
    writer.write_record(table.column_names())?;
    for index in 0..table.row_count() {
        if let Some(row) = table.row(index) {
            writer.write_record(row.iter().map(|cell| cell.to_string()))?;
        }
    }
    writer
        .flush()
        .with_context(|| format!("Flushing {:?}", filepath))?;
    Ok(())
}

/// Every cell is read as text, empty fields as null.
pub fn read_table_from_csv(filepath: &Path) -> anyhow::Result<OutputTable> {
    let mut reader =
        csv::Reader::from_path(filepath).with_context(|| format!("Opening {:?}", filepath))?;
    let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut cells: Vec<Vec<Cell>> = vec![Vec::new(); names.len()];
    let mut row_count = 0;
    for record in reader.records() {
        let record = record.with_context(|| format!("Reading row {} of {:?}", row_count, filepath))?;
        for (column, value) in cells.iter_mut().zip(record.iter()) {
            column.push(match value {
                "" => Cell::Null,
                value => Cell::Text(value.to_string()),
            });
        }
        row_count += 1;
    }

    let mut table = OutputTable::new(row_count);
    for (name, cells) in names.iter().zip(cells) {
        table.push_column(Column::new(name, cells))?;
    }
    Ok(table)
}
