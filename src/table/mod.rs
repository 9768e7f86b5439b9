pub mod csv_table;
pub mod output_table;
