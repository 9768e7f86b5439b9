extern crate log;
pub mod convert;
pub mod crs;
pub mod geofile;
pub mod table;
use crate::convert::converter::{ConvertOptions, Converter, ConverterConfig, CoordFormat};
use crate::table::csv_table::TabularWriter;
use clap::Parser;
use std::path::PathBuf;

/// Convert a shapefile to CSV, flattening geometry into coordinate columns.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input shapefile (.shp).
    shapefile: PathBuf,

    /// Output CSV file path. Defaults to the shapefile path with a .csv extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// How to handle coordinates.
    #[arg(long, value_enum, default_value_t = CoordFormat::Separate)]
    coord_format: CoordFormat,

    /// Exclude geometry information entirely.
    #[arg(long)]
    no_geometry: bool,

    /// Number of rows shown in the preview after conversion.
    #[arg(long, default_value_t = 5)]
    preview_rows: usize,
}

fn try_main(args: Args) -> anyhow::Result<()> {
    let options = ConvertOptions {
        include_geometry: !args.no_geometry,
        coord_format: args.coord_format,
    };
    let converter = Converter::with_config(ConverterConfig::default());
    let csv_path = converter.convert(&args.shapefile, args.output.as_deref(), &options)?;

    println!("\nConversion completed successfully!");
    println!("Output file: {}", csv_path.display());

    let table = converter.writer().read_csv(&csv_path)?;
    println!("\nPreview of first {} rows:", args.preview_rows);
    println!("{}", table.preview(args.preview_rows));
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(e) = try_main(args) {
        println!("Error: {}", e);
        std::process::exit(1)
    }
}
