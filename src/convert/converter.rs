use std::path::{Path, PathBuf};

use geo::Centroid;

use super::error::ConvertError;
use crate::crs::crs_utils::{describe, epsg_code_to_authority_string, is_epsg, EpsgCode, WGS84_EPSG};
use crate::geofile::feature::{geometry_type_name, FeatureSet};
use crate::geofile::gdal_geofile::{geometry_to_wkt, GdalReader, VectorReader};
use crate::table::csv_table::{CsvTableWriter, TabularWriter};
use crate::table::output_table::{Cell, Column, OutputTable};

/// How geometries are flattened into table columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CoordFormat {
    /// Point coordinates if any feature is a point, centroids otherwise.
    #[default]
    Separate,
    /// Geometry as Well-Known Text.
    Wkt,
    /// Centroid coordinates for every geometry.
    Centroid,
    /// Drop geometry entirely.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    /// When false the geometry is dropped regardless of `coord_format`.
    pub include_geometry: bool,
    pub coord_format: CoordFormat,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            include_geometry: true,
            coord_format: CoordFormat::Separate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConverterConfig {
    /// Spatial reference the coordinate columns are expressed in.
    pub target_epsg: EpsgCode,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            target_epsg: WGS84_EPSG,
        }
    }
}

pub const LONGITUDE_COLUMN: &str = "longitude";
pub const LATITUDE_COLUMN: &str = "latitude";
pub const GEOMETRY_TYPE_COLUMN: &str = "geometry_type";
pub const GEOMETRY_WKT_COLUMN: &str = "geometry_wkt";

/// Destination used when none is given: the source path with a `.csv` extension.
pub fn default_destination(source: &Path) -> PathBuf {
    source.with_extension("csv")
}

pub struct Converter<R: VectorReader, W: TabularWriter> {
    reader: R,
    writer: W,
    config: ConverterConfig,
}

impl Converter<GdalReader, CsvTableWriter> {
    pub fn with_config(config: ConverterConfig) -> Self {
        Self::new(GdalReader::new(true), CsvTableWriter, config)
    }
}

impl<R: VectorReader, W: TabularWriter> Converter<R, W> {
    pub fn new(reader: R, writer: W, config: ConverterConfig) -> Self {
        Self {
            reader,
            writer,
            config,
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Convert the vector dataset at `source` to CSV and return the path written to.
    pub fn convert(
        &self,
        source: &Path,
        destination: Option<&Path>,
        options: &ConvertOptions,
    ) -> Result<PathBuf, ConvertError> {
        if !source.exists() {
            return Err(ConvertError::NotFound(source.to_path_buf()));
        }

        let mut feature_set = self.reader.read(source).map_err(ConvertError::Read)?;
        log::info!("Successfully loaded {} features", feature_set.len());
        if feature_set.is_empty() {
            log::warn!("{:?} contains no features, writing a header only", source);
        }
        log::info!("Geometry type(s): {:?}", feature_set.geometry_types());
        log::info!(
            "Coordinate Reference System: {}",
            feature_set
                .spatial_ref
                .as_ref()
                .map_or_else(|| "None".to_string(), describe)
        );

        let destination = destination
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_destination(source));

        feature_set = self.ensure_target_crs(feature_set)?;

        let table = derive_table(&feature_set, options)?;

        self.writer
            .write_csv(&table, &destination)
            .map_err(ConvertError::Write)?;
        log::info!("Successfully saved CSV to: {:?}", destination);
        log::info!("CSV shape: {:?}", table.shape());
        log::info!("Columns: {:?}", table.column_names());
        Ok(destination)
    }

    /// Reproject to the configured target unless the features already are in it or declare no
    /// spatial reference at all.
    fn ensure_target_crs(&self, feature_set: FeatureSet) -> Result<FeatureSet, ConvertError> {
        let target = self.config.target_epsg;
        let needs_reprojection = match &feature_set.spatial_ref {
            Some(spatial_ref) => !is_epsg(spatial_ref, target),
            None => {
                log::debug!("No spatial reference declared, keeping coordinates as they are");
                false
            }
        };
        if !needs_reprojection {
            return Ok(feature_set);
        }
        self.reader
            .reproject(feature_set, target)
            .map_err(|source| ConvertError::Reproject {
                target: epsg_code_to_authority_string(target),
                source,
            })
    }
}

/// Convert with the GDAL reader, the CSV writer and the default configuration.
pub fn convert(
    source: &Path,
    destination: Option<&Path>,
    options: &ConvertOptions,
) -> Result<PathBuf, ConvertError> {
    Converter::with_config(ConverterConfig::default()).convert(source, destination, options)
}

/// Build the output table: attribute columns in schema order, followed by the columns the
/// coordinate format derives from the geometry. A derived column named like an attribute
/// replaces that attribute at its position.
pub fn derive_table(
    feature_set: &FeatureSet,
    options: &ConvertOptions,
) -> anyhow::Result<OutputTable> {
    let mut table = OutputTable::new(feature_set.len());
    for (index, name) in feature_set.field_names.iter().enumerate() {
        let cells = feature_set
            .features
            .iter()
            .map(|feature| Cell::from(&feature.attributes[index]))
            .collect();
        table.push_column(Column::new(name, cells))?;
    }

    if !options.include_geometry {
        return Ok(table);
    }
    match options.coord_format {
        CoordFormat::None => {}
        CoordFormat::Separate if feature_set.has_point() => {
            push_point_coordinates(&mut table, feature_set)?;
        }
        CoordFormat::Separate | CoordFormat::Centroid => {
            push_centroid_coordinates(&mut table, feature_set)?;
            push_geometry_types(&mut table, feature_set)?;
        }
        CoordFormat::Wkt => {
            let cells = feature_set
                .features
                .iter()
                .map(|feature| match &feature.geometry {
                    Some(geometry) => Ok(Cell::Text(geometry_to_wkt(
                        geometry,
                        feature.elevations.as_deref(),
                    )?)),
                    None => Ok(Cell::Null),
                })
                .collect::<anyhow::Result<Vec<Cell>>>()?;
            table.set_column(Column::new(GEOMETRY_WKT_COLUMN, cells))?;
            push_geometry_types(&mut table, feature_set)?;
        }
    }
    Ok(table)
}

/// Native coordinates of point features. Any other geometry gets null cells.
fn push_point_coordinates(
    table: &mut OutputTable,
    feature_set: &FeatureSet,
) -> anyhow::Result<()> {
    let coords: Vec<Option<geo::Point>> = feature_set
        .features
        .iter()
        .map(|feature| match &feature.geometry {
            Some(geo::Geometry::Point(point)) => Some(*point),
            _ => None,
        })
        .collect();
    let missing = coords.iter().filter(|coord| coord.is_none()).count();
    if missing > 0 {
        log::warn!(
            "{} of {} features are not points, their coordinates are left empty",
            missing,
            coords.len()
        );
    }
    push_coordinates(table, &coords)
}

fn push_centroid_coordinates(
    table: &mut OutputTable,
    feature_set: &FeatureSet,
) -> anyhow::Result<()> {
    let coords: Vec<Option<geo::Point>> = feature_set
        .features
        .iter()
        .map(|feature| feature.geometry.as_ref().and_then(|geometry| geometry.centroid()))
        .collect();
    push_coordinates(table, &coords)
}

fn push_coordinates(table: &mut OutputTable, coords: &[Option<geo::Point>]) -> anyhow::Result<()> {
    table.set_column(Column::new(
        LONGITUDE_COLUMN,
        coords.iter().map(|coord| Cell::from(coord.map(|point| point.x()))).collect(),
    ))?;
    table.set_column(Column::new(
        LATITUDE_COLUMN,
        coords.iter().map(|coord| Cell::from(coord.map(|point| point.y()))).collect(),
    ))
}

fn push_geometry_types(table: &mut OutputTable, feature_set: &FeatureSet) -> anyhow::Result<()> {
    let cells = feature_set
        .features
        .iter()
        .map(|feature| Cell::from(feature.geometry.as_ref().map(geometry_type_name)))
        .collect();
    table.set_column(Column::new(GEOMETRY_TYPE_COLUMN, cells))
}
