use anyhow::{anyhow, Context};
use gdal::vector::LayerAccess;
use indicatif::ProgressBar;
use proj::Transform;
use std::path::Path;

use super::feature::{AttributeValue, Feature, FeatureSet};
use crate::crs::crs_utils::{describe, epsg_code_to_authority_string, proj_definition, EpsgCode};

pub enum GdalDriverType {
    Shapefile,
    GeoJson,
}

impl GdalDriverType {
    pub fn name(&self) -> &'static str {
        match self {
            GdalDriverType::Shapefile => "ESRI Shapefile",
            GdalDriverType::GeoJson => "GeoJSON",
        }
    }
}

/// Loads vector datasets and moves them between coordinate reference systems.
pub trait VectorReader {
    fn read(&self, filepath: &Path) -> anyhow::Result<FeatureSet>;

    fn reproject(&self, feature_set: FeatureSet, target: EpsgCode) -> anyhow::Result<FeatureSet>;
}

/// `VectorReader` backed by GDAL/OGR for reading and PROJ for reprojection.
#[derive(Debug, Default)]
pub struct GdalReader {
    /// Draw a progress bar while reading features.
    pub show_progress: bool,
}

impl GdalReader {
    pub fn new(show_progress: bool) -> Self {
        Self { show_progress }
    }
}

impl VectorReader for GdalReader {
    fn read(&self, filepath: &Path) -> anyhow::Result<FeatureSet> {
        read_features_from_geofile(filepath, self.show_progress)
    }

    fn reproject(&self, feature_set: FeatureSet, target: EpsgCode) -> anyhow::Result<FeatureSet> {
        project_features(feature_set, target)
    }
}

pub fn read_features_from_geofile(
    filepath: &Path,
    show_progress: bool,
) -> anyhow::Result<FeatureSet> {
    gdal::DriverManager::register_all();
    let mut open_options = gdal::DatasetOptions::default();
    open_options.open_flags = gdal::GdalOpenFlags::GDAL_OF_VECTOR;
    let dataset = gdal::Dataset::open_ex(filepath, open_options)
        .with_context(|| format!("Opening {:?} as a vector dataset", filepath))?;

    let layer_count = dataset.layer_count();
    if 0 == layer_count || 1 < layer_count {
        return Err(anyhow!(
            "Found {} layers, only one layer is supported.",
            layer_count
        ));
    }
    let mut layer = dataset.layer(0)?;
    let spatial_ref = layer.spatial_ref().ok();
    let field_names: Vec<String> = layer.defn().fields().map(|field| field.name()).collect();
    log::debug!("Layer fields: {:?}", field_names);

    let bar = if show_progress {
        ProgressBar::new(layer.feature_count())
    } else {
        ProgressBar::hidden()
    };
    let mut features = Vec::new();
    for gdal_feature in layer.features() {
        let is_null = unsafe { gdal_sys::OGR_F_GetGeometryRef(gdal_feature.c_feature()).is_null() };
        let (geometry, elevations) = if is_null {
            (None, None)
        } else {
            let gdal_geometry = gdal_feature.geometry_by_index(0)?;
            let geometry = to_planar_geometry(gdal_geometry).with_context(|| {
                format!(
                    "Converting geometry of feature {} to geo types",
                    features.len()
                )
            })?;
            (Some(geometry), elevations(gdal_geometry))
        };
        let attributes = gdal_feature
            .fields()
            .map(|(_, value)| AttributeValue::from(value))
            .collect();
        features.push(Feature {
            geometry,
            elevations,
            attributes,
        });
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(FeatureSet {
        field_names,
        features,
        spatial_ref,
    })
}

/// 2D copy of a GDAL geometry as geo types. Z and M are dropped, see `elevations` for Z.
fn to_planar_geometry(geometry: &gdal::vector::Geometry) -> anyhow::Result<geo::Geometry> {
    let planar = geometry.clone();
    unsafe {
        gdal_sys::OGR_G_FlattenTo2D(planar.c_geometry());
    }
    Ok(geo::Geometry::try_from(&planar)?)
}

fn has_z(geometry: &gdal::vector::Geometry) -> bool {
    unsafe { gdal_sys::OGR_GT_HasZ(geometry.geometry_type()) != 0 }
}

/// Z values of every vertex in the order geo types iterate coordinates: rings of a polygon
/// exterior first, parts of a collection in order.
fn elevations(geometry: &gdal::vector::Geometry) -> Option<Vec<f64>> {
    if !has_z(geometry) {
        return None;
    }
    let mut elevations = Vec::new();
    collect_elevations(geometry, &mut elevations);
    Some(elevations)
}

fn collect_elevations(geometry: &gdal::vector::Geometry, elevations: &mut Vec<f64>) {
    let part_count = geometry.geometry_count();
    if 0 == part_count {
        elevations.extend(geometry.get_point_vec().into_iter().map(|(_, _, z)| z));
        return;
    }
    for index in 0..part_count {
        collect_elevations(&geometry.get_geometry(index), elevations);
    }
}

/// Transform every geometry of the feature set to the given EPSG code. Z values are kept as
/// they are.
///
/// The feature set must declare a spatial reference. A feature whose coordinates cannot be
/// transformed loses its geometry instead of failing the whole set.
pub fn project_features(feature_set: FeatureSet, target: EpsgCode) -> anyhow::Result<FeatureSet> {
    let source_ref = feature_set
        .spatial_ref
        .as_ref()
        .ok_or_else(|| anyhow!("Features have no spatial reference to project from"))?;
    let source_definition = proj_definition(source_ref)?;
    let target_definition = epsg_code_to_authority_string(target);
    log::debug!(
        "Building transform from {} to {}",
        source_definition,
        target_definition
    );
    log::info!(
        "Projecting features from {} to {}",
        describe(source_ref),
        target_definition
    );
    let projection = proj::Proj::new_known_crs(&source_definition, &target_definition, None)?;

    let mut failed = 0;
    let features: Vec<Feature> = feature_set
        .features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| {
            let projected = feature
                .geometry
                .as_ref()
                .map(|geometry| geometry.transformed(&projection));
            match projected {
                Some(Err(err)) => {
                    log::debug!("Could not project feature {}, {}", index, err);
                    failed += 1;
                    Feature::new(None, feature.attributes)
                }
                Some(Ok(geometry)) => Feature {
                    geometry: Some(geometry),
                    ..feature
                },
                None => feature,
            }
        })
        .collect();
    if failed > 0 {
        log::warn!(
            "{} of {} features could not be projected to {}, their geometry is left empty",
            failed,
            features.len(),
            target_definition
        );
    }
    Ok(FeatureSet {
        field_names: feature_set.field_names,
        features,
        spatial_ref: Some(gdal::spatial_ref::SpatialRef::from_epsg(target)?),
    })
}

fn normalized(geometry: &geo::Geometry) -> geo::Geometry {
    match geometry {
        geo::Geometry::Line(line) => geo::Geometry::LineString(geo::LineString::from(*line)),
        geo::Geometry::Rect(rect) => geo::Geometry::Polygon(rect.to_polygon()),
        geo::Geometry::Triangle(triangle) => geo::Geometry::Polygon(triangle.to_polygon()),
        other => other.clone(),
    }
}

/// Convert a geometry to its GDAL counterpart. 2D geometries go through WKB, geometries with
/// elevations are rebuilt vertex by vertex as 2.5D geometries.
pub fn to_gdal_geometry(
    geometry: &geo::Geometry,
    elevations: Option<&[f64]>,
) -> anyhow::Result<gdal::vector::Geometry> {
    let geometry = normalized(geometry);
    let elevations = match elevations {
        Some(elevations) => elevations,
        None => {
            let wkb = wkb::geom_to_wkb(&geometry)
                .map_err(|err| anyhow!("Could not write geometry to WKB, {:?}", err))?;
            return Ok(gdal::vector::Geometry::from_wkb(&wkb)?);
        }
    };
    let mut remaining = elevations.iter();
    let gdal_geometry = build_3d_geometry(&geometry, &mut remaining)?;
    if remaining.next().is_some() {
        return Err(anyhow!(
            "Geometry has fewer vertices than the {} elevations given",
            elevations.len()
        ));
    }
    Ok(gdal_geometry)
}

fn build_3d_geometry(
    geometry: &geo::Geometry,
    elevations: &mut std::slice::Iter<f64>,
) -> anyhow::Result<gdal::vector::Geometry> {
    use gdal::vector::OGRwkbGeometryType::*;
    match geometry {
        geo::Geometry::Point(point) => build_3d_points(wkbPoint25D, [point.0], elevations),
        geo::Geometry::LineString(line) => {
            build_3d_points(wkbLineString25D, line.coords().copied(), elevations)
        }
        geo::Geometry::Polygon(polygon) => build_3d_polygon(polygon, elevations),
        geo::Geometry::MultiPoint(points) => build_3d_collection(
            wkbMultiPoint25D,
            points.iter().map(|point| geo::Geometry::Point(*point)),
            elevations,
        ),
        geo::Geometry::MultiLineString(lines) => build_3d_collection(
            wkbMultiLineString25D,
            lines.iter().cloned().map(geo::Geometry::LineString),
            elevations,
        ),
        geo::Geometry::MultiPolygon(polygons) => build_3d_collection(
            wkbMultiPolygon25D,
            polygons.iter().cloned().map(geo::Geometry::Polygon),
            elevations,
        ),
        geo::Geometry::GeometryCollection(collection) => build_3d_collection(
            wkbGeometryCollection25D,
            collection.iter().map(normalized),
            elevations,
        ),
        other => Err(anyhow!("Cannot rebuild geometry {:?} in 3D", other)),
    }
}

fn build_3d_points(
    geometry_type: gdal::vector::OGRwkbGeometryType::Type,
    coords: impl IntoIterator<Item = geo::Coord>,
    elevations: &mut std::slice::Iter<f64>,
) -> anyhow::Result<gdal::vector::Geometry> {
    let mut geometry = gdal::vector::Geometry::empty(geometry_type)?;
    for coord in coords {
        let z = elevations
            .next()
            .ok_or_else(|| anyhow!("Geometry has more vertices than elevations"))?;
        geometry.add_point((coord.x, coord.y, *z));
    }
    Ok(geometry)
}

fn build_3d_polygon(
    polygon: &geo::Polygon,
    elevations: &mut std::slice::Iter<f64>,
) -> anyhow::Result<gdal::vector::Geometry> {
    use gdal::vector::OGRwkbGeometryType::*;
    let mut geometry = gdal::vector::Geometry::empty(wkbPolygon25D)?;
    for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
        geometry.add_geometry(build_3d_points(
            wkbLinearRing,
            ring.coords().copied(),
            elevations,
        )?)?;
    }
    Ok(geometry)
}

fn build_3d_collection(
    geometry_type: gdal::vector::OGRwkbGeometryType::Type,
    parts: impl IntoIterator<Item = geo::Geometry>,
    elevations: &mut std::slice::Iter<f64>,
) -> anyhow::Result<gdal::vector::Geometry> {
    let mut geometry = gdal::vector::Geometry::empty(geometry_type)?;
    for part in parts {
        geometry.add_geometry(build_3d_geometry(&part, elevations)?)?;
    }
    Ok(geometry)
}

/// Well-Known Text encoding of a geometry, with Z when elevations are given.
pub fn geometry_to_wkt(geometry: &geo::Geometry, elevations: Option<&[f64]>) -> anyhow::Result<String> {
    Ok(to_gdal_geometry(geometry, elevations)?.wkt()?)
}

fn field_type(
    feature_set: &FeatureSet,
    field_index: usize,
) -> gdal::vector::OGRFieldType::Type {
    use gdal::vector::OGRFieldType::*;
    let first_value = feature_set
        .features
        .iter()
        .map(|feature| &feature.attributes[field_index])
        .find(|value| !matches!(value, AttributeValue::Null));
    match first_value {
        Some(AttributeValue::Integer(_)) => OFTInteger64,
        Some(AttributeValue::Real(_)) => OFTReal,
        _ => OFTString,
    }
}

fn to_field_value(value: &AttributeValue) -> Option<gdal::vector::FieldValue> {
    use gdal::vector::FieldValue::*;
    match value {
        AttributeValue::Null => None,
        AttributeValue::Integer(value) => Some(Integer64Value(*value)),
        AttributeValue::Real(value) => Some(RealValue(*value)),
        AttributeValue::Text(value) => Some(StringValue(value.to_owned())),
    }
}

/// Write a feature set to a single-layer geofile. The layer geometry type is taken from the
/// first feature, field types from the first non-null value of each field.
pub fn write_features_to_geofile(
    feature_set: &FeatureSet,
    output_filepath: &Path,
    driver: GdalDriverType,
) -> anyhow::Result<()> {
    gdal::DriverManager::register_all();
    let driver =
        gdal::DriverManager::get_driver_by_name(driver.name()).context("Getting GDAL driver")?;

    let layer_type = {
        use gdal::vector::OGRwkbGeometryType::*;
        match feature_set
            .features
            .first()
            .and_then(|feature| feature.geometry.as_ref())
        {
            Some(geo::Geometry::Point(_)) => wkbPoint,
            Some(geo::Geometry::LineString(_)) => wkbLineString,
            Some(geo::Geometry::Polygon(_)) => wkbPolygon,
            Some(geo::Geometry::MultiPoint(_)) => wkbMultiPoint,
            Some(geo::Geometry::MultiLineString(_)) => wkbMultiLineString,
            Some(geo::Geometry::MultiPolygon(_)) => wkbMultiPolygon,
            _ => wkbUnknown,
        }
    };

    let layer_name = output_filepath
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("features");
    let mut dataset = driver.create_vector_only(output_filepath)?;
    let layer_options = gdal::LayerOptions {
        name: layer_name,
        srs: feature_set.spatial_ref.as_ref(),
        ty: layer_type,
        options: None,
    };
    let mut layer = dataset.create_layer(layer_options)?;

    let field_definitions: Vec<(&str, gdal::vector::OGRFieldType::Type)> = feature_set
        .field_names
        .iter()
        .enumerate()
        .map(|(index, name)| (name as &str, field_type(feature_set, index)))
        .collect();
    layer.create_defn_fields(&field_definitions)?;

    log::info!(
        "Writing {} features to {:?}",
        feature_set.len(),
        output_filepath
    );
    for (index, feature) in feature_set.features.iter().enumerate() {
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or_else(|| anyhow!("Feature {} has no geometry", index))?;
        let geometry = to_gdal_geometry(geometry, feature.elevations.as_deref())?;

        let mut field_names = Vec::new();
        let mut values = Vec::new();
        for (name, value) in feature_set.field_names.iter().zip(&feature.attributes) {
            if let Some(value) = to_field_value(value) {
                field_names.push(name as &str);
                values.push(value);
            }
        }
        layer.create_feature_fields(geometry, &field_names, &values)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rstest::rstest;
    use testdir::testdir;

    use crate::crs::crs_utils::{is_epsg, WGS84_EPSG};
    use crate::geofile::feature::{AttributeValue, Feature, FeatureSet};

    use super::{
        geometry_to_wkt, project_features, read_features_from_geofile, write_features_to_geofile,
        GdalDriverType,
    };

    fn point_feature_set(epsg: Option<u32>) -> FeatureSet {
        FeatureSet {
            field_names: vec!["name".to_string(), "count".to_string(), "ratio".to_string()],
            features: vec![
                Feature::new(
                    Some(geo::Point::new(80.0, 45.0).into()),
                    vec![
                        AttributeValue::Text("value1".to_string()),
                        AttributeValue::Integer(3),
                        AttributeValue::Real(0.25),
                    ],
                ),
                Feature::new(
                    Some(geo::Point::new(-10.5, 12.0).into()),
                    vec![
                        AttributeValue::Text("other value".to_string()),
                        AttributeValue::Integer(-4),
                        AttributeValue::Real(1.5),
                    ],
                ),
            ],
            spatial_ref: epsg.map(|code| gdal::spatial_ref::SpatialRef::from_epsg(code).unwrap()),
        }
    }

    #[rstest]
    #[case(GdalDriverType::Shapefile, "points.shp")]
    #[case(GdalDriverType::GeoJson, "points.geojson")]
    fn test_geofile_write_read_round_trip(#[case] driver: GdalDriverType, #[case] filename: &str) {
        let test_dir = testdir!();
        let filepath = test_dir.join(filename);
        write_features_to_geofile(&point_feature_set(Some(WGS84_EPSG)), &filepath, driver)
            .unwrap();

        let feature_set = read_features_from_geofile(&filepath, false).unwrap();
        assert_eq!(feature_set.field_names, vec!["name", "count", "ratio"]);
        assert_eq!(feature_set.len(), 2);
        assert!(feature_set.spatial_ref.is_some());

        let first = &feature_set.features[0];
        assert_eq!(first.attributes[0], AttributeValue::Text("value1".to_string()));
        assert_eq!(first.attributes[1], AttributeValue::Integer(3));
        assert_eq!(first.attributes[2], AttributeValue::Real(0.25));
        match first.geometry {
            Some(geo::Geometry::Point(point)) => {
                assert_abs_diff_eq!(point, geo::Point::new(80.0, 45.0), epsilon = 1e-9)
            }
            ref other => panic!("Expected a point, got {:?}", other),
        }
    }

    #[test]
    fn test_shapefile_without_prj_has_no_spatial_ref() {
        let test_dir = testdir!();
        let shapefile_path = test_dir.join("no_crs.shp");
        write_features_to_geofile(
            &point_feature_set(None),
            &shapefile_path,
            GdalDriverType::Shapefile,
        )
        .unwrap();

        let feature_set = read_features_from_geofile(&shapefile_path, false).unwrap();
        assert!(feature_set.spatial_ref.is_none());
    }

    #[test]
    fn test_read_rejects_non_vector_file() {
        let test_dir = testdir!();
        let filepath = test_dir.join("garbage.shp");
        std::fs::write(&filepath, b"definitely not a shapefile").unwrap();
        assert!(read_features_from_geofile(&filepath, false).is_err());
    }

    #[rstest]
    #[case(111319.49079327357, 0.0, 1.0, 0.0)]
    #[case(0.0, 0.0, 0.0, 0.0)]
    #[case(-1113194.9079327357, 0.0, -10.0, 0.0)]
    fn test_project_features_from_web_mercator(
        #[case] x: f64,
        #[case] y: f64,
        #[case] expected_lon: f64,
        #[case] expected_lat: f64,
    ) {
        let feature_set = FeatureSet {
            field_names: vec![],
            features: vec![Feature::from(geo::Geometry::from(geo::Point::new(x, y)))],
            spatial_ref: Some(gdal::spatial_ref::SpatialRef::from_epsg(3857).unwrap()),
        };
        let projected = project_features(feature_set, WGS84_EPSG).unwrap();
        assert!(is_epsg(projected.spatial_ref.as_ref().unwrap(), WGS84_EPSG));
        match projected.features[0].geometry {
            Some(geo::Geometry::Point(point)) => assert_abs_diff_eq!(
                point,
                geo::Point::new(expected_lon, expected_lat),
                epsilon = 1e-6
            ),
            ref other => panic!("Expected a point, got {:?}", other),
        }
    }

    #[test]
    fn test_project_features_empties_unprojectable_rows() {
        let mut feature_set = point_feature_set(Some(WGS84_EPSG));
        feature_set.features[1].geometry = Some(geo::Point::new(0.0, 100.0).into());
        feature_set.features[0].elevations = Some(vec![42.0]);

        let projected = project_features(feature_set, 3857).unwrap();
        assert_eq!(projected.len(), 2);
        assert!(projected.features[0].geometry.is_some());
        assert_eq!(projected.features[0].elevations, Some(vec![42.0]));
        assert!(projected.features[1].geometry.is_none());
        assert_eq!(
            projected.features[1].attributes[0],
            AttributeValue::Text("other value".to_string())
        );
    }

    fn write_geojson(filepath: &std::path::Path, features: &str) {
        std::fs::write(
            filepath,
            format!(
                r#"{{ "type": "FeatureCollection", "features": [{}] }}"#,
                features
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_read_3d_geometries_keeps_elevations() {
        let test_dir = testdir!();
        let filepath = test_dir.join("elevated.geojson");
        write_geojson(
            &filepath,
            r#"
            { "type": "Feature", "properties": { "name": "a" },
              "geometry": { "type": "Point", "coordinates": [1.0, 2.0, 3.0] } },
            { "type": "Feature", "properties": { "name": "b" },
              "geometry": { "type": "LineString",
                "coordinates": [[0.0, 0.0, 10.0], [2.0, 0.0, 20.0]] } }"#,
        );

        let feature_set = read_features_from_geofile(&filepath, false).unwrap();
        assert_eq!(
            feature_set.features[0].geometry,
            Some(geo::Point::new(1.0, 2.0).into())
        );
        assert_eq!(feature_set.features[0].elevations, Some(vec![3.0]));
        assert_eq!(
            feature_set.features[1].geometry,
            Some(geo::LineString::from(vec![(0.0, 0.0), (2.0, 0.0)]).into())
        );
        assert_eq!(feature_set.features[1].elevations, Some(vec![10.0, 20.0]));
    }

    #[test]
    fn test_read_null_geometry_as_absent() {
        let test_dir = testdir!();
        let filepath = test_dir.join("null.geojson");
        write_geojson(
            &filepath,
            r#"
            { "type": "Feature", "properties": { "name": "a" },
              "geometry": { "type": "Point", "coordinates": [1.0, 2.0] } },
            { "type": "Feature", "properties": { "name": "b" }, "geometry": null }"#,
        );

        let feature_set = read_features_from_geofile(&filepath, false).unwrap();
        assert_eq!(feature_set.len(), 2);
        assert!(feature_set.features[0].geometry.is_some());
        assert!(feature_set.features[1].geometry.is_none());
        assert!(feature_set.features[1].elevations.is_none());
    }

    #[test]
    fn test_project_features_requires_spatial_ref() {
        let feature_set = point_feature_set(None);
        assert!(project_features(feature_set, WGS84_EPSG).is_err());
    }

    #[rstest]
    #[case(geo::Point::new(1.0, 2.0).into(), "POINT (1 2)")]
    #[case(geo::LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]).into(), "LINESTRING (0 0,1 1)")]
    #[case(geo::Line::new((0.0, 0.0), (2.0, 0.0)).into(), "LINESTRING (0 0,2 0)")]
    fn test_geometry_to_wkt(#[case] geometry: geo::Geometry, #[case] expected: &str) {
        assert_eq!(geometry_to_wkt(&geometry, None).unwrap(), expected);
    }

    #[rstest]
    #[case(geo::Point::new(1.0, 2.0).into(), vec![3.0], "POINT (1 2 3)")]
    #[case(
        geo::LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]).into(),
        vec![5.0, 6.0],
        "LINESTRING (0 0 5,1 1 6)"
    )]
    #[case(
        geo::Polygon::new(
            geo::LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            vec![],
        )
        .into(),
        vec![1.0, 2.0, 3.0, 1.0],
        "POLYGON ((0 0 1,1 0 2,1 1 3,0 0 1))"
    )]
    #[case(
        geo::MultiPoint::from(vec![(0.0, 0.0), (1.0, 1.0)]).into(),
        vec![7.0, 8.0],
        "MULTIPOINT (0 0 7,1 1 8)"
    )]
    fn test_geometry_to_wkt_keeps_elevations(
        #[case] geometry: geo::Geometry,
        #[case] elevations: Vec<f64>,
        #[case] expected: &str,
    ) {
        assert_eq!(geometry_to_wkt(&geometry, Some(&elevations)).unwrap(), expected);
    }

    #[test]
    fn test_geometry_to_wkt_rejects_mismatched_elevations() {
        let geometry: geo::Geometry = geo::LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]).into();
        assert!(geometry_to_wkt(&geometry, Some(&[1.0])).is_err());
        assert!(geometry_to_wkt(&geometry, Some(&[1.0, 2.0, 3.0])).is_err());
    }
}
