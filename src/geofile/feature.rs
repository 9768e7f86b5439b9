use std::collections::BTreeSet;

/// Scalar value of a feature attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<Option<gdal::vector::FieldValue>> for AttributeValue {
    fn from(value: Option<gdal::vector::FieldValue>) -> Self {
        use gdal::vector::FieldValue::*;
        match value {
            None => AttributeValue::Null,
            Some(IntegerValue(value)) => AttributeValue::Integer(value as i64),
            Some(Integer64Value(value)) => AttributeValue::Integer(value),
            Some(RealValue(value)) => AttributeValue::Real(value),
            Some(StringValue(value)) => AttributeValue::Text(value),
            Some(DateValue(value)) => AttributeValue::Text(value.to_string()),
            Some(DateTimeValue(value)) => AttributeValue::Text(value.to_rfc3339()),
            Some(IntegerListValue(values)) => AttributeValue::Text(format_list(&values)),
            Some(Integer64ListValue(values)) => AttributeValue::Text(format_list(&values)),
            Some(RealListValue(values)) => AttributeValue::Text(format_list(&values)),
            Some(StringListValue(values)) => AttributeValue::Text(format_list(&values)),
        }
    }
}

fn format_list<T: std::fmt::Debug>(values: &[T]) -> String {
    format!("{:?}", values)
}

#[derive(Debug, Clone)]
pub struct Feature {
    /// `None` when the feature carries no geometry.
    pub geometry: Option<geo::Geometry>,
    /// Z value of every vertex of `geometry`, in coordinate order. `None` for 2D geometries.
    pub elevations: Option<Vec<f64>>,
    /// Attribute values, aligned with `FeatureSet::field_names`.
    pub attributes: Vec<AttributeValue>,
}

impl Feature {
    pub fn new(geometry: Option<geo::Geometry>, attributes: Vec<AttributeValue>) -> Self {
        Self {
            geometry,
            elevations: None,
            attributes,
        }
    }
}

impl From<geo::Geometry> for Feature {
    fn from(value: geo::Geometry) -> Self {
        Self::new(Some(value), Vec::new())
    }
}

/// Features read from a single layer. All features share the same attribute schema and the
/// spatial reference applies to the whole set.
#[derive(Clone)]
pub struct FeatureSet {
    pub field_names: Vec<String>,
    pub features: Vec<Feature>,
    pub spatial_ref: Option<gdal::spatial_ref::SpatialRef>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Distinct geometry type names, sorted. Features without geometry are not counted.
    pub fn geometry_types(&self) -> BTreeSet<&'static str> {
        self.features
            .iter()
            .filter_map(|feature| feature.geometry.as_ref().map(geometry_type_name))
            .collect()
    }

    pub fn has_point(&self) -> bool {
        self.features
            .iter()
            .any(|feature| matches!(feature.geometry, Some(geo::Geometry::Point(_))))
    }
}

pub fn geometry_type_name(geometry: &geo::Geometry) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) | geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) | geo::Geometry::Rect(_) | geo::Geometry::Triangle(_) => {
            "Polygon"
        }
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
    }
}
