use anyhow::{anyhow, Context};

pub type EpsgCode = u32;

/// The standard geographic reference, longitude/latitude on WGS84.
pub const WGS84_EPSG: EpsgCode = 4326;

pub fn epsg_code_to_authority_string(code: EpsgCode) -> String {
    format!("EPSG:{}", code)
}

/// Returns the EPSG code of a spatial reference, if it carries one.
pub fn epsg_code(spatial_ref: &gdal::spatial_ref::SpatialRef) -> Option<EpsgCode> {
    match spatial_ref.auth_name() {
        Ok(name) if name.eq_ignore_ascii_case("EPSG") => {}
        _ => return None,
    }
    spatial_ref
        .auth_code()
        .ok()
        .and_then(|code| EpsgCode::try_from(code).ok())
}

pub fn is_epsg(spatial_ref: &gdal::spatial_ref::SpatialRef, code: EpsgCode) -> bool {
    epsg_code(spatial_ref) == Some(code)
}

/// Definition string PROJ accepts for a spatial reference.
///
/// Spatial references with an EPSG authority are passed as `EPSG:<code>`. Everything else,
/// e.g. the ESRI flavoured WKT found in `.prj` sidecar files, is passed as WKT.
pub fn proj_definition(spatial_ref: &gdal::spatial_ref::SpatialRef) -> anyhow::Result<String> {
    if let Some(code) = epsg_code(spatial_ref) {
        return Ok(epsg_code_to_authority_string(code));
    }
    let wkt = spatial_ref
        .to_wkt()
        .context("Exporting spatial ref to WKT")?;
    if wkt.is_empty() {
        return Err(anyhow!("Spatial ref has neither an EPSG code nor a WKT definition"));
    }
    Ok(wkt)
}

/// Human readable description used in progress output.
pub fn describe(spatial_ref: &gdal::spatial_ref::SpatialRef) -> String {
    let name = spatial_ref.name().unwrap_or_else(|_| "unnamed".to_string());
    match epsg_code(spatial_ref) {
        Some(code) => format!("{} ({})", epsg_code_to_authority_string(code), name),
        None => name,
    }
}
