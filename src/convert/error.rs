use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Shapefile not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Error reading shapefile: {0:#}")]
    Read(#[source] anyhow::Error),
    #[error("Error reprojecting features to {target}: {source:#}")]
    Reproject {
        target: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Error saving CSV file: {0:#}")]
    Write(#[source] anyhow::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
