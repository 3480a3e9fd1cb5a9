use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Magnetometer saw too little rotation, mean half range {mean_half_range:.2}uT is below {threshold:.2}uT")]
    InsufficientExcitation {
        mean_half_range: f32,
        threshold: f32,
    },
    #[error("Could not read sensor: {0}")]
    Sensor(#[from] anyhow::Error),
    #[error("Could not store calibration: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO Error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Could not serialize calibration record: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemapError {
    #[error("Could not parse axis {0:?}, expected a sign and an axis like \"+x\" or \"-z\"")]
    BadAxis(String),
    #[error("Axis remap uses chip axis {0} more than once")]
    NotPermutation(char),
}
