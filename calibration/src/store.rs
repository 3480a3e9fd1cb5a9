//! Persistence for the calibration profile

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{error::StoreError, CalibrationProfile, CALIBRATION_VERSION};

/// What is written to the backing store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub version: u16,
    pub accel_bias: [f32; 3],
    pub mag_bias: [f32; 3],
    pub mag_scale: [f32; 3],
}

/// Outcome of reading the backing store
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadResult {
    Valid(CalibrationProfile),
    /// Nothing stored, or the stored record could not be read
    Absent,
    VersionMismatch { found: u16 },
}

impl LoadResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, LoadResult::Valid(_))
    }

    /// The stored profile, or defaults for anything but a valid record
    pub fn profile(&self) -> CalibrationProfile {
        match self {
            LoadResult::Valid(profile) => *profile,
            LoadResult::Absent | LoadResult::VersionMismatch { .. } => CalibrationProfile::DEFAULT,
        }
    }
}

/// Raw storage for the serialized record
pub trait Backing {
    /// `None` if nothing has been written
    fn read(&mut self) -> Result<Option<String>, StoreError>;
    fn write(&mut self, contents: &str) -> Result<(), StoreError>;
    fn clear(&mut self) -> Result<(), StoreError>;
}

/// Record kept as a TOML file
#[derive(Debug, Clone)]
pub struct FileBacking {
    path: PathBuf,
}

impl FileBacking {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Backing for FileBacking {
    fn read(&mut self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self.io_error(err)),
        }
    }

    fn write(&mut self, contents: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|it| !it.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }

        // Write then rename so a power cut never leaves half a record
        let temp = self.path.with_extension("tmp");
        fs::write(&temp, contents).map_err(|err| self.io_error(err))?;
        fs::rename(&temp, &self.path).map_err(|err| self.io_error(err))
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

/// In memory backing
#[derive(Debug, Clone, Default)]
pub struct MemoryBacking {
    contents: Option<String>,
}

impl MemoryBacking {
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Some(contents.into()),
        }
    }

    pub fn contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }
}

impl Backing for MemoryBacking {
    fn read(&mut self) -> Result<Option<String>, StoreError> {
        Ok(self.contents.clone())
    }

    fn write(&mut self, contents: &str) -> Result<(), StoreError> {
        self.contents = Some(contents.to_owned());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.contents = None;
        Ok(())
    }
}

#[derive(Debug)]
pub struct CalibrationStore<B> {
    backing: B,
}

impl<B: Backing> CalibrationStore<B> {
    pub fn new(backing: B) -> Self {
        Self { backing }
    }

    pub fn backing(&self) -> &B {
        &self.backing
    }

    /// Never fails, unreadable or unparsable records load as [`LoadResult::Absent`]
    #[instrument(level = "debug", skip(self), ret)]
    pub fn load(&mut self) -> LoadResult {
        let contents = match self.backing.read() {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                info!("No stored calibration, using defaults");
                return LoadResult::Absent;
            }
            Err(err) => {
                warn!("Could not read stored calibration, using defaults: {err}");
                return LoadResult::Absent;
            }
        };

        let record: CalibrationRecord = match toml::from_str(&contents) {
            Ok(record) => record,
            Err(err) => {
                warn!("Stored calibration is malformed, using defaults: {err}");
                return LoadResult::Absent;
            }
        };

        if record.version != CALIBRATION_VERSION {
            warn!(
                "Stored calibration has version {:#06x}, expected {:#06x}, using defaults",
                record.version, CALIBRATION_VERSION
            );
            return LoadResult::VersionMismatch {
                found: record.version,
            };
        }

        LoadResult::Valid(CalibrationProfile::from_record(&record))
    }

    /// Persists every field except the gyro bias
    #[instrument(level = "debug", skip(self))]
    pub fn save(&mut self, profile: &CalibrationProfile) -> Result<(), StoreError> {
        let contents = toml::to_string(&profile.record())?;
        self.backing.write(&contents)?;

        debug!("Saved calibration");

        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    pub fn erase(&mut self) -> Result<(), StoreError> {
        self.backing.clear()
    }
}
