//! Saving and restoring trained classifiers.
//!
//! A classifier is written as one bincode record (fixed-width integers,
//! little endian) whose first field is a layout version; loading a record
//! with another version fails with [`CheckpointError::VersionMismatch`].

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug)]
pub enum CheckpointError {
    Io(io::Error),
    /// The bytes could not be encoded or decoded
    Serialization(bincode::Error),
    VersionMismatch { expected: u32, found: u32 },
    /// Stored weights do not fit the stored architecture
    InvalidFormat(String),
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "checkpoint I/O failed: {err}"),
            Self::Serialization(err) => write!(f, "checkpoint encoding failed: {err}"),
            Self::VersionMismatch { expected, found } => {
                write!(f, "checkpoint layout version {found}, this build reads {expected}")
            }
            Self::InvalidFormat(reason) => write!(f, "malformed checkpoint: {reason}"),
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Serialization(err) => Some(err.as_ref()),
            Self::VersionMismatch { .. } | Self::InvalidFormat(_) => None,
        }
    }
}

impl From<io::Error> for CheckpointError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<bincode::Error> for CheckpointError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err)
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .allow_trailing_bytes()
}

/// `Ok` when a record's stored version equals the one this build writes.
pub fn check_version(expected: u32, found: u32) -> Result<(), CheckpointError> {
    if expected != found {
        return Err(CheckpointError::VersionMismatch { expected, found });
    }
    Ok(())
}

/// A model that can be written to and restored from a single file.
pub trait Checkpointable: Sized {
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError>;

    /// Restore a model, rejecting records of another layout version.
    fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError>;

    /// Encode `record` into `path`, creating missing parent directories.
    fn write_snapshot<P, T>(record: &T, path: P) -> Result<(), CheckpointError>
    where
        P: AsRef<Path>,
        T: Serialize,
    {
        let path = path.as_ref();
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)?,
            _ => {}
        }
        let mut out = BufWriter::new(File::create(path)?);
        codec().serialize_into(&mut out, record)?;
        out.flush()?;
        Ok(())
    }

    fn read_snapshot<P, T>(path: P) -> Result<T, CheckpointError>
    where
        P: AsRef<Path>,
        T: DeserializeOwned,
    {
        let input = BufReader::new(File::open(path)?);
        Ok(codec().deserialize_from(input)?)
    }
}
