//! Persistence of the consolidated arrays in NumPy's `.npy` format.
//!
//! Samples are written as `|u1` with shape (N, H, W). Labels are written as
//! `<U1`, the dtype NumPy gives an array of one-character strings, so a
//! consumer loading `y.npy` gets back the shape symbols themselves.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::{debug, error, warn};
use ndarray_npy::{write_npy, WritableElement, WriteDataError};
use py_literal::Value as PyValue;
use uuid::Uuid;

use crate::config::DataConfig;
use crate::dataset::Dataset;
use crate::error::BuildError;
use crate::shape::Shape;

/// Every label symbol is a single code point, stored as UCS-4.
pub const LABEL_DESCR: &str = "<U1";

// Each element is exactly the 4 bytes `<U1` describes.
impl WritableElement for Shape
{
    fn type_descriptor() -> PyValue
    {
        PyValue::String(LABEL_DESCR.into())
    }

    fn write<W: io::Write>(&self, mut writer: W) -> Result<(), WriteDataError>
    {
        writer.write_all(&u32::from(self.symbol()).to_le_bytes())?;
        Ok(())
    }

    fn write_slice<W: io::Write>(slice: &[Self], mut writer: W) -> Result<(), WriteDataError>
    {
        for shape in slice
        {
            shape.write(&mut writer)?;
        }
        Ok(())
    }
}

/// Serializes every replacement of the output pair within the process.
///
/// Two builds that each finish their renames while holding this lock can
/// never leave `X.npy` from one and `y.npy` from the other.
static PERSIST_LOCK: Mutex<()> = Mutex::new(());

/// Writes both arrays to their well-known paths, replacing any earlier build.
///
/// Both arrays are written to temporary files next to their targets first;
/// the targets are only replaced once both writes have succeeded. If the
/// labels can't be moved into place, the previous samples file is put back
/// so the pair on disk always comes from one build.
pub fn persist(dataset: &Dataset, config: &DataConfig) -> Result<(), BuildError>
{
    let samples_path = config.samples_path();
    let labels_path = config.labels_path();
    let samples_tmp = temp_path(&samples_path, "tmp");
    let labels_tmp = temp_path(&labels_path, "tmp");

    let written = write_npy(&samples_tmp, &dataset.samples)
        .map_err(|e| BuildError::Persist(format!("{:?}: {}", samples_path, e)))
        .and_then(|_| {
            write_npy(&labels_tmp, &dataset.labels)
                .map_err(|e| BuildError::Persist(format!("{:?}: {}", labels_path, e)))
        });
    if let Err(e) = written
    {
        remove_quietly(&samples_tmp);
        remove_quietly(&labels_tmp);
        return Err(e);
    }

    // The lock guards no data, so a poisoned one is still usable.
    let _guard = PERSIST_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    let backup = match back_up(&samples_path)
    {
        Ok(backup) => backup,
        Err(e) =>
        {
            remove_quietly(&samples_tmp);
            remove_quietly(&labels_tmp);
            return Err(BuildError::Persist(format!("{:?}: {}", samples_path, e)));
        },
    };

    if let Err(e) = std::fs::rename(&samples_tmp, &samples_path)
    {
        remove_quietly(&samples_tmp);
        remove_quietly(&labels_tmp);
        if let Some(backup) = &backup
        {
            remove_quietly(backup);
        }
        return Err(BuildError::Persist(format!("{:?}: {}", samples_path, e)));
    }
    if let Err(e) = std::fs::rename(&labels_tmp, &labels_path)
    {
        remove_quietly(&labels_tmp);
        restore(backup.as_deref(), &samples_path);
        return Err(BuildError::Persist(format!("{:?}: {}", labels_path, e)));
    }

    if let Some(backup) = &backup
    {
        remove_quietly(backup);
    }
    Ok(())
}

/// Links the current file at `target`, if any, to a hidden backup name.
///
/// Falls back to a copy on file systems without hard links.
fn back_up(target: &Path) -> io::Result<Option<PathBuf>>
{
    if !target.is_file()
    {
        return Ok(None);
    }
    let backup = temp_path(target, "bak");
    if let Err(e) = std::fs::hard_link(target, &backup)
    {
        debug!("Could not link {:?} to {:?}, copying instead: {:?}", target, backup, e);
        std::fs::copy(target, &backup)?;
    }
    Ok(Some(backup))
}

/// Puts the backup taken before a failed replacement back over `target`.
/// Without a backup there was no earlier file, so the new one is removed.
fn restore(backup: Option<&Path>, target: &Path)
{
    let restored = match backup
    {
        Some(backup) => std::fs::rename(backup, target),
        None => std::fs::remove_file(target),
    };
    match restored
    {
        Ok(()) => warn!("Restored {:?} after a failed build", target),
        Err(e) => error!("Could not restore {:?}; the output pair is out of sync: {}", target, e),
    }
}

fn temp_path(target: &Path, extension: &str) -> PathBuf
{
    let name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    target.with_file_name(format!(".{}.{}.{}", name, Uuid::new_v4(), extension))
}

fn remove_quietly(path: &Path)
{
    if let Err(e) = std::fs::remove_file(path)
    {
        if e.kind() != io::ErrorKind::NotFound
        {
            debug!("Could not remove {:?}: {:?}", path, e);
        }
    }
}
