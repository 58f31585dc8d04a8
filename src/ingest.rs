use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use image::GenericImageView;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::DataConfig;
use crate::error::StoreError;
use crate::payload;
use crate::shape::Shape;

/// Appends submitted drawings to the bucket of their shape.
/// Files are write-once; nothing here ever reads back or replaces a sample.
#[derive(Debug, Clone)]
pub struct IngestStore
{
    config: DataConfig,
}

impl IngestStore
{
    pub fn new(config: DataConfig) -> IngestStore
    {
        IngestStore { config }
    }

    pub fn config(&self) -> &DataConfig
    {
        &self.config
    }

    /// Parses the label and payload as posted by the drawing page and stores the result.
    pub fn store_payload(&self, label: &str, payload: &str) -> Result<PathBuf, StoreError>
    {
        let shape: Shape = label.parse()?;
        let bytes = payload::decode_payload(payload)?;
        self.store(shape, &bytes)
    }

    /// Stores one encoded image under `label`'s bucket and returns its path.
    ///
    /// The bytes are kept as submitted, but must decode as an image and,
    /// when a canvas size is configured, match it.
    /// Every sample gets a fresh random UUID as its file name, so concurrent
    /// submissions never overwrite one another.
    pub fn store(&self, label: Shape, image_bytes: &[u8]) -> Result<PathBuf, StoreError>
    {
        let format = image::guess_format(image_bytes)
            .map_err(|e| StoreError::DecodeFailure(e.to_string()))?;
        let image = image::load_from_memory_with_format(image_bytes, format)
            .map_err(|e| StoreError::DecodeFailure(e.to_string()))?;

        if let Some(expected) = self.config.canvas
        {
            let found = image.dimensions();
            if found != expected
            {
                warn!("Rejected {}x{} drawing for {}", found.0, found.1, label);
                return Err(StoreError::DimensionMismatch { expected, found });
            }
        }

        let bucket = self.config.bucket_dir(label);
        std::fs::create_dir_all(bucket)?;

        let id = Uuid::new_v4();
        let extension = format.extensions_str().first().copied().unwrap_or("img");
        let path = bucket.join(format!("{}.{}", id, extension));
        write_once(bucket, &id, &path, image_bytes)?;

        info!("Stored {} drawing {:?}", label, path);
        Ok(path)
    }
}

/// Writes to a hidden `.part` file first and renames it into place,
/// so the builder only ever lists complete samples.
fn write_once(bucket: &Path, id: &Uuid, path: &Path, bytes: &[u8]) -> std::io::Result<()>
{
    let partial = bucket.join(format!(".{}.part", id));
    let result = (|| {
        let mut file = OpenOptions::new().write(true).create_new(true).open(&partial)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&partial, path)
    })();

    if result.is_err()
    {
        if let Err(e) = std::fs::remove_file(&partial)
        {
            debug!("Could not clean up {:?}: {:?}", partial, e);
        }
    }
    result
}
