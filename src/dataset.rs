use std::path::{Path, PathBuf};
use std::time::Instant;

use image::ImageFormat;
use log::{debug, info, warn};
use ndarray::{Array1, Array2, Array3, Axis};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use walkdir::WalkDir;

use crate::channel::{self, UnsupportedLayout};
use crate::config::DataConfig;
use crate::error::BuildError;
use crate::npy;
use crate::shape::Shape;

/// (N, H, W) single-channel drawings.
pub type SampleTensor = Array3<u8>;
/// Length-N labels; `labels[i]` is the shape of `samples[i]`.
pub type LabelVector = Array1<Shape>;

#[derive(Debug, Clone)]
pub struct Dataset
{
    pub samples: SampleTensor,
    pub labels: LabelVector,
    /// Samples contributed by each bucket, in traversal order.
    pub counts: Vec<(Shape, usize)>,
}

impl Dataset
{
    pub fn len(&self) -> usize
    {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.labels.is_empty()
    }

    pub fn count(&self, shape: Shape) -> usize
    {
        self.counts
            .iter()
            .find(|(s, _)| *s == shape)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    /// (height, width) shared by every sample.
    pub fn image_dim(&self) -> (usize, usize)
    {
        let (_, height, width) = self.samples.dim();
        (height, width)
    }

    /// One line per bucket, e.g. `X: 3, O: 0, ■: 1, ▲: 2`.
    pub fn summary(&self) -> String
    {
        self.counts
            .iter()
            .map(|(shape, count)| format!("{}: {}", shape, count))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Consolidates every bucket into one sample tensor and one label vector.
#[derive(Debug, Clone)]
pub struct DatasetBuilder
{
    config: DataConfig,
}

impl DatasetBuilder
{
    pub fn new(config: DataConfig) -> DatasetBuilder
    {
        DatasetBuilder { config }
    }

    pub fn config(&self) -> &DataConfig
    {
        &self.config
    }

    /// Assembles the dataset from the current bucket contents and writes
    /// both arrays to their well-known paths.
    ///
    /// Either the whole dataset is written or nothing is: a single bad
    /// sample fails the build, and an empty dataset writes no files.
    pub fn build(&self) -> Result<Dataset, BuildError>
    {
        let now = Instant::now();
        let dataset = self.assemble()?;
        npy::persist(&dataset, &self.config)?;
        info!(
            "Built dataset of {} samples ({}) at {}x{} in {:?}",
            dataset.len(),
            dataset.summary(),
            dataset.image_dim().1,
            dataset.image_dim().0,
            now.elapsed()
        );
        Ok(dataset)
    }

    /// Reads every bucket into memory without writing anything.
    ///
    /// Every bucket is listed up front so the tensor can be allocated once at
    /// its final size; each bucket's decoded samples are copied into their
    /// rows and dropped before the next bucket is decoded.
    pub fn assemble(&self) -> Result<Dataset, BuildError>
    {
        let listings = Shape::ALL
            .into_iter()
            .map(|shape| Ok((shape, self.list_bucket(shape)?)))
            .collect::<Result<Vec<(Shape, Vec<PathBuf>)>, BuildError>>()?;
        let total: usize = listings.iter().map(|(_, files)| files.len()).sum();
        if total == 0
        {
            return Err(BuildError::EmptyDataset);
        }

        let mut tensor: Option<SampleTensor> = None;
        let mut labels: Vec<Shape> = Vec::with_capacity(total);
        let mut counts = Vec::with_capacity(Shape::ALL.len());

        for (shape, files) in listings
        {
            if files.is_empty()
            {
                debug!("Bucket {} is empty", shape);
                counts.push((shape, 0));
                continue;
            }

            // Decode in parallel; collect keeps the listing order.
            let decoded = files
                .par_iter()
                .map(|path| load_sample(shape, path))
                .collect::<Vec<Result<Array2<u8>, BuildError>>>();

            for (path, sample) in files.iter().zip(decoded)
            {
                let sample = sample?;
                let found = sample.dim();
                // The first sample fixes (H, W) for the whole tensor.
                let rows = tensor.get_or_insert_with(|| Array3::zeros((total, found.0, found.1)));
                let (_, height, width) = rows.dim();
                if (height, width) != found
                {
                    return Err(BuildError::ShapeMismatch {
                        label: shape,
                        filename: file_name(path),
                        expected: (height, width),
                        found,
                    });
                }
                rows.index_axis_mut(Axis(0), labels.len()).assign(&sample);
                labels.push(shape);
            }
            counts.push((shape, files.len()));
        }

        let samples = tensor.ok_or(BuildError::EmptyDataset)?;
        Ok(Dataset
        {
            samples,
            labels: Array1::from(labels),
            counts,
        })
    }

    /// Sample files of one bucket, sorted by file name.
    ///
    /// Only files with an image extension count; partially written
    /// uploads and other hidden files are skipped.
    pub fn list_bucket(&self, shape: Shape) -> Result<Vec<PathBuf>, BuildError>
    {
        let bucket = self.config.bucket_dir(shape);
        if !bucket.exists()
        {
            warn!("Bucket {:?} for {} does not exist", bucket, shape);
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(bucket).min_depth(1).max_depth(1).sort_by_file_name()
        {
            let entry = entry.map_err(std::io::Error::from)?;
            let is_hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !entry.file_type().is_file() || is_hidden
            {
                continue;
            }
            if ImageFormat::from_path(entry.path()).is_err()
            {
                debug!("Skipping non-image file {:?}", entry.path());
                continue;
            }
            files.push(entry.into_path());
        }
        Ok(files)
    }
}

fn load_sample(shape: Shape, path: &Path) -> Result<Array2<u8>, BuildError>
{
    let image = image::open(path).map_err(|e| BuildError::DecodeFailure {
        label: shape,
        filename: file_name(path),
        reason: e.to_string(),
    })?;

    channel::intensity_channel(&image).map_err(|UnsupportedLayout { channels }| {
        BuildError::UnsupportedChannels {
            label: shape,
            filename: file_name(path),
            channels,
        }
    })
}

fn file_name(path: &Path) -> String
{
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
