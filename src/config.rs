use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::error::Error;
use crate::shape::Shape;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_DATA_DIR_NAME: &str = "squid_game_data";
pub const DEFAULT_ASSETS_DIR: &str = "assets";
/// Size of the canvas on the drawing page.
pub const DEFAULT_CANVAS: (u32, u32) = (300, 300);

pub const SAMPLES_FILE_NAME: &str = "X.npy";
pub const LABELS_FILE_NAME: &str = "y.npy";

pub const ENV_PORT: &str = "PORT";
pub const ENV_DATA_DIR: &str = "SHAPE_SKETCH_DATA_DIR";
pub const ENV_ASSETS_DIR: &str = "SHAPE_SKETCH_ASSETS_DIR";
pub const ENV_CANVAS: &str = "SHAPE_SKETCH_CANVAS";

/// Where samples and the consolidated arrays live on disk.
/// Shared by the ingest store and the dataset builder.
#[derive(Debug, Clone)]
pub struct DataConfig
{
    pub base_dir: PathBuf,
    buckets: HashMap<Shape, PathBuf>,
    /// (width, height) every submission must have, if enforced.
    pub canvas: Option<(u32, u32)>,
}

impl DataConfig
{
    /// Buckets are laid out as `<base_dir>/<shape dir name>`.
    pub fn new(base_dir: impl Into<PathBuf>) -> DataConfig
    {
        let base_dir = base_dir.into();
        let buckets = Shape::ALL
            .iter()
            .map(|shape| (*shape, base_dir.join(shape.dir_name())))
            .collect();
        DataConfig
        {
            base_dir,
            buckets,
            canvas: Some(DEFAULT_CANVAS),
        }
    }

    pub fn with_canvas(mut self, canvas: Option<(u32, u32)>) -> DataConfig
    {
        self.canvas = canvas;
        self
    }

    /// Points a bucket at a different subdirectory of the base directory.
    pub fn with_bucket(mut self, shape: Shape, subdir: impl AsRef<Path>) -> DataConfig
    {
        let dir = self.base_dir.join(subdir);
        self.buckets.insert(shape, dir);
        self
    }

    pub fn bucket_dir(&self, shape: Shape) -> &Path
    {
        // Every variant is inserted by `new`.
        &self.buckets[&shape]
    }

    pub fn samples_path(&self) -> PathBuf
    {
        self.base_dir.join(SAMPLES_FILE_NAME)
    }

    pub fn labels_path(&self) -> PathBuf
    {
        self.base_dir.join(LABELS_FILE_NAME)
    }

    /// Creates the data directory and every bucket that doesn't exist yet,
    /// then clears out files left behind by a process that was killed
    /// mid-write. Meant for startup, before any request is served.
    pub fn ensure_buckets(&self) -> std::io::Result<()>
    {
        std::fs::create_dir_all(&self.base_dir)?;
        for shape in Shape::ALL
        {
            std::fs::create_dir_all(self.bucket_dir(shape))?;
        }
        let swept = self.sweep_stale_files()?;
        if swept > 0
        {
            info!("Removed {} stale temporary files under {:?}", swept, self.base_dir);
        }
        Ok(())
    }

    /// Removes unfinished array writes and backups (`.X.npy.<uuid>.tmp`,
    /// `.y.npy.<uuid>.bak`, ...) from the data directory and unfinished
    /// uploads (`.<uuid>.part`) from every bucket. Returns how many went.
    pub fn sweep_stale_files(&self) -> std::io::Result<usize>
    {
        let outputs = [SAMPLES_FILE_NAME, LABELS_FILE_NAME].map(|name| format!(".{}.", name));
        let mut swept = remove_matching(&self.base_dir, |name| {
            outputs.iter().any(|prefix| name.starts_with(prefix.as_str()))
                && (name.ends_with(".tmp") || name.ends_with(".bak"))
        })?;
        for shape in Shape::ALL
        {
            swept += remove_matching(self.bucket_dir(shape), |name| {
                name.starts_with('.') && name.ends_with(".part")
            })?;
        }
        Ok(swept)
    }
}

fn remove_matching(dir: &Path, stale: impl Fn(&str) -> bool) -> std::io::Result<usize>
{
    let mut removed = 0;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1)
    {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() || !stale(&entry.file_name().to_string_lossy())
        {
            continue;
        }
        debug!("Removing stale file {:?}", entry.path());
        std::fs::remove_file(entry.path())?;
        removed += 1;
    }
    Ok(removed)
}

impl Default for DataConfig
{
    fn default() -> Self
    {
        DataConfig::new(std::env::temp_dir().join(DEFAULT_DATA_DIR_NAME))
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig
{
    pub port: u16,
    pub assets_dir: PathBuf,
    pub data: DataConfig,
}

impl Default for ServerConfig
{
    fn default() -> Self
    {
        ServerConfig
        {
            port: DEFAULT_PORT,
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
            data: DataConfig::default(),
        }
    }
}

impl ServerConfig
{
    pub fn from_env() -> Result<ServerConfig, Error>
    {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the configuration from `lookup`, falling back to the defaults
    /// for every variable that is unset or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<ServerConfig, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        let mut config = ServerConfig::default();

        if let Some(value) = get(ENV_PORT)
        {
            config.port = value.trim().parse().map_err(|_| Error::InvalidEnv { var: ENV_PORT, value })?;
        }
        if let Some(value) = get(ENV_ASSETS_DIR)
        {
            config.assets_dir = PathBuf::from(value);
        }
        if let Some(value) = get(ENV_DATA_DIR)
        {
            config.data = DataConfig::new(value);
        }
        if let Some(value) = get(ENV_CANVAS)
        {
            let canvas = parse_canvas(&value).ok_or(Error::InvalidEnv { var: ENV_CANVAS, value })?;
            config.data = config.data.with_canvas(canvas);
        }

        Ok(config)
    }
}

/// `"WxH"` enforces a canvas size, `"any"` disables the check.
fn parse_canvas(value: &str) -> Option<Option<(u32, u32)>>
{
    let value = value.trim();
    if value.eq_ignore_ascii_case("any")
    {
        return Some(None);
    }
    let (width, height) = value.split_once(['x', 'X'])?;
    let width: u32 = width.trim().parse().ok()?;
    let height: u32 = height.trim().parse().ok()?;
    if width == 0 || height == 0
    {
        return None;
    }
    Some(Some((width, height)))
}
