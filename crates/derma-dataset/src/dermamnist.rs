//! DermaMNIST archive acquisition and split loading.
//!
//! The archive is a single `dermamnist.npz` (a zip of `.npy` arrays) holding
//! `{train,val,test}_images` as `uint8[N, 28, 28, 3]` and
//! `{train,val,test}_labels` as `uint8[N, 1]`.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use derma_core::{DataSplit, Error, Result, CHANNELS, NUM_CLASSES};
use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};
use zip::ZipArchive;

use crate::dataset::DermaItem;
use crate::npy::{parse_u8_array, NpyArray};

/// Public download location of the 28x28 DermaMNIST archive
pub const DERMAMNIST_URL: &str = "https://zenodo.org/records/10519652/files/dermamnist.npz?download=1";

/// File name of the cached archive inside the data root
pub const ARCHIVE_NAME: &str = "dermamnist.npz";

/// Upper bound on the up-front buffer for one archive member. The largest
/// real member (`train_images.npy`) is about 16.5 MB.
const MAX_MEMBER_RESERVE: usize = 32 << 20;

/// Provider for the DermaMNIST splits cached under a data root
#[derive(Debug, Clone)]
pub struct DermaMnist {
    root: PathBuf,
    url: String,
}

impl DermaMnist {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            url: DERMAMNIST_URL.to_string(),
        }
    }

    /// Override the download URL (mirrors, local fixtures)
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_path(&self) -> PathBuf {
        self.root.join(ARCHIVE_NAME)
    }

    /// Return the cached archive path, downloading it first if allowed
    pub fn ensure_archive(&self, download: bool) -> Result<PathBuf> {
        let path = self.archive_path();
        if path.exists() {
            debug!("Using cached archive {:?}", path);
            return Ok(path);
        }

        if !download {
            return Err(Error::Dataset(format!(
                "{} not found and downloading is disabled",
                path.display()
            )));
        }

        fs::create_dir_all(&self.root)?;
        download_archive(&self.url, &path)?;
        Ok(path)
    }

    /// Load every item of `split`, downloading the archive when needed
    pub fn load(&self, split: DataSplit, download: bool) -> Result<Vec<DermaItem>> {
        let path = self.ensure_archive(download)?;
        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;
        let items = read_split(&mut archive, split)?;
        info!("Loaded {} {} samples from {:?}", items.len(), split, path);
        Ok(items)
    }
}

/// Decode one split from an open archive
pub fn read_split<R: Read + Seek>(archive: &mut ZipArchive<R>, split: DataSplit) -> Result<Vec<DermaItem>> {
    let prefix = split.archive_prefix();
    let images = read_member(archive, &format!("{prefix}_images.npy"))?;
    let labels = read_member(archive, &format!("{prefix}_labels.npy"))?;

    let (count, height, width) = match images.shape.as_slice() {
        [n, h, w, c] if *c == CHANNELS => (*n, *h, *w),
        other => {
            return Err(Error::Dataset(format!(
                "{prefix}_images has shape {other:?}, expected [N, H, W, {CHANNELS}]"
            )));
        }
    };

    let label_count = match labels.shape.as_slice() {
        [n] | [n, 1] => *n,
        other => {
            return Err(Error::Dataset(format!(
                "{prefix}_labels has shape {other:?}, expected [N, 1]"
            )));
        }
    };

    if label_count != count {
        return Err(Error::Dataset(format!(
            "{prefix} split has {count} images but {label_count} labels"
        )));
    }

    let image_len = height * width * CHANNELS;
    if image_len == 0 {
        return Err(Error::Dataset(format!("{prefix}_images has zero-sized images")));
    }

    images
        .data
        .chunks_exact(image_len)
        .zip(labels.data.iter())
        .map(|(pixels, &label)| {
            let label = label as usize;
            if label >= NUM_CLASSES {
                return Err(Error::Dataset(format!(
                    "label {label} outside 0..{NUM_CLASSES} in {prefix} split"
                )));
            }
            let image = RgbImage::from_raw(width as u32, height as u32, pixels.to_vec())
                .ok_or_else(|| Error::Dataset(format!("short image buffer in {prefix} split")))?;
            Ok(DermaItem::new(image, label))
        })
        .collect()
}

fn read_member<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<NpyArray> {
    let mut member = archive
        .by_name(name)
        .map_err(|e| Error::Archive(format!("{name}: {e}")))?;
    let mut bytes = Vec::with_capacity(reserve_hint(member.size()));
    member.read_to_end(&mut bytes)?;
    parse_u8_array(&bytes)
}

/// Capacity to reserve for a member whose header claims `claimed` bytes
fn reserve_hint(claimed: u64) -> usize {
    usize::try_from(claimed).map_or(MAX_MEMBER_RESERVE, |n| n.min(MAX_MEMBER_RESERVE))
}

/// Stream `url` to `dest` through a temporary `.part` file
fn download_archive(url: &str, dest: &Path) -> Result<()> {
    info!("Downloading DermaMNIST from {}", url);

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(600))
        .build()?;
    let response = client.get(url).send()?.error_for_status()?;

    let progress = match response.content_length() {
        Some(len) => {
            let pb = ProgressBar::new(len);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                    .map_err(|e| Error::Download(e.to_string()))?
                    .progress_chars("#>-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let partial = dest.with_extension("npz.part");
    {
        let mut writer = BufWriter::new(File::create(&partial)?);
        let mut reader = progress.wrap_read(response);
        std::io::copy(&mut reader, &mut writer)
            .map_err(|e| Error::Download(format!("transfer from {url} failed: {e}")))?;
        writer.flush()?;
    }
    progress.finish_and_clear();

    fs::rename(&partial, dest)?;
    info!("Saved archive to {:?}", dest);
    Ok(())
}
