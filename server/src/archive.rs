use std::{
    fmt,
    io::Read,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use flate2::read::MultiGzDecoder;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, instrument};

pub const HOURS_PER_DAY: u8 = 24;

/// One hourly archive, formatted `YYYY-MM-DD-H` with an unpadded hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HourKey {
    pub date: NaiveDate,
    pub hour: u8,
}

impl HourKey {
    pub fn new(date: NaiveDate, hour: u8) -> Option<Self> {
        (hour < HOURS_PER_DAY).then_some(Self { date, hour })
    }

    pub fn day(date: NaiveDate) -> Vec<Self> {
        (0..HOURS_PER_DAY).map(|hour| Self { date, hour }).collect()
    }

    pub fn file_name(&self) -> String {
        format!("{self}.json.gz")
    }
}

impl fmt::Display for HourKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.date.format("%Y-%m-%d"), self.hour)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid hour key: {0}")]
pub struct InvalidHourKey(String);

impl FromStr for HourKey {
    type Err = InvalidHourKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidHourKey(s.to_string());
        let (date, hour) = s.rsplit_once('-').ok_or_else(invalid)?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid())?;
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        Self::new(date, hour).ok_or_else(invalid)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to download {hour}: {source}")]
    Http {
        hour: HourKey,
        #[source]
        source: reqwest::Error,
    },
    #[error("archive {hour} answered with HTTP {status}")]
    Status {
        hour: HourKey,
        status: reqwest::StatusCode,
    },
    #[error("failed to stage {hour}: {source}")]
    Io {
        hour: HourKey,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DecompressError {
    #[error("corrupt or truncated archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decompression task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A downloaded archive waiting in the staging folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArchive {
    pub hour: HourKey,
    pub path: PathBuf,
}

impl StagedArchive {
    /// Inflates the archive into newline-delimited JSON text. Invalid UTF-8
    /// is replaced, so only the affected lines are at risk of being dropped.
    pub async fn decompress(&self) -> Result<String, DecompressError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || decompress_file(&path)).await?
    }

    pub async fn remove(self) -> std::io::Result<()> {
        fs::remove_file(&self.path).await
    }
}

fn decompress_file(path: &Path) -> Result<String, DecompressError> {
    let io_error = |source| DecompressError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(io_error)?;
    let mut bytes = Vec::new();
    MultiGzDecoder::new(std::io::BufReader::new(file))
        .read_to_end(&mut bytes)
        .map_err(io_error)?;
    Ok(String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Produces the compressed archive for an hour in the staging folder.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    async fn fetch(&self, hour: HourKey) -> Result<StagedArchive, FetchError>;
}

pub struct HttpArchive {
    client: reqwest::Client,
    base_url: String,
    folder: PathBuf,
}

impl HttpArchive {
    pub fn new(
        base_url: String,
        folder: PathBuf,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            folder,
        })
    }

    pub fn url(&self, hour: HourKey) -> String {
        format!("{}/{}", self.base_url, hour.file_name())
    }
}

#[async_trait]
impl ArchiveSource for HttpArchive {
    #[instrument(skip(self))]
    async fn fetch(&self, hour: HourKey) -> Result<StagedArchive, FetchError> {
        let io_error = |source| FetchError::Io { hour, source };
        let http_error = |source| FetchError::Http { hour, source };

        fs::create_dir_all(&self.folder).await.map_err(io_error)?;
        let path = self.folder.join(hour.file_name());

        let url = self.url(hour);
        debug!("Downloading {url}");
        let mut response = self.client.get(&url).send().await.map_err(http_error)?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                hour,
                status: response.status(),
            });
        }

        let mut output = fs::File::create(&path).await.map_err(io_error)?;
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await.map_err(http_error)? {
            output.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len();
        }
        output.flush().await.map_err(io_error)?;

        info!("Downloaded {} ({} bytes)", hour, written);
        Ok(StagedArchive { hour, path })
    }
}
