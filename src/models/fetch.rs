use crate::error::{PullError, Result};
use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Remote source the channel fetchers pull from
pub trait Transport {
    /// List the files of a hub repository at a revision
    fn list_repo_files(&self, repo_id: &str, revision: &str, token: Option<&str>)
        -> Result<Vec<String>>;

    /// Download one file of a hub repository to `dest`
    fn download_repo_file(
        &self,
        repo_id: &str,
        revision: &str,
        filename: &str,
        token: Option<&str>,
        dest: &Path,
    ) -> Result<()>;

    /// Download a plain URL to `dest`, without credentials
    fn download_url(&self, url: &str, dest: &Path) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
}

/// Blocking HTTP transport against a Hugging Face compatible endpoint
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    show_progress: bool,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("client", &"Client { ... }")
            .field("endpoint", &self.endpoint.as_str())
            .field("show_progress", &self.show_progress)
            .finish()
    }
}

impl HttpTransport {
    /// Create new transport
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("modelpull/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PullError::Network(format!("Failed to create HTTP client: {e}")))?;

        Self::with_client(client, endpoint)
    }

    fn with_client(client: Client, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| PullError::Config(format!("Invalid hub endpoint '{endpoint}': {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(PullError::Config(format!(
                "Invalid hub endpoint '{endpoint}': not a base URL"
            )));
        }

        Ok(Self {
            client,
            endpoint,
            show_progress: true,
        })
    }

    /// Enable or disable per-file progress bars
    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Endpoint URL with `segments` appended, each one percent-encoded
    /// (a `/` inside a segment becomes `%2F`)
    fn endpoint_url<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn send(request: RequestBuilder, url: &str) -> Result<Response> {
        let response = request.send().map_err(|e| match e.status() {
            Some(status) => PullError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            },
            None => PullError::Network(format!("{url}: {e}")),
        })?;

        if !response.status().is_success() {
            return Err(PullError::Http {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }

    fn get(&self, url: &str, token: Option<&str>) -> Result<Response> {
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Self::send(request, url)
    }

    fn save(&self, response: Response, label: &str, dest: &Path) -> Result<()> {
        let pb = if self.show_progress {
            let pb = response
                .content_length()
                .map_or_else(ProgressBar::new_spinner, ProgressBar::new);
            let style = ProgressStyle::with_template(
                "{msg} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec})",
            )
            .map_err(|e| PullError::Network(format!("Invalid progress template: {e}")))?
            .progress_chars("=> ");
            pb.set_style(style);
            pb.set_message(label.to_string());
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut reader = pb.wrap_read(response);
        let mut file = File::create(dest)?;
        let mut buf = vec![0u8; 64 * 1024];
        let mut written: u64 = 0;

        // Read errors are transfer failures; write errors are local I/O.
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(PullError::Network(format!("Failed to read {label}: {e}")));
                }
            };
            file.write_all(&buf[..n])?;
            written += n as u64;
        }
        file.flush()?;
        pb.finish_and_clear();

        debug!("Wrote {written} bytes to {}", dest.display());
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn list_repo_files(
        &self,
        repo_id: &str,
        revision: &str,
        token: Option<&str>,
    ) -> Result<Vec<String>> {
        let url = self.endpoint_url(
            ["api", "models"]
                .into_iter()
                .chain(repo_id.split('/'))
                .chain(["revision", revision]),
        );
        debug!("Listing {url}");

        let info: RepoInfo = self
            .get(url.as_str(), token)?
            .json()
            .map_err(|e| PullError::Network(format!("Invalid repository listing from {url}: {e}")))?;

        Ok(info.siblings.into_iter().map(|s| s.rfilename).collect())
    }

    fn download_repo_file(
        &self,
        repo_id: &str,
        revision: &str,
        filename: &str,
        token: Option<&str>,
        dest: &Path,
    ) -> Result<()> {
        let url = self.endpoint_url(
            repo_id
                .split('/')
                .chain(["resolve", revision])
                .chain(filename.split('/')),
        );
        debug!("Downloading from URL: {url}");

        let response = self.get(url.as_str(), token)?;
        self.save(response, filename, dest)
    }

    fn download_url(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self.get(url, None)?;
        let label = dest
            .file_name()
            .map_or_else(|| url.to_string(), |n| n.to_string_lossy().into_owned());
        self.save(response, &label, dest)
    }
}

/// Compile glob patterns from config strings
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| PullError::Config(format!("Invalid pattern '{p}': {e}")))
        })
        .collect()
}

/// Local path for a repository file, rejecting anything that escapes `dest`
fn repo_file_path(dest: &Path, filename: &str) -> Result<PathBuf> {
    let relative = Path::new(filename);
    let safe = !filename.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

    if !safe {
        return Err(PullError::Config(format!(
            "Refusing to write repository file outside the model directory: '{filename}'"
        )));
    }

    Ok(dest.join(relative))
}

/// Local filename for a direct download: the URL's last path segment
pub fn url_filename(url: &str) -> Result<String> {
    let parsed =
        Url::parse(url).map_err(|e| PullError::Config(format!("Invalid URL '{url}': {e}")))?;

    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(ToString::to_string)
        .ok_or_else(|| PullError::Config(format!("URL has no file name: '{url}'")))
}

/// Pulls a whole hub repository into a directory
pub struct SnapshotFetcher<'a> {
    transport: &'a dyn Transport,
    revision: &'a str,
    token: Option<&'a str>,
    ignore: &'a [Pattern],
}

impl<'a> SnapshotFetcher<'a> {
    #[must_use]
    pub fn new(
        transport: &'a dyn Transport,
        revision: &'a str,
        token: Option<&'a str>,
        ignore: &'a [Pattern],
    ) -> Self {
        Self {
            transport,
            revision,
            token,
            ignore,
        }
    }

    fn is_ignored(&self, filename: &str) -> bool {
        self.ignore.iter().any(|p| p.matches(filename))
    }

    /// Populate `dest` with every non-ignored file of `repo_id`.
    ///
    /// A 401/403 from the hub becomes [`PullError::AuthRequired`]; every other
    /// failure is returned unchanged.
    pub fn fetch(&self, repo_id: &str, dest: &Path) -> Result<()> {
        let as_auth = |e: PullError| {
            if e.is_auth_status() {
                PullError::AuthRequired {
                    repo: repo_id.to_string(),
                }
            } else {
                e
            }
        };

        let files = self
            .transport
            .list_repo_files(repo_id, self.revision, self.token)
            .map_err(as_auth)?;

        for filename in files {
            if self.is_ignored(&filename) {
                debug!("Skipping {filename}");
                continue;
            }

            let local = repo_file_path(dest, &filename)?;
            if let Some(parent) = local.parent() {
                fs::create_dir_all(parent)?;
            }

            info!("Downloading {repo_id}/{filename}");
            self.transport
                .download_repo_file(repo_id, self.revision, &filename, self.token, &local)
                .map_err(as_auth)?;
        }

        Ok(())
    }
}

/// Downloads a list of URLs one by one
pub struct DirectFetcher<'a> {
    transport: &'a dyn Transport,
}

impl<'a> DirectFetcher<'a> {
    #[must_use]
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Fetch each URL into `dest`, stopping at the first failure
    pub fn fetch(&self, urls: &[String], dest: &Path) -> Result<()> {
        for url in urls {
            let local = dest.join(url_filename(url)?);
            info!("Downloading {url}");
            self.transport.download_url(url, &local)?;
        }
        Ok(())
    }
}
