// ============================================================
// Layer 6 — Model Repository
// ============================================================
// Resolves a model repository id to artifact paths on disk.
//
// A repository id is one of:
//   - a local directory containing the artifacts, used as-is
//     (nothing is copied or cached)
//   - an http(s) base URL serving the artifacts; each file is
//     downloaded once into the local cache and reused on every
//     later run, so a process restart does not re-download
//
// Artifacts of a packaged model:
//   config.json   — ModelSpec: labels, working resolution,
//                   preprocessing parameters
//   model.mpk.gz  — recorded weights (the recorder appends the
//                   extension itself, so paths here carry the
//                   bare stem)
//
// Private repositories: an optional bearer token is sent with
// every download request. The token never appears in logs.
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Model config file name inside a repository
const CONFIG_FILE: &str = "config.json";

/// Recorded weights file name inside a repository
const WEIGHTS_FILE: &str = "model.mpk.gz";

/// Weights path stem — the recorder appends ".mpk.gz"
const WEIGHTS_STEM: &str = "model";

/// Environment variable overriding the download cache location
const CACHE_DIR_ENV: &str = "MODEL_CACHE_DIR";

/// Default download cache, relative to the working directory
const DEFAULT_CACHE_DIR: &str = ".model-cache";

/// Per-request timeout for artifact downloads
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Resolved on-disk locations of one model's artifacts.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    /// Full path to config.json
    pub config: PathBuf,

    /// Weights path WITHOUT the ".mpk.gz" extension — the
    /// recorder that loads it appends the extension itself
    pub weights_stem: PathBuf,
}

/// Fetches model artifacts from a local directory or an HTTP
/// repository, caching downloads on disk.
pub struct ModelRepository {
    cache_dir: PathBuf,
}

impl ModelRepository {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self { cache_dir: cache_dir.into() }
    }

    /// Cache location from MODEL_CACHE_DIR, or the default.
    pub fn from_env() -> Self {
        let dir = std::env::var(CACHE_DIR_ENV)
            .unwrap_or_else(|_| DEFAULT_CACHE_DIR.to_string());
        Self::new(dir)
    }

    /// Resolve `repo` to artifact paths, downloading if needed.
    pub fn fetch(&self, repo: &str, token: Option<&str>) -> Result<ModelArtifacts> {
        if repo.starts_with("http://") || repo.starts_with("https://") {
            self.fetch_remote(repo, token)
        } else {
            self.fetch_local(Path::new(repo))
        }
    }

    /// A local repository is just a directory — verify the
    /// artifacts are present and hand back their paths.
    fn fetch_local(&self, dir: &Path) -> Result<ModelArtifacts> {
        if !dir.is_dir() {
            bail!("model repository '{}' is not a directory", dir.display());
        }

        let config = dir.join(CONFIG_FILE);
        if !config.is_file() {
            bail!(
                "model repository '{}' has no {CONFIG_FILE}",
                dir.display()
            );
        }

        let weights = dir.join(WEIGHTS_FILE);
        if !weights.is_file() {
            bail!(
                "model repository '{}' has no {WEIGHTS_FILE}",
                dir.display()
            );
        }

        tracing::debug!("Using local model repository '{}'", dir.display());
        Ok(ModelArtifacts {
            config,
            weights_stem: dir.join(WEIGHTS_STEM),
        })
    }

    /// Download config.json and the weights from an HTTP base
    /// URL into the cache. Files already cached are reused.
    fn fetch_remote(&self, base_url: &str, token: Option<&str>) -> Result<ModelArtifacts> {
        let slot = self.cache_dir.join(cache_slug(base_url));
        fs::create_dir_all(&slot)
            .with_context(|| format!("cannot create cache dir '{}'", slot.display()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .context("cannot build HTTP client")?;

        for file in [CONFIG_FILE, WEIGHTS_FILE] {
            let target = slot.join(file);
            if target.is_file() {
                tracing::debug!("Cache hit for '{}'", target.display());
                continue;
            }
            let url = format!("{}/{}", base_url.trim_end_matches('/'), file);
            download(&client, &url, token, &target)?;
        }

        Ok(ModelArtifacts {
            config:       slot.join(CONFIG_FILE),
            weights_stem: slot.join(WEIGHTS_STEM),
        })
    }
}

/// Download one artifact to `target`, writing through a
/// temporary file so an interrupted download never leaves a
/// half-written artifact that later looks like a cache hit.
fn download(
    client: &reqwest::blocking::Client,
    url: &str,
    token: Option<&str>,
    target: &Path,
) -> Result<()> {
    tracing::info!("Downloading '{}'", url);

    let mut request = client.get(url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .with_context(|| format!("request to '{url}' failed"))?;
    if !response.status().is_success() {
        bail!("'{}' answered {}", url, response.status());
    }

    let body = response
        .bytes()
        .with_context(|| format!("cannot read response body from '{url}'"))?;

    let partial = target.with_extension("partial");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("cannot create '{}'", partial.display()))?;
    file.write_all(&body)?;
    file.flush()?;
    drop(file);
    fs::rename(&partial, target)
        .with_context(|| format!("cannot finalise '{}'", target.display()))?;

    tracing::info!("Saved '{}' ({} bytes)", target.display(), body.len());
    Ok(())
}

/// A filesystem-safe cache directory name for a repository URL.
fn cache_slug(url: &str) -> String {
    url.trim_end_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("pneumo-detect-tests")
            .join(format!("{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_cache_slug_is_filesystem_safe() {
        let slug = cache_slug("https://models.example.org/xray/v2/");
        assert_eq!(slug, "https___models_example_org_xray_v2");
        assert!(!slug.contains('/'));
    }

    #[test]
    fn test_local_repo_missing_dir_fails() {
        let repo = ModelRepository::new(scratch_dir("cache-a"));
        let err = repo.fetch("/definitely/not/a/dir", None).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_local_repo_missing_config_fails() {
        let dir = scratch_dir("empty-repo");
        let repo = ModelRepository::new(scratch_dir("cache-b"));
        let err = repo.fetch(dir.to_str().unwrap(), None).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE));
    }

    #[test]
    fn test_local_repo_resolves_artifact_paths() {
        let dir = scratch_dir("full-repo");
        fs::write(dir.join(CONFIG_FILE), "{}").unwrap();
        fs::write(dir.join(WEIGHTS_FILE), b"not real weights").unwrap();

        let repo = ModelRepository::new(scratch_dir("cache-c"));
        let artifacts = repo.fetch(dir.to_str().unwrap(), None).unwrap();

        assert_eq!(artifacts.config, dir.join(CONFIG_FILE));
        // Bare stem — no extension; the recorder appends it
        assert_eq!(artifacts.weights_stem, dir.join(WEIGHTS_STEM));
        assert!(artifacts.weights_stem.extension().is_none());
    }
}
