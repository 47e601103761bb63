//! # Disk Cache Policy

use anyhow::{Context, bail};
use burn::config::Config;
use burn::data::network::downloader;
use std::fs::{File, create_dir_all, remove_file};
use std::io::Write;
use std::path::PathBuf;

/// Disk cache policy, rooted at ``~/.cache/{root_cache_key}``.
#[derive(Config, Debug)]
pub struct DiskCacheConfig {
    /// Key for the root cache directory.
    #[config(default = "\"hsi-uda\".to_string()")]
    pub root_cache_key: String,

    /// Override for the parent of the root cache directory.
    ///
    /// Defaults to ``~/.cache``.
    #[config(default = "None")]
    pub cache_home: Option<PathBuf>,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskCacheConfig {
    /// Fetch the base cache directory.
    ///
    /// If the cache directory does not exist, does not create it.
    pub fn base_cache_dir(&self) -> anyhow::Result<PathBuf> {
        let home = match &self.cache_home {
            Some(path) => path.clone(),
            None => dirs::home_dir()
                .context("unable to locate the home directory")?
                .join(".cache"),
        };
        Ok(home.join(&self.root_cache_key))
    }

    /// Fetch the base cache directory.
    ///
    /// If the cache directory does not exist, creates it.
    pub fn ensure_base_cache_dir(&self) -> anyhow::Result<PathBuf> {
        let dir = self.base_cache_dir()?;
        if !dir.exists() {
            create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    /// Map a resource key to a cache path.
    ///
    /// Does not ensure that the path (or any of the parents) exist.
    pub fn resource_to_path(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.base_cache_dir()?;
        Ok(resource_key.iter().fold(path, |acc, s| acc.join(s)))
    }

    /// Map a resource key to a cache path and ensure the parent directory exists.
    pub fn ensure_resource_parent_dir(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.resource_to_path(resource_key)?;
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                create_dir_all(parent)?;
            }
        }
        Ok(path)
    }

    /// Fetch a Resource to the Cache.
    pub fn fetch_resource(
        &self,
        url: &str,
        resource: &[String],
    ) -> anyhow::Result<PathBuf> {
        let cache_file_path = self.ensure_resource_parent_dir(resource)?;
        try_cache_download_to_path(url, cache_file_path)
    }
}

/// Download a URL resource to a given path.
///
/// If the path already exists, does nothing.
///
/// # Returns
///
/// The cache path.
pub fn try_cache_download_to_path(
    url: &str,
    cache_file_path: PathBuf,
) -> anyhow::Result<PathBuf> {
    if cache_file_path.exists() {
        tracing::debug!(path = %cache_file_path.display(), "cache hit");
        return Ok(cache_file_path);
    }

    let file_name = cache_file_path
        .file_name()
        .with_context(|| format!("cache path has no file name: {cache_file_path:?}"))?
        .to_string_lossy()
        .to_string();

    tracing::info!(url, path = %cache_file_path.display(), "downloading");
    let bytes = downloader::download_file_as_bytes(url, &file_name);

    let mut output_file = File::create(&cache_file_path)?;
    let bytes_written = output_file.write(&bytes)?;

    if bytes_written != bytes.len() {
        remove_file(&cache_file_path)?;
        bail!("Failed to write the whole file: {url}");
    }

    Ok(cache_file_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_paths() {
        let home = tempfile::tempdir().unwrap();
        let cache = DiskCacheConfig::new().with_cache_home(Some(home.path().to_path_buf()));

        assert_eq!(
            cache.base_cache_dir().unwrap(),
            home.path().join("hsi-uda")
        );

        let key = vec!["weights".to_string(), "resnet18.pth".to_string()];
        let path = cache.ensure_resource_parent_dir(&key).unwrap();
        assert_eq!(path, home.path().join("hsi-uda/weights/resnet18.pth"));
        assert!(path.parent().unwrap().is_dir());
        assert!(!path.exists());
    }

    #[test]
    fn test_cached_file_is_not_downloaded() {
        let home = tempfile::tempdir().unwrap();
        let path = home.path().join("present.bin");
        std::fs::write(&path, b"abc").unwrap();

        // An unreachable URL; an existing file short-circuits the download.
        let found = try_cache_download_to_path("http://invalid.invalid/present.bin", path.clone())
            .unwrap();
        assert_eq!(found, path);
        assert_eq!(std::fs::read(found).unwrap(), b"abc");
    }
}
