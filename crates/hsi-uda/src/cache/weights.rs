//! # Pretrained Weight Descriptors

use crate::cache::disk::DiskCacheConfig;
use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

const X25: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_SDLC);

/// Build a cache key (bare cache file name) from a name and URL.
///
/// The key is ``{name}-{url crc hash}-{url basename}``.
pub fn url_to_cache_key(
    name: Option<&str>,
    url: &str,
) -> String {
    let hash = X25.checksum(url.as_bytes()).to_string();
    let base_name = url.rsplit_once('/').map_or(url, |(_, base)| base);
    match name {
        Some(n) => format!("{n}-{hash}-{base_name}"),
        None => format!("{hash}-{base_name}"),
    }
}

/// Get the cache resource key for a pretrained weights file.
///
/// # Arguments
///
/// - `cache_key`: the cache key (the bare cache file name).
///
/// # Returns
///
/// The cache resource key.
pub fn pretrained_weights_resource_key(cache_key: &str) -> Vec<String> {
    vec!["weights".to_string(), cache_key.to_string()]
}

/// Static [`PretrainedWeightsDescriptor`] provider.
#[derive(Debug)]
pub struct StaticPretrainedWeightsDescriptor<'a> {
    /// Name of the weights.
    pub name: &'a str,

    /// Description of the weights.
    pub description: &'a str,

    /// License.
    pub license: Option<&'a str>,

    /// Source URL.
    pub origin: Option<&'a str>,

    /// URLs to download the weights from.
    pub urls: &'a [&'a str],
}

impl StaticPretrainedWeightsDescriptor<'_> {
    /// Convert to a [`PretrainedWeightsDescriptor`].
    pub fn to_descriptor(&self) -> PretrainedWeightsDescriptor {
        PretrainedWeightsDescriptor {
            name: self.name.to_string(),
            description: self.description.to_string(),
            license: self.license.map(|s| s.to_string()),
            origin: self.origin.map(|s| s.to_string()),
            urls: self.urls.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A descriptor for a pretrained weights file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PretrainedWeightsDescriptor {
    /// Name of the weights.
    pub name: String,

    /// Description of the weights.
    pub description: String,

    /// License.
    pub license: Option<String>,

    /// Source URL.
    pub origin: Option<String>,

    /// URLs to download the weights from.
    pub urls: Vec<String>,
}

impl PretrainedWeightsDescriptor {
    fn primary_url(&self) -> anyhow::Result<&str> {
        self.urls
            .first()
            .map(String::as_str)
            .with_context(|| format!("weights {:?} have no download url", self.name))
    }

    /// Cache Key
    ///
    /// The key is ``{name}-{url crc hash}-{url basename}``.
    pub fn cache_key(&self) -> anyhow::Result<String> {
        Ok(url_to_cache_key(Some(&self.name), self.primary_url()?))
    }

    /// Read-Through Cache the Model Weights
    ///
    /// # Returns
    ///
    /// The disk location of the cached weights.
    pub fn fetch_weights_to_disk_cache(
        &self,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<PathBuf> {
        let url = self.primary_url()?;
        let resource = pretrained_weights_resource_key(&self.cache_key()?);

        disk_cache.fetch_resource(url, &resource)
    }
}

/// Static [`PretrainedWeightsMap`] builder.
#[derive(Debug)]
pub struct StaticPretrainedWeightsMap<'a> {
    /// List of static descriptors.
    pub items: &'a [&'a StaticPretrainedWeightsDescriptor<'a>],
}

impl StaticPretrainedWeightsMap<'_> {
    /// Convert to a [`PretrainedWeightsMap`].
    pub fn to_directory(&self) -> PretrainedWeightsMap {
        PretrainedWeightsMap {
            items: self
                .items
                .iter()
                .map(|d| {
                    let desc = d.to_descriptor();
                    (desc.name.clone(), desc)
                })
                .collect(),
        }
    }
}

/// Directory of [`PretrainedWeightsDescriptor`]s.
#[derive(Debug, Clone, Default)]
pub struct PretrainedWeightsMap {
    /// Map of descriptors.
    pub items: BTreeMap<String, PretrainedWeightsDescriptor>,
}

impl PretrainedWeightsMap {
    /// Lookup a descriptor by name.
    pub fn lookup_by_name(
        &self,
        name: &str,
    ) -> Option<PretrainedWeightsDescriptor> {
        self.items.get(name).cloned()
    }

    /// Lookup a descriptor.
    pub fn try_lookup_by_name(
        &self,
        name: &str,
    ) -> anyhow::Result<PretrainedWeightsDescriptor> {
        match self.lookup_by_name(name) {
            Some(d) => Ok(d),
            None => bail!(
                "weights {name:?} not found; available: {:?}",
                self.items.keys().collect::<Vec<_>>()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static WEIGHTS: StaticPretrainedWeightsMap<'static> = StaticPretrainedWeightsMap {
        items: &[&StaticPretrainedWeightsDescriptor {
            name: "tv_in1k",
            description: "some description of my model.",
            license: Some("MIT"),
            origin: Some("https://github.com/my_org/my_model"),
            urls: &["https://example.com/weights/model-1234.pth"],
        }],
    };

    #[test]
    fn test_static_descriptor_to_descriptor() {
        let s_desc = WEIGHTS.items[0];
        let d_desc = s_desc.to_descriptor();

        assert_eq!(d_desc.name, "tv_in1k");
        assert_eq!(d_desc.license.as_deref(), Some("MIT"));
        assert_eq!(d_desc.urls, vec!["https://example.com/weights/model-1234.pth"]);
    }

    #[test]
    fn test_cache_key() {
        let desc = WEIGHTS.to_directory().try_lookup_by_name("tv_in1k").unwrap();
        let key = desc.cache_key().unwrap();
        assert!(key.starts_with("tv_in1k-"));
        assert!(key.ends_with("-model-1234.pth"));

        assert_eq!(
            pretrained_weights_resource_key(&key),
            vec!["weights".to_string(), key.clone()]
        );
    }

    #[test]
    fn test_lookup_missing() {
        let directory = WEIGHTS.to_directory();
        assert!(directory.lookup_by_name("nope").is_none());
        let err = directory.try_lookup_by_name("nope").unwrap_err();
        assert!(err.to_string().contains("tv_in1k"));
    }

    #[test]
    fn test_descriptor_without_urls() {
        let desc = PretrainedWeightsDescriptor {
            name: "empty".to_string(),
            description: String::new(),
            license: None,
            origin: None,
            urls: vec![],
        };
        assert!(desc.cache_key().is_err());
    }
}
