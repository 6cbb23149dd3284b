// src/sources.rs

use serde::Deserialize;
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};
use url::Url;

use crate::error::PipelineError;

/// The three CSSE global time series, in merge order.
static CSSE_SOURCES: &[(&str, &str)] = &[
    (
        "confirmed",
        "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series/time_series_covid19_confirmed_global.csv",
    ),
    (
        "deaths",
        "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series/time_series_covid19_deaths_global.csv",
    ),
    (
        "recovered",
        "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series/time_series_covid19_recovered_global.csv",
    ),
];

/// Where a source table lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Locator {
    /// `http`/`https` resource.
    Remote(Url),
    /// Local CSV, given as a `file://` URL or a plain path.
    File(PathBuf),
}

impl Locator {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Locator::File(path.as_ref().to_path_buf())
    }
}

impl FromStr for Locator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty locator".to_string());
        }
        match Url::parse(s) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(Locator::Remote(url)),
                "file" => url
                    .to_file_path()
                    .map(Locator::File)
                    .map_err(|_| format!("`{}` is not a usable file URL", s)),
                other => Err(format!("unsupported scheme `{}` in `{}`", other, s)),
            },
            // relative paths and bare file names
            Err(_) => Ok(Locator::File(PathBuf::from(s))),
        }
    }
}

impl TryFrom<String> for Locator {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Remote(url) => write!(f, "{}", url),
            Locator::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One labelled source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Source {
    pub label: String,
    pub locator: Locator,
}

/// Ordered label → locator mapping. Insertion order is merge order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn empty() -> Self {
        SourceRegistry {
            sources: Vec::new(),
        }
    }

    /// Build from an ordered list, rejecting duplicate labels.
    pub fn from_sources(sources: impl IntoIterator<Item = Source>) -> Result<Self, PipelineError> {
        let mut registry = Self::empty();
        for source in sources {
            registry.insert(source.label, source.locator)?;
        }
        Ok(registry)
    }

    pub fn insert(
        &mut self,
        label: impl Into<String>,
        locator: Locator,
    ) -> Result<(), PipelineError> {
        let label = label.into();
        let folded = label.to_lowercase();
        if self.sources.iter().any(|s| s.label.to_lowercase() == folded) {
            return Err(PipelineError::LabelCollision(label));
        }
        self.sources.push(Source { label, locator });
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Locator> {
        self.sources
            .iter()
            .find(|s| s.label == label)
            .map(|s| &s.locator)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.label.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        SourceRegistry {
            sources: CSSE_SOURCES
                .iter()
                .map(|&(label, url)| Source {
                    label: label.to_string(),
                    locator: url.parse().expect("built-in CSSE URLs are valid"),
                })
                .collect(),
        }
    }
}
