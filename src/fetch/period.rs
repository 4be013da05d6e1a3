// src/fetch/period.rs

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};
use url::Url;

use crate::config::FetchConfig;
use crate::error::ConfigError;

/// Placeholder substituted with the period code in file templates.
pub const PERIOD_PLACEHOLDER: &str = "{period}";

static PERIOD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("period regex"));

/// A calendar month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, ConfigError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|_| Self { year, month })
            .ok_or_else(|| ConfigError::Period(format!("{year:04}-{month:02}")))
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Every month from `from` to `to`, both inclusive, in calendar order.
    pub fn range(from: Period, to: Period) -> Result<Vec<Period>, ConfigError> {
        if from > to {
            return Err(ConfigError::EmptyRange {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let mut out = Vec::new();
        let mut cur = from;
        while cur <= to {
            out.push(cur);
            cur = cur.succ();
        }
        Ok(out)
    }
}

impl FromStr for Period {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = PERIOD_RE
            .captures(s.trim())
            .ok_or_else(|| ConfigError::Period(s.to_string()))?;
        let year = caps[1]
            .parse()
            .map_err(|_| ConfigError::Period(s.to_string()))?;
        let month = caps[2]
            .parse()
            .map_err(|_| ConfigError::Period(s.to_string()))?;
        Period::new(year, month).map_err(|_| ConfigError::Period(s.to_string()))
    }
}

impl TryFrom<String> for Period {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.to_string()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One remote file and where its cached copy lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub period: Period,
    pub url: Url,
    pub cache_path: PathBuf,
}

impl SourceDescriptor {
    pub fn file_name(&self) -> String {
        self.cache_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// A template must name one file directly inside the cache directory.
pub fn check_template(template: &str) -> Result<(), ConfigError> {
    let reason = if !template.contains(PERIOD_PLACEHOLDER) {
        "must contain `{period}`"
    } else if template.contains(['/', '\\']) {
        "must not contain path separators"
    } else if template.contains("..") {
        "must not contain `..`"
    } else {
        return Ok(());
    };
    Err(ConfigError::Template {
        template: template.to_string(),
        reason,
    })
}

/// Expand the file template over the configured period range.
pub fn describe_sources(cfg: &FetchConfig) -> Result<Vec<SourceDescriptor>, ConfigError> {
    check_template(&cfg.file_template)?;

    // `Url::join` replaces the last segment unless the base ends in '/'
    let mut base = cfg.base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    Period::range(cfg.from, cfg.to)?
        .into_iter()
        .map(|period| {
            let name = cfg
                .file_template
                .replace(PERIOD_PLACEHOLDER, &period.to_string());
            let url = base.join(&name).map_err(|source| ConfigError::BaseUrl {
                url: base.to_string(),
                source,
            })?;
            Ok(SourceDescriptor {
                period,
                url,
                cache_path: cfg.cache_dir.join(&name),
            })
        })
        .collect()
}
