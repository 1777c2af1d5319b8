//! Known cloud providers

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a cloud provider.
///
/// The set of clouds is closed; what each of them caches (its namespaces) is
/// configured at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Aws,
    Google,
    Azure,
    Kubernetes,
    Titus,
    CloudFoundry,
    Oracle,
    Yandex,
    Alicloud,
    TencentCloud,
    CloudRun,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 11] = [
        ProviderKind::Aws,
        ProviderKind::Google,
        ProviderKind::Azure,
        ProviderKind::Kubernetes,
        ProviderKind::Titus,
        ProviderKind::CloudFoundry,
        ProviderKind::Oracle,
        ProviderKind::Yandex,
        ProviderKind::Alicloud,
        ProviderKind::TencentCloud,
        ProviderKind::CloudRun,
    ];

    /// Provider name, also used as the cache key prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Aws => "aws",
            ProviderKind::Google => "google",
            ProviderKind::Azure => "azure",
            ProviderKind::Kubernetes => "kubernetes",
            ProviderKind::Titus => "titus",
            ProviderKind::CloudFoundry => "cloudfoundry",
            ProviderKind::Oracle => "oracle",
            ProviderKind::Yandex => "yandex",
            ProviderKind::Alicloud => "alicloud",
            ProviderKind::TencentCloud => "tencentcloud",
            ProviderKind::CloudRun => "cloudrun",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| CacheError::Config(format!("Unknown provider: {}", s)))
    }
}
