use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdkType {
    Native,
    Ebpf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdkTier {
    Community,
    Enterprise,
}

/// Identifies which instrumentation implementation applies to a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtelSdk {
    pub sdk_type: SdkType,
    pub sdk_tier: SdkTier,
}

impl OtelSdk {
    pub const NATIVE_COMMUNITY: OtelSdk = OtelSdk::new(SdkType::Native, SdkTier::Community);
    pub const NATIVE_ENTERPRISE: OtelSdk = OtelSdk::new(SdkType::Native, SdkTier::Enterprise);
    pub const EBPF_COMMUNITY: OtelSdk = OtelSdk::new(SdkType::Ebpf, SdkTier::Community);
    pub const EBPF_ENTERPRISE: OtelSdk = OtelSdk::new(SdkType::Ebpf, SdkTier::Enterprise);

    pub const fn new(sdk_type: SdkType, sdk_tier: SdkTier) -> Self {
        Self { sdk_type, sdk_tier }
    }
}

impl fmt::Display for OtelSdk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sdk_type = match self.sdk_type {
            SdkType::Native => "native",
            SdkType::Ebpf => "ebpf",
        };
        let sdk_tier = match self.sdk_tier {
            SdkTier::Community => "community",
            SdkTier::Enterprise => "enterprise",
        };
        write!(f, "{sdk_type}-{sdk_tier}")
    }
}

/// The Odigos installation tier, chosen by the SDK-selection policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OdigosTier {
    #[default]
    Community,
    Cloud,
    Onprem,
}

impl OdigosTier {
    /// Whether SDK variants of the given tier may be used by this installation.
    pub fn allows(&self, sdk_tier: SdkTier) -> bool {
        match self {
            OdigosTier::Community => sdk_tier == SdkTier::Community,
            OdigosTier::Cloud | OdigosTier::Onprem => true,
        }
    }
}

impl FromStr for OdigosTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "community" => Ok(OdigosTier::Community),
            "cloud" => Ok(OdigosTier::Cloud),
            "onprem" => Ok(OdigosTier::Onprem),
            other => Err(format!("unknown odigos tier {other:?}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgrammingLanguage {
    Java,
    Dotnet,
    Go,
    Python,
    Javascript,
    Php,
    Ruby,
    Rust,
    Cplusplus,
    Nginx,
    Ignored,
    #[default]
    #[serde(other)]
    Unknown,
}
