use serde::{Deserialize, Serialize};

/// Settings of the Odigos configuration document that affect env injection.
///
/// Keys use the same camelCase names as the `odigos-configuration` document so the
/// effective configuration can be deserialized directly; unknown keys are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectorConfig {
    /// Never add `JAVA_OPTS`, only `JAVA_TOOL_OPTIONS`
    #[serde(default, rename = "avoidInjectingJavaOptsEnvVar")]
    pub avoid_injecting_java_opts: bool,
}
