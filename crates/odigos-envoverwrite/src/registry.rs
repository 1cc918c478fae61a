//! The table of Odigos-managed environment variables.
//!
//! A [`Registry`] is built once at process start and never mutated afterwards.
//! Reloading (for example after a tier change) goes through [`SharedRegistry`],
//! which swaps in a freshly built table.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::sdk::{OdigosTier, OtelSdk, ProgrammingLanguage};

const NODE_OPTIONS: &str = "NODE_OPTIONS";
const PYTHONPATH: &str = "PYTHONPATH";
const JAVA_OPTS: &str = "JAVA_OPTS";
const JAVA_TOOL_OPTIONS: &str = "JAVA_TOOL_OPTIONS";

const NODE_NATIVE_COMMUNITY: &str = "--require /var/odigos/nodejs/autoinstrumentation.js";
const NODE_EBPF_ENTERPRISE: &str = "--require /var/odigos/nodejs-ebpf/autoinstrumentation.js";
const PYTHON_NATIVE_COMMUNITY: &str =
    "/var/odigos/python:/var/odigos/python/opentelemetry/instrumentation/auto_instrumentation";
const PYTHON_EBPF_ENTERPRISE: &str = "/var/odigos/python-ebpf:/var/odigos/python/opentelemetry/instrumentation/auto_instrumentation:/var/odigos/python";
const JAVA_NATIVE_COMMUNITY: &str = "-javaagent:/var/odigos/java/javaagent.jar";
const JAVA_EBPF_ENTERPRISE: &str = "-javaagent:/var/odigos/java-ebpf/dtrace-injector.jar";

/// How one environment variable is managed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvVarRule {
    pub name: String,
    pub delimiter: String,
    pub values_by_sdk: BTreeMap<OtelSdk, String>,
}

impl EnvVarRule {
    pub fn value_for(&self, sdk: &OtelSdk) -> Option<&str> {
        self.values_by_sdk.get(sdk).map(String::as_str)
    }

    /// Managed values of every configured SDK, longest first so that a value which
    /// happens to contain another one is removed as a whole.
    pub(crate) fn managed_values(&self) -> Vec<&str> {
        let mut values: Vec<&str> = self.values_by_sdk.values().map(String::as_str).collect();
        values.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        values.dedup();
        values
    }
}

#[derive(Clone, Debug, Default)]
pub struct Registry {
    rules: HashMap<String, EnvVarRule>,
    languages: HashMap<ProgrammingLanguage, Vec<String>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Every managed variable with every SDK variant Odigos ships.
    pub fn builtin() -> Self {
        Self::builder()
            .rule(NODE_OPTIONS, " ")
            .value(NODE_OPTIONS, OtelSdk::NATIVE_COMMUNITY, NODE_NATIVE_COMMUNITY)
            .value(NODE_OPTIONS, OtelSdk::EBPF_ENTERPRISE, NODE_EBPF_ENTERPRISE)
            .rule(PYTHONPATH, ":")
            .value(PYTHONPATH, OtelSdk::NATIVE_COMMUNITY, PYTHON_NATIVE_COMMUNITY)
            .value(PYTHONPATH, OtelSdk::EBPF_ENTERPRISE, PYTHON_EBPF_ENTERPRISE)
            .rule(JAVA_TOOL_OPTIONS, " ")
            .value(JAVA_TOOL_OPTIONS, OtelSdk::NATIVE_COMMUNITY, JAVA_NATIVE_COMMUNITY)
            .value(JAVA_TOOL_OPTIONS, OtelSdk::EBPF_ENTERPRISE, JAVA_EBPF_ENTERPRISE)
            .rule(JAVA_OPTS, " ")
            .value(JAVA_OPTS, OtelSdk::NATIVE_COMMUNITY, JAVA_NATIVE_COMMUNITY)
            .value(JAVA_OPTS, OtelSdk::EBPF_ENTERPRISE, JAVA_EBPF_ENTERPRISE)
            .language(ProgrammingLanguage::Java, [JAVA_OPTS, JAVA_TOOL_OPTIONS])
            .language(ProgrammingLanguage::Python, [PYTHONPATH])
            .language(ProgrammingLanguage::Javascript, [NODE_OPTIONS])
            .build()
    }

    /// The builtin table restricted to the SDK variants the tier may use.
    pub fn for_tier(tier: OdigosTier) -> Self {
        let mut registry = Self::builtin();
        for rule in registry.rules.values_mut() {
            rule.values_by_sdk.retain(|sdk, _| tier.allows(sdk.sdk_tier));
        }
        registry
    }

    pub fn lookup(&self, env_name: &str) -> Option<&EnvVarRule> {
        self.rules.get(env_name)
    }

    /// The managed value Odigos appends to `env_name` for `sdk`.
    pub fn value_for(&self, env_name: &str, sdk: &OtelSdk) -> Option<&str> {
        self.lookup(env_name)?.value_for(sdk)
    }

    /// Names relevant to the language, in injection order. Empty when the language
    /// has no managed variables.
    pub fn env_vars_for_language(&self, language: ProgrammingLanguage) -> &[String] {
        self.languages
            .get(&language)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    rules: HashMap<String, EnvVarRule>,
    languages: HashMap<ProgrammingLanguage, Vec<String>>,
}

impl RegistryBuilder {
    /// Declares a managed variable. Declaring it again replaces its delimiter only.
    pub fn rule(mut self, name: impl Into<String>, delimiter: impl Into<String>) -> Self {
        let name = name.into();
        let delimiter = delimiter.into();
        self.rules
            .entry(name.clone())
            .and_modify(|rule| rule.delimiter = delimiter.clone())
            .or_insert_with(|| EnvVarRule {
                name,
                delimiter,
                values_by_sdk: BTreeMap::new(),
            });
        self
    }

    /// Sets the managed value of an already declared variable.
    pub fn value(mut self, name: &str, sdk: OtelSdk, value: impl Into<String>) -> Self {
        match self.rules.get_mut(name) {
            Some(rule) => {
                rule.values_by_sdk.insert(sdk, value.into());
            }
            None => log::warn!("ignoring value for undeclared env var {name}"),
        }
        self
    }

    pub fn language<I, S>(mut self, language: ProgrammingLanguage, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages
            .insert(language, names.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            rules: self.rules,
            languages: self.languages,
        }
    }
}

/// Holder for the current registry.
///
/// Readers take a cheap [`Arc`] snapshot; a reload installs a new table and never
/// touches the one readers may still hold.
#[derive(Debug)]
pub struct SharedRegistry {
    current: RwLock<Arc<Registry>>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    pub fn load(&self) -> Arc<Registry> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn install(&self, registry: Registry) {
        let registry = Arc::new(registry);
        match self.current.write() {
            Ok(mut guard) => *guard = registry,
            Err(poisoned) => *poisoned.into_inner() = registry,
        }
    }
}
