//! String-level composition of managed values with user values.
//!
//! Managed variables are shell-argument strings (`JAVA_TOOL_OPTIONS`, `NODE_OPTIONS`)
//! or path lists (`PYTHONPATH`), so everything here works on opaque strings split
//! by the rule's delimiter. Callers never concatenate values themselves.
//!
//! A miss in the registry (unmanaged variable, or no value for the SDK) is never an
//! error: the functions return `None`, `false` or the input unchanged.

use crate::registry::{EnvVarRule, Registry};
use crate::sdk::{OtelSdk, ProgrammingLanguage};

/// Every managed value lives under this directory. A value containing it was
/// written (at least partly) by Odigos.
pub const ODIGOS_MARKER: &str = "/var/odigos/";

pub fn contains_odigos_marker(value: &str) -> bool {
    value.contains(ODIGOS_MARKER)
}

/// Splits on the delimiter, drops empty fragments and collapses consecutive
/// duplicates. A whitespace delimiter splits on any whitespace run.
///
/// Fragments are plain tokens: quoting is not understood, so a quoted argument
/// such as `-Dname="a  b"` comes back as `-Dname="a b"`.
fn normalize(delimiter: &str, value: &str) -> String {
    let mut fragments: Vec<&str> = if delimiter.trim().is_empty() {
        value.split_whitespace().collect()
    } else {
        value
            .split(delimiter)
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect()
    };
    fragments.dedup();
    fragments.join(delimiter)
}

fn remove_value(rule: &EnvVarRule, value: &str, managed: &str) -> String {
    value.replace(managed, &rule.delimiter)
}

/// The user-owned part of `value`: every managed value configured for the rule
/// (whatever the SDK) removed, then normalized. The result is re-tokenized, not
/// the user's bytes.
fn user_remainder(rule: &EnvVarRule, value: &str) -> String {
    let stripped = rule
        .managed_values()
        .into_iter()
        .filter(|managed| !managed.is_empty())
        .fold(value.to_owned(), |acc, managed| remove_value(rule, &acc, managed));
    normalize(&rule.delimiter, &stripped)
}

impl Registry {
    /// The value the variable should have for `sdk`, or `None` when no patch is
    /// needed.
    ///
    /// `None` is returned for unmanaged variables, for SDKs without a managed value,
    /// when nothing user-owned remains once managed values are removed, and when
    /// `observed` is already the patched value.
    ///
    /// The user part of the result is normalized: whitespace runs collapse even
    /// inside quotes.
    pub fn get_patched_env_value(
        &self,
        env_name: &str,
        observed: &str,
        sdk: &OtelSdk,
    ) -> Option<String> {
        let rule = self.lookup(env_name)?;
        let managed = rule.value_for(sdk)?;

        let remainder = user_remainder(rule, observed);
        if remainder.is_empty() {
            return None;
        }

        let patched = format!("{remainder}{}{managed}", rule.delimiter);
        (patched != observed).then_some(patched)
    }

    /// Like [`Registry::get_patched_env_value`], but only for variables relevant to
    /// the detected language. Containers without an SDK (unknown language, ignored
    /// container) are never patched.
    pub fn get_patched_env_value_for_language(
        &self,
        env_name: &str,
        observed: &str,
        sdk: Option<&OtelSdk>,
        language: ProgrammingLanguage,
    ) -> Option<String> {
        let sdk = sdk?;
        if !self
            .env_vars_for_language(language)
            .iter()
            .any(|name| name == env_name)
        {
            return None;
        }
        self.get_patched_env_value(env_name, observed, sdk)
    }

    pub fn should_patch(&self, env_name: &str, value: &str, sdk: &OtelSdk) -> bool {
        self.value_for(env_name, sdk)
            .is_some_and(|managed| value != managed)
    }

    /// Appends the managed value unless it is already there. Only safe for values
    /// that were never patched for a different SDK.
    pub fn patch(&self, env_name: &str, value: &str, sdk: &OtelSdk) -> String {
        let Some(rule) = self.lookup(env_name) else {
            return value.to_owned();
        };
        let Some(managed) = rule.value_for(sdk) else {
            return value.to_owned();
        };

        if value.is_empty() {
            managed.to_owned()
        } else if value.contains(managed) {
            value.to_owned()
        } else {
            format!("{value}{}{managed}", rule.delimiter)
        }
    }

    pub fn should_revert(&self, env_name: &str, value: &str, sdk: &OtelSdk) -> bool {
        self.value_for(env_name, sdk)
            .is_some_and(|managed| value.contains(managed))
    }

    /// Removes the managed value of `sdk` from `value`.
    ///
    /// Returns `None` when nothing is left, meaning the variable should be dropped
    /// from the manifest altogether.
    pub fn revert(&self, env_name: &str, value: &str, sdk: &OtelSdk) -> Option<String> {
        let Some(rule) = self.lookup(env_name) else {
            return Some(value.to_owned());
        };
        let Some(managed) = rule.value_for(sdk) else {
            return Some(value.to_owned());
        };
        if managed.is_empty() || !value.contains(managed) {
            return Some(value.to_owned());
        }

        let reverted = normalize(&rule.delimiter, &remove_value(rule, value, managed));
        (!reverted.is_empty()).then_some(reverted)
    }

    /// `value` without any managed value of any SDK. Unmanaged variables are
    /// returned unchanged.
    pub fn strip_odigos_values(&self, env_name: &str, value: &str) -> String {
        match self.lookup(env_name) {
            Some(rule) => user_remainder(rule, value),
            None => value.to_owned(),
        }
    }

    /// Composes `observed` with an explicit managed value.
    ///
    /// Used where a value is injected rather than diffed: a value already holding
    /// `managed` is kept as is, other SDK variants are replaced, and an empty user
    /// part yields `managed` alone. `None` for unmanaged variables.
    pub fn append_odigos_additions(
        &self,
        env_name: &str,
        observed: &str,
        managed: &str,
    ) -> Option<String> {
        let rule = self.lookup(env_name)?;
        if !managed.is_empty() && observed.contains(managed) {
            return Some(observed.to_owned());
        }

        let remainder = user_remainder(rule, observed);
        if remainder.is_empty() {
            return Some(managed.to_owned());
        }
        Some(format!("{remainder}{}{managed}", rule.delimiter))
    }
}
