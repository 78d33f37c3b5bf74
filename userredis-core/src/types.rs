//! Domain types for userredis.
//!
//! Names that end up in filesystem paths are newtypes with validating
//! constructors; once built they are safe to join onto a directory.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Name of the package that always exists and can never be deleted.
pub const DEFAULT_PACKAGE: &str = "default";

/// Reported in place of a memory figure when the instance cannot be queried.
pub const MEMORY_UNAVAILABLE: &str = "N/A";

/// Reported as the service state when the service manager gives no answer.
pub const STATUS_INACTIVE: &str = "inactive";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A panel account name, owner of one Redis instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Accepts ASCII letters, digits, `_`, `-` and `.`; must not start with `-` or `.`.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let valid = !raw.is_empty()
            && raw.len() <= 64
            && !raw.starts_with('-')
            && !raw.starts_with('.')
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(CoreError::InvalidUsername {
                raw: raw.to_owned(),
            });
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for Username {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Username> for String {
    fn from(u: Username) -> Self {
        u.0
    }
}

/// A sanitized package name: only `[A-Za-z0-9_-]`, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
    /// Strip every character outside `[A-Za-z0-9_-]`.
    ///
    /// `"a/b"` becomes `"ab"`; a name that strips to nothing is rejected.
    pub fn sanitize(raw: &str) -> Result<Self, CoreError> {
        let clean: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
            .collect();
        if clean.is_empty() {
            return Err(CoreError::InvalidPackageName {
                raw: raw.to_owned(),
            });
        }
        Ok(Self(clean))
    }

    /// The `default` package.
    pub fn default_package() -> Self {
        Self(DEFAULT_PACKAGE.to_owned())
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_PACKAGE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<name>.conf`
    pub fn file_name(&self) -> String {
        format!("{}.conf", self.0)
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for PackageName {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::sanitize(&s)
    }
}

impl From<PackageName> for String {
    fn from(p: PackageName) -> Self {
        p.0
    }
}

// ---------------------------------------------------------------------------
// Status readout
// ---------------------------------------------------------------------------

/// Status and memory readout for one instance, serialized as
/// `{"status": ..., "memory": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Raw service-manager state (`active`, `inactive`, `failed`, ...).
    pub status: String,
    /// `used_memory_human` from `INFO memory`, or `N/A`.
    pub memory: String,
}

impl InstanceInfo {
    /// Readout for an instance that could not be queried at all.
    pub fn unavailable() -> Self {
        Self {
            status: STATUS_INACTIVE.to_owned(),
            memory: MEMORY_UNAVAILABLE.to_owned(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a/b", "ab")]
    #[case("premium", "premium")]
    #[case("big_plan-2", "big_plan-2")]
    #[case("../../etc/passwd", "etcpasswd")]
    #[case("spa ce", "space")]
    fn sanitize_strips_disallowed_characters(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(PackageName::sanitize(raw).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("***")]
    #[case("")]
    #[case("/../.")]
    fn sanitize_rejects_names_that_strip_to_nothing(#[case] raw: &str) {
        let err = PackageName::sanitize(raw).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPackageName { .. }));
    }

    #[test]
    fn default_package_is_default() {
        assert!(PackageName::default_package().is_default());
        assert!(!PackageName::sanitize("premium").unwrap().is_default());
        assert_eq!(PackageName::default_package().file_name(), "default.conf");
    }

    #[rstest]
    #[case("alice")]
    #[case("web_1")]
    #[case("john.doe")]
    fn username_accepts_account_names(#[case] raw: &str) {
        assert_eq!(Username::parse(raw).unwrap().as_str(), raw);
    }

    #[rstest]
    #[case("")]
    #[case("../root")]
    #[case("a b")]
    #[case("-rf")]
    #[case(".hidden")]
    #[case("x;rm")]
    fn username_rejects_unsafe_names(#[case] raw: &str) {
        assert!(matches!(
            Username::parse(raw).unwrap_err(),
            CoreError::InvalidUsername { .. }
        ));
    }

    #[test]
    fn username_deserialize_validates() {
        let ok: Username = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(ok.as_str(), "alice");
        assert!(serde_json::from_str::<Username>("\"../x\"").is_err());
    }

    #[test]
    fn instance_info_serializes_to_status_and_memory() {
        let info = InstanceInfo::unavailable();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json, serde_json::json!({"status": "inactive", "memory": "N/A"}));
        assert!(!info.is_active());
    }
}
