use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Names and package prefixes driving the checks of one verification request.
///
/// All class and package names use the internal slash-separated form.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifierConfig {
    pub root_type: String,
    pub deprecated_annotation: String,
    pub scheduled_for_removal_annotation: String,
    pub experimental_annotation: String,
    pub internal_annotations: Vec<String>,
    pub override_only_annotation: String,
    pub non_extendable_annotation: String,
    /// Marks an internal API whose usages are reported even from its own origin.
    pub cross_origin_check_annotation: String,
    /// Callers carrying this annotation may use experimental APIs without a report.
    pub experimental_opt_in_annotation: String,
    pub discouraged_jdk_packages: Vec<String>,
    /// Packages resolved as out-of-scope classes, e.g. bundled third-party libraries.
    pub external_packages: Vec<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            root_type: "java/lang/Object".to_string(),
            deprecated_annotation: "java/lang/Deprecated".to_string(),
            scheduled_for_removal_annotation: "org/jetbrains/annotations/ApiStatus$ScheduledForRemoval"
                .to_string(),
            experimental_annotation: "org/jetbrains/annotations/ApiStatus$Experimental".to_string(),
            internal_annotations: vec![
                "org/jetbrains/annotations/ApiStatus$Internal".to_string(),
                "com/intellij/openapi/util/IntellijInternalApi".to_string(),
            ],
            override_only_annotation: "org/jetbrains/annotations/ApiStatus$OverrideOnly".to_string(),
            non_extendable_annotation: "org/jetbrains/annotations/ApiStatus$NonExtendable"
                .to_string(),
            cross_origin_check_annotation: "org/jetbrains/annotations/ApiStatus$CheckedAcrossOrigins"
                .to_string(),
            experimental_opt_in_annotation: "org/jetbrains/annotations/ApiStatus$Experimental"
                .to_string(),
            discouraged_jdk_packages: [
                "javax/activation",
                "javax/annotation",
                "javax/jws",
                "javax/xml/bind",
                "javax/xml/soap",
                "javax/xml/ws",
                "org/omg",
                "sun/misc",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            external_packages: Vec::new(),
        }
    }
}

impl VerifierConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&data).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json_str(data: &str) -> Result<Self> {
        serde_json::from_str(data).context("failed to parse verifier config")
    }

    pub fn is_internal_annotation(&self, name: &str) -> bool {
        self.internal_annotations.iter().any(|internal| internal == name)
    }

    /// Whether the class lives in one of the discouraged JDK packages (or a subpackage).
    pub fn is_discouraged_jdk_class(&self, class_name: &str) -> bool {
        in_packages(&self.discouraged_jdk_packages, class_name)
    }
}

/// Whether `class_name` lives in one of `packages` or a subpackage of one.
pub(crate) fn in_packages(packages: &[String], class_name: &str) -> bool {
    packages.iter().any(|package| {
        class_name
            .strip_prefix(package.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = VerifierConfig::from_json_str(
            r#"{ "external_packages": ["org/bundled"], "internal_annotations": ["my/Internal"] }"#,
        )
        .expect("parse config");

        assert_eq!(config.root_type, "java/lang/Object");
        assert_eq!(config.external_packages, vec!["org/bundled"]);
        assert!(config.is_internal_annotation("my/Internal"));
        assert!(!config.is_internal_annotation("org/jetbrains/annotations/ApiStatus$Internal"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(VerifierConfig::from_json_str(r#"{ "rootType": "x" }"#).is_err());
    }

    #[test]
    fn discouraged_packages_match_by_segment() {
        let config = VerifierConfig::default();

        assert!(config.is_discouraged_jdk_class("javax/xml/bind/JAXBContext"));
        assert!(config.is_discouraged_jdk_class("sun/misc/Unsafe"));
        assert!(!config.is_discouraged_jdk_class("javax/xml/bindings/Other"));
        assert!(!config.is_discouraged_jdk_class("java/lang/String"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("verifier.json");
        fs::write(&path, r#"{ "root_type": "java/lang/Object" }"#).expect("write config");

        let config = VerifierConfig::from_json_file(&path).expect("load config");

        assert_eq!(config, VerifierConfig::default());
    }
}
