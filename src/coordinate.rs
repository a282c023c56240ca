use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinateError {
    #[error("malformed maven coordinate {0:?}: expected group:artifact[:packaging[:classifier]]:version")]
    Arity(String),
    #[error("malformed maven coordinate {0:?}: empty segment")]
    EmptySegment(String),
    #[error("malformed maven coordinate {0:?}: whitespace is not allowed")]
    Whitespace(String),
}

/// A Maven artifact address, `group:artifact[:packaging[:classifier]]:version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub packaging: Option<String>,
    pub classifier: Option<String>,
    pub version: String,
}

impl Coordinate {
    pub fn packaging_or_jar(&self) -> &str {
        self.packaging.as_deref().unwrap_or("jar")
    }

    /// Whether a resolved classpath entry belongs to this artifact.
    pub fn matches_jar(&self, jar_path: &Path) -> bool {
        let Some(name) = jar_path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let stem = format!("{}-{}", self.artifact_id, self.version);
        name.strip_prefix(stem.as_str())
            .is_some_and(|rest| rest.starts_with('-') || rest.starts_with('.'))
    }

    pub fn sources_artifact(&self) -> String {
        format!(
            "{}:{}:{}:jar:sources",
            self.group_id, self.artifact_id, self.version
        )
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim();
        if s.chars().any(char::is_whitespace) {
            return Err(CoordinateError::Whitespace(raw.to_string()));
        }

        let parts: Vec<&str> = s.split(':').collect();
        if parts.iter().any(|p| p.is_empty()) && parts.len() >= 3 && parts.len() <= 5 {
            return Err(CoordinateError::EmptySegment(raw.to_string()));
        }

        let owned = |p: &str| p.to_string();
        match parts.as_slice() {
            [g, a, v] => Ok(Self {
                group_id: owned(g),
                artifact_id: owned(a),
                packaging: None,
                classifier: None,
                version: owned(v),
            }),
            [g, a, p, v] => Ok(Self {
                group_id: owned(g),
                artifact_id: owned(a),
                packaging: Some(owned(p)),
                classifier: None,
                version: owned(v),
            }),
            [g, a, p, c, v] => Ok(Self {
                group_id: owned(g),
                artifact_id: owned(a),
                packaging: Some(owned(p)),
                classifier: Some(owned(c)),
                version: owned(v),
            }),
            _ => Err(CoordinateError::Arity(raw.to_string())),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group_id, self.artifact_id)?;
        if let Some(p) = &self.packaging {
            write!(f, ":{p}")?;
        }
        if let Some(c) = &self.classifier {
            write!(f, ":{c}")?;
        }
        write!(f, ":{}", self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gav() {
        let c: Coordinate = "org.apache.commons:commons-lang3:3.12.0".parse().unwrap();
        assert_eq!(c.group_id, "org.apache.commons");
        assert_eq!(c.artifact_id, "commons-lang3");
        assert_eq!(c.version, "3.12.0");
        assert_eq!(c.packaging_or_jar(), "jar");
        assert_eq!(c.to_string(), "org.apache.commons:commons-lang3:3.12.0");
    }

    #[test]
    fn parses_classifier_form() {
        let c: Coordinate = "net.imglib2:imglib2:jar:tests:6.1.0".parse().unwrap();
        assert_eq!(c.packaging.as_deref(), Some("jar"));
        assert_eq!(c.classifier.as_deref(), Some("tests"));
        assert_eq!(c.sources_artifact(), "net.imglib2:imglib2:6.1.0:jar:sources");
        assert_eq!(c.to_string(), "net.imglib2:imglib2:jar:tests:6.1.0");
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(
            "org.example:demo".parse::<Coordinate>(),
            Err(CoordinateError::Arity(_))
        ));
        assert!(matches!(
            "org.example::1.0".parse::<Coordinate>(),
            Err(CoordinateError::EmptySegment(_))
        ));
        assert!(matches!(
            "org.example:de mo:1.0".parse::<Coordinate>(),
            Err(CoordinateError::Whitespace(_))
        ));
    }

    #[test]
    fn matches_jar_requires_artifact_and_version() {
        let c: Coordinate = "org.example:demo:1.0".parse().unwrap();
        assert!(c.matches_jar(Path::new("/m2/org/example/demo/1.0/demo-1.0.jar")));
        assert!(c.matches_jar(Path::new("/m2/org/example/demo/1.0/demo-1.0-tests.jar")));
        assert!(!c.matches_jar(Path::new("/m2/org/example/demo-extras/1.0/demo-extras-1.0.jar")));
        assert!(!c.matches_jar(Path::new("/m2/org/example/demo/1.01/demo-1.01.jar")));
        assert!(!c.matches_jar(Path::new("/m2/org/other/other-1.0.jar")));
    }
}
