//! Composite identifier of an Evidently feature: `featureName/projectNameOrARN`

use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unexpected format for feature ID ({id}), expected featureName/projectNameOrARN")]
pub struct FeatureIdError {
    pub id: String,
}

/// Feature name plus the project it belongs to
///
/// The project part is kept as given (name or ARN). Feature names never
/// contain a `/`, so the ID splits on the first one and a project ARN
/// survives intact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureId {
    pub feature: String,
    pub project: String,
}

impl FeatureId {
    pub fn new(feature: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            project: project.into(),
        }
    }

    pub fn parse(id: &str) -> Result<Self, FeatureIdError> {
        match id.split_once(SEPARATOR) {
            Some((feature, project)) if !feature.is_empty() && !project.is_empty() => {
                Ok(Self::new(feature, project))
            }
            _ => Err(FeatureIdError { id: id.to_string() }),
        }
    }
}

impl FromStr for FeatureId {
    type Err = FeatureIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.feature, SEPARATOR, self.project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format_round_trip() {
        for id in [
            "my-feature/my-project",
            "my-feature/arn:aws:evidently:us-east-1:123456789012:project/my-project",
        ] {
            let parsed = FeatureId::parse(id).unwrap();
            assert_eq!(parsed.feature, "my-feature");
            assert_eq!(parsed.to_string(), id);
        }
    }

    #[test]
    fn project_arn_keeps_its_slashes() {
        let parsed: FeatureId = "f/arn:aws:evidently:us-east-1:123456789012:project/p"
            .parse()
            .unwrap();
        assert_eq!(
            parsed.project,
            "arn:aws:evidently:us-east-1:123456789012:project/p"
        );
    }

    #[test]
    fn malformed_ids_are_rejected() {
        for id in ["", "feature", "/project", "feature/"] {
            let err = FeatureId::parse(id).unwrap_err();
            assert_eq!(err.id, id);
            assert!(err.to_string().contains("featureName/projectNameOrARN"));
        }
    }
}
