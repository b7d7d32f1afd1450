//! Team config loading and hashing.

use std::path::Path;

use sha2::{Digest, Sha256};

use super::{Team, TeamConfig, TeamError};

/// Loads a team from a YAML file.
pub fn load_team(path: impl AsRef<Path>) -> Result<Team, TeamError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| TeamError::Io {
        path: path.display().to_string(),
        source,
    })?;
    team_from_yaml(&text)
}

/// Parses a team from YAML text.
pub fn team_from_yaml(yaml: &str) -> Result<Team, TeamError> {
    let config: TeamConfig = serde_yaml::from_str(yaml)?;
    Team::new(config)
}

/// Hex SHA-256 of the canonical (re-serialized) config. Formatting and
/// comment changes in the source file do not affect the hash; semantic
/// changes do.
pub fn config_hash(config: &TeamConfig) -> Result<String, TeamError> {
    let canonical = serde_yaml::to_string(config)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: loading from a file and from its text produce the same
    /// team and hash.
    #[test]
    fn file_and_text_loads_agree() {
        let yaml = r#"
name: demo
agents:
  - name: a
    prompt_template: "p"
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.yaml");
        std::fs::write(&path, yaml).unwrap();
        let from_file = load_team(&path).unwrap();
        let from_text = team_from_yaml(yaml).unwrap();
        assert_eq!(from_file.config_hash, from_text.config_hash);
        assert_eq!(from_file.config.name, "demo");
    }

    /// **Scenario**: a missing file is an Io error naming the path.
    #[test]
    fn missing_file_is_io_error() {
        let err = load_team("/nonexistent/team.yaml").unwrap_err();
        assert!(matches!(err, TeamError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/team.yaml"));
    }

    /// **Scenario**: comment-only changes to the YAML do not change the hash.
    #[test]
    fn hash_ignores_comments() {
        let a = team_from_yaml("name: demo\nagents:\n  - name: a\n    prompt_template: p\n").unwrap();
        let b = team_from_yaml(
            "# a comment\nname: demo\nagents:\n  - name: a\n    prompt_template: p\n",
        )
        .unwrap();
        assert_eq!(a.config_hash, b.config_hash);
    }
}
