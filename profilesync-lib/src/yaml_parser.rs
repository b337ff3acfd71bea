use crate::config::{SyncConfig, TableNames};
use crate::update::ProfileUpdate;
use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;
use tokio::fs;

/// Unquoted SQL identifier
const SQL_IDENTIFIER: &str = "^[A-Za-z_][A-Za-z0-9_]*$";

/// PostgreSQL truncates identifiers longer than this
const MAX_IDENTIFIER_LEN: usize = 63;

/// Parse a YAML configuration file and validate it
pub async fn parse_config_file<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    let content = fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

    parse_config_string(&content)
        .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))
}

/// Parse a YAML configuration string and validate it
pub fn parse_config_string(content: &str) -> Result<SyncConfig> {
    // An empty document means "all defaults"
    if content.trim().is_empty() {
        return Ok(SyncConfig::default());
    }

    let config: SyncConfig =
        serde_yaml::from_str(content).with_context(|| "Failed to parse YAML content")?;

    validate_table_names(&config.tables)?;
    if config.pool_size == 0 {
        anyhow::bail!("pool_size must be at least 1");
    }
    Ok(config)
}

/// Validate that every table name can be used as an unquoted SQL identifier
pub fn validate_table_names(tables: &TableNames) -> Result<()> {
    let identifier = Regex::new(SQL_IDENTIFIER)?;

    for (key, name) in tables.entries() {
        if !identifier.is_match(name) {
            anyhow::bail!(
                "Table name '{}' for '{}' is not a valid SQL identifier. Use only letters, digits, and underscores, and do not start with a digit.",
                name,
                key
            );
        }
        if name.len() > MAX_IDENTIFIER_LEN {
            anyhow::bail!(
                "Table name '{}' for '{}' is longer than {} characters",
                name,
                key,
                MAX_IDENTIFIER_LEN
            );
        }
    }

    let mut names: Vec<&str> = tables.entries().iter().map(|(_, name)| *name).collect();
    names.sort_unstable();
    if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
        anyhow::bail!("Table name '{}' is configured for more than one collection", pair[0]);
    }
    Ok(())
}

/// Parse a YAML profile update file
pub async fn parse_update_file<P: AsRef<Path>>(path: P) -> Result<ProfileUpdate> {
    let content = fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read update file: {}", path.as_ref().display()))?;

    parse_update_string(&content)
        .with_context(|| format!("Invalid update file: {}", path.as_ref().display()))
}

/// Parse a YAML profile update
pub fn parse_update_string(content: &str) -> Result<ProfileUpdate> {
    let update: ProfileUpdate =
        serde_yaml::from_str(content).with_context(|| "Failed to parse YAML content")?;

    if update.is_empty() {
        anyhow::bail!("Update touches neither profile fields nor any collection");
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Collection;

    #[test]
    fn test_parse_config_with_defaults() {
        let config = parse_config_string(
            r#"
database_url: postgresql://localhost/profiles
tables:
  goals: creator_goals
"#,
        )
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgresql://localhost/profiles"));
        assert_eq!(config.tables.goals, "creator_goals");
        assert_eq!(config.tables.profile, "profiles");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.pool_size, 8);
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(parse_config_string("  \n").unwrap(), SyncConfig::default());
    }

    #[test]
    fn test_invalid_table_names_are_rejected() {
        let err = parse_config_string("tables:\n  goals: \"goals; drop table x\"\n").unwrap_err();
        assert!(err.to_string().contains("not a valid SQL identifier"));

        let err = parse_config_string("tables:\n  goals: 1goals\n").unwrap_err();
        assert!(err.to_string().contains("1goals"));

        let err = parse_config_string("tables:\n  goals: social_links\n").unwrap_err();
        assert!(err.to_string().contains("more than one collection"));
    }

    #[test]
    fn test_zero_pool_size_is_rejected() {
        let err = parse_config_string("pool_size: 0\n").unwrap_err();
        assert!(err.to_string().contains("pool_size"));
        assert_eq!(parse_config_string("pool_size: 2\n").unwrap().pool_size, 2);
    }

    #[test]
    fn test_parse_update() {
        let update = parse_update_string(
            r#"
fields:
  bio: null
social_links:
  - platform: Twitter
    username: ada
    url: https://x.com/ada
"#,
        )
        .unwrap();

        assert_eq!(update.touched_collections(), vec![Collection::SocialLinks]);
        let fields = update.fields.unwrap();
        assert_eq!(fields.bio, Some(None));
    }

    #[test]
    fn test_empty_update_is_rejected() {
        assert!(parse_update_string("{}").is_err());
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let err = parse_config_file("/nonexistent/profilesync.yaml").await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
