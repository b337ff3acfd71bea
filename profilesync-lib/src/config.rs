use serde::{Deserialize, Serialize};

use crate::model::Collection;

fn default_profile_table() -> String {
    "profiles".to_string()
}

fn default_wallet_methods_table() -> String {
    "wallet_methods".to_string()
}

fn default_social_links_table() -> String {
    "social_links".to_string()
}

fn default_goals_table() -> String {
    "goals".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_pool_size() -> u32 {
    8
}

/// Table names the PostgreSQL gateway reads and writes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableNames {
    /// Scalar profile fields, one row per owner keyed by `id`
    #[serde(default = "default_profile_table")]
    pub profile: String,
    #[serde(default = "default_wallet_methods_table")]
    pub wallet_methods: String,
    #[serde(default = "default_social_links_table")]
    pub social_links: String,
    #[serde(default = "default_goals_table")]
    pub goals: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            profile: default_profile_table(),
            wallet_methods: default_wallet_methods_table(),
            social_links: default_social_links_table(),
            goals: default_goals_table(),
        }
    }
}

impl TableNames {
    pub fn collection(&self, collection: Collection) -> &str {
        match collection {
            Collection::WalletMethods => &self.wallet_methods,
            Collection::SocialLinks => &self.social_links,
            Collection::Goals => &self.goals,
        }
    }

    /// Every configured table with the config key it came from
    pub fn entries(&self) -> [(&'static str, &str); 4] {
        [
            ("profile", &self.profile),
            ("wallet_methods", &self.wallet_methods),
            ("social_links", &self.social_links),
            ("goals", &self.goals),
        ]
    }
}

/// Root structure of the YAML configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// PostgreSQL connection string. `DATABASE_URL` and the CLI flag take
    /// precedence over this value.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub tables: TableNames,
    /// Default tracing filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Maximum number of pooled database connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            tables: TableNames::default(),
            log_level: default_log_level(),
            pool_size: default_pool_size(),
        }
    }
}

impl SyncConfig {
    /// Pick the connection string: explicit value first, then the
    /// environment, then the file
    pub fn resolve_database_url(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::to_string)
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .or_else(|| self.database_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup() {
        let tables = TableNames {
            goals: "creator_goals".to_string(),
            ..Default::default()
        };
        assert_eq!(tables.collection(Collection::Goals), "creator_goals");
        assert_eq!(tables.profile, "profiles");
        assert_eq!(tables.entries()[2], ("social_links", "social_links"));
    }

    #[test]
    fn test_explicit_database_url_wins() {
        let config = SyncConfig {
            database_url: Some("postgresql://file/db".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_database_url(Some("postgresql://flag/db")).as_deref(),
            Some("postgresql://flag/db")
        );
    }
}
