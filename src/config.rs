//! Options for both translation directions.

/// Migrations shipped with a fresh Laravel application.
pub const DEFAULT_MIGRATIONS: &[&str] = &[
    "2014_10_12_000000_create_users_table.php",
    "2014_10_12_100000_create_password_reset_tokens_table.php",
    "2019_08_19_000000_create_failed_jobs_table.php",
    "2019_12_14_000001_create_personal_access_tokens_table.php",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Keep several primary fields as a composite key instead of adding `id`.
    pub composite_keys: bool,
    /// Add `$table->timestamps()` to every created table.
    pub timestamps: bool,
    /// Prefix of generated migration file names, usually a timestamp.
    pub migration_prefix: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            composite_keys: false,
            timestamps: true,
            migration_prefix: "0000_00_00_000000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    pub skip_default_migrations: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            skip_default_migrations: true,
        }
    }
}

impl ImportConfig {
    pub fn skips(&self, file_name: &str) -> bool {
        self.skip_default_migrations && DEFAULT_MIGRATIONS.contains(&file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_migrations_skipped() {
        let config = ImportConfig::default();
        assert!(config.skips("2014_10_12_000000_create_users_table.php"));
        assert!(!config.skips("2024_01_01_000000_create_posts_table.php"));

        let keep = ImportConfig {
            skip_default_migrations: false,
        };
        assert!(!keep.skips("2014_10_12_000000_create_users_table.php"));
    }
}
