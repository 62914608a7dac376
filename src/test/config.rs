#[cfg(test)]
mod tests {
    use crate::config::{AppConfig, ConfigError};
    use crate::mediator::{ReadPolicy, ResourceType};
    use serial_test::serial;
    use std::path::PathBuf;

    const BASE: [(&str, Option<&str>); 7] = [
        ("DATABASE_URL", Some("sqlite::memory:")),
        ("STORAGE_PUBLIC_URL", Some("/storage")),
        ("STORAGE_ROOT", None),
        ("SESSION_HOURS", None),
        ("PURGE_EXPIRED_NOTES", None),
        ("READ_POLICY_CONTENT", None),
        ("READ_POLICY_NOTES", None),
    ];

    fn with_overrides(overrides: &[(&'static str, Option<&'static str>)]) -> Vec<(&'static str, Option<&'static str>)> {
        let mut vars: Vec<_> = BASE
            .iter()
            .filter(|(key, _)| !overrides.iter().any(|(name, _)| name == key))
            .copied()
            .collect();
        vars.extend_from_slice(overrides);
        vars
    }

    #[test]
    #[serial]
    fn defaults_apply_when_optional_keys_are_absent() {
        temp_env::with_vars(with_overrides(&[]), || {
            let config = AppConfig::from_env().expect("Config should load");

            assert_eq!(config.database_url, "sqlite::memory:");
            assert_eq!(config.storage_root, PathBuf::from("storage"));
            assert_eq!(config.session_hours, 24);
            assert!(!config.purge_expired_notes);
            assert_eq!(config.policy(ResourceType::Content), ReadPolicy::Premium);
            assert_eq!(config.policy(ResourceType::Notes), ReadPolicy::Public);
        });
    }

    #[test]
    #[serial]
    fn overrides_are_parsed() {
        let overrides = [
            ("STORAGE_ROOT", Some("/srv/files")),
            ("SESSION_HOURS", Some("72")),
            ("PURGE_EXPIRED_NOTES", Some("yes")),
            ("READ_POLICY_CONTENT", Some("Authenticated")),
            ("READ_POLICY_NOTES", Some("owner")),
        ];

        temp_env::with_vars(with_overrides(&overrides), || {
            let config = AppConfig::from_env().expect("Config should load");

            assert_eq!(config.storage_root, PathBuf::from("/srv/files"));
            assert_eq!(config.session_hours, 72);
            assert!(config.purge_expired_notes);
            assert_eq!(config.policy(ResourceType::Content), ReadPolicy::Authenticated);
            assert_eq!(config.policy(ResourceType::Notes), ReadPolicy::Owner);
        });
    }

    #[test]
    #[serial]
    fn missing_database_url_is_fatal() {
        temp_env::with_vars(with_overrides(&[("DATABASE_URL", None)]), || {
            assert_eq!(AppConfig::from_env(), Err(ConfigError::Missing("DATABASE_URL")));
        });
    }

    #[test]
    #[serial]
    fn invalid_values_name_their_key() {
        temp_env::with_vars(with_overrides(&[("SESSION_HOURS", Some("-3"))]), || {
            assert_eq!(
                AppConfig::from_env(),
                Err(ConfigError::Invalid {
                    key: "SESSION_HOURS",
                    value: "-3".to_string(),
                })
            );
        });

        temp_env::with_vars(with_overrides(&[("READ_POLICY_NOTES", Some("everyone"))]), || {
            assert!(matches!(
                AppConfig::from_env(),
                Err(ConfigError::Invalid { key: "READ_POLICY_NOTES", .. })
            ));
        });
    }
}
