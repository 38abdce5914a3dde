//! Tests for figment layering: defaults, files and environment.

use figment::Jail;
use remod_config::{ConfigDiscovery, ConfigError};

#[test]
fn toml_file_overrides_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "remod.toml",
            r#"
entry = "./src/index.js"
strict = true

[bundle]
max_size = 80000

[alias]
react = "preact/compat"
"#,
        )?;

        let config = ConfigDiscovery::new(jail.directory()).load().unwrap();
        assert_eq!(config.entry, "./src/index.js");
        assert!(config.strict);
        assert_eq!(config.bundle.max_size, 80_000);
        assert_eq!(config.bundle.min_size, 50_000);
        assert_eq!(config.alias.get("react").unwrap(), "preact/compat");
        assert_eq!(
            config.source.as_deref(),
            Some(jail.directory().join("remod.toml").as_path())
        );
        Ok(())
    });
}

#[test]
fn environment_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("remod.toml", "entry = \"./a.js\"\n")?;
        jail.set_env("REMOD_ENTRY", "./b.js");
        jail.set_env("REMOD_BUNDLE__MIN_SIZE", "10");

        let config = ConfigDiscovery::new(jail.directory()).load().unwrap();
        assert_eq!(config.entry, "./b.js");
        assert_eq!(config.bundle.min_size, 10);
        Ok(())
    });
}

#[test]
fn package_json_field_is_loaded() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "package.json",
            r#"{ "name": "app", "remod": { "entry": "./lib/app.js", "external": ["react"] } }"#,
        )?;

        let config = ConfigDiscovery::new(jail.directory()).load().unwrap();
        assert_eq!(config.entry, "./lib/app.js");
        assert_eq!(config.external, vec!["react"]);
        Ok(())
    });
}

#[test]
fn defaults_apply_without_a_file() {
    Jail::expect_with(|jail| {
        let config = ConfigDiscovery::new(jail.directory())
            .load_or_default()
            .unwrap();
        assert_eq!(config.entry, ".");
        assert!(config.source.is_none());
        Ok(())
    });
}

#[test]
fn invalid_values_fail_validation() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "remod.toml",
            "[bundle]\nmin_size = 500\nmax_size = 100\n",
        )?;

        let result = ConfigDiscovery::new(jail.directory()).load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        Ok(())
    });
}
