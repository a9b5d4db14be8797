//! Layered configuration: defaults, optional TOML file, then `REFERRAL__*`
//! environment variables.

use referral_common::{Config, Error};
use std::path::Path;

/// Environment prefix, e.g. `REFERRAL__METRICS__BATCH_SIZE=50`
const ENV_PREFIX: &str = "REFERRAL";
const ENV_SEPARATOR: &str = "__";

/// Load the configuration. A named file must exist.
pub fn load(path: Option<&Path>) -> Result<Config, Error> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
        .build()
        .and_then(|settings| settings.try_deserialize())
        .map_err(|e| Error::configuration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use referral_common::StoreBackend;
    use std::io::Write;

    fn toml_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let config = load(None).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.metrics.batch_size, 20);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let file = toml_file(
            r#"
            [store]
            backend = "redb"
            path = "/tmp/referral.redb"

            [metrics]
            batch_size = 5
            "#,
        );
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Redb);
        assert_eq!(config.store.path, Path::new("/tmp/referral.redb"));
        assert_eq!(config.metrics.batch_size, 5);
        assert_eq!(config.metrics.snapshot_ttl_secs, 3600);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = load(Some(Path::new("/nonexistent/referral.toml"))).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_bad_backend_rejected() {
        let file = toml_file("[store]\nbackend = \"postgres\"\n");
        assert!(load(Some(file.path())).is_err());
    }
}
