use serde::Deserialize;

/// Ambient crawler settings beyond what the CLI flags cover directly: the
/// `-p/-a/-t/-d/-y` flags feed this struct's required fields, and an
/// optional ini overlay (loaded with the same layering as the database
/// config file) supplies the rest.
///
/// `checkpoint_every`/`processed_overrun_limit` are operator overrides of
/// the literal spec.md §4.5 defaults ("every `socket_count` results" /
/// "`processed > total + 10`"): `0` means "use the spec default", a
/// non-zero value replaces it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub port: u16,
    pub bind_address: String,
    pub worker_threads: u8,
    pub environment: String,
    pub db_config_path: String,
    pub checkpoint_every: u32,
    pub processed_overrun_limit: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".into(),
            worker_threads: 15,
            environment: "development".into(),
            db_config_path: "/etc/wudi/database.ini".into(),
            checkpoint_every: 0,
            processed_overrun_limit: 10,
        }
    }
}

impl CrawlerConfig {
    /// Applies the CLI-supplied values, which always win over the overlay
    /// file and the struct defaults.
    pub fn with_cli_overrides(
        mut self,
        port: u16,
        bind_address: String,
        worker_threads: u8,
        environment: String,
        db_config_path: String,
    ) -> Self {
        self.port = port;
        self.bind_address = bind_address;
        self.worker_threads = worker_threads;
        self.environment = environment;
        self.db_config_path = db_config_path;
        self
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &CrawlerConfig) {
        if self.worker_threads == 0 {
            self.worker_threads = defaults.worker_threads;
        }
        // checkpoint_every deliberately stays 0 ("use socket_count") unless
        // the overlay file set it explicitly - it has no sensible process-wide
        // default of its own, since the spec's literal cadence is per-task.
        if self.processed_overrun_limit == 0 {
            self.processed_overrun_limit = defaults.processed_overrun_limit;
        }
    }

    /// Loads tuning knobs (`checkpoint_every`, `processed_overrun_limit`,
    /// `worker_threads`) from an optional ini file; missing file or missing
    /// keys fall back to defaults.
    pub fn from_file_or_default(file_name: &str) -> Self {
        let built = config::Config::builder()
            .add_source(config::File::new(file_name, config::FileFormat::Ini).required(false))
            .build();

        let mut cfg = match built.and_then(|b| b.try_deserialize::<CrawlerConfig>()) {
            Ok(cfg) => cfg,
            Err(_) => CrawlerConfig::default(),
        };
        cfg.apply_defaults_from(&CrawlerConfig::default());
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_every_stays_unset_by_default() {
        let mut cfg = CrawlerConfig { checkpoint_every: 0, ..CrawlerConfig::default() };
        cfg.apply_defaults_from(&CrawlerConfig::default());
        assert_eq!(cfg.checkpoint_every, 0, "0 means the task executor falls back to socket_count");
    }

    #[test]
    fn processed_overrun_limit_defaults_to_ten() {
        let mut cfg = CrawlerConfig { processed_overrun_limit: 0, ..CrawlerConfig::default() };
        cfg.apply_defaults_from(&CrawlerConfig::default());
        assert_eq!(cfg.processed_overrun_limit, 10);
    }

    #[test]
    fn cli_overrides_win() {
        let cfg = CrawlerConfig::default().with_cli_overrides(
            9090,
            "127.0.0.1".into(),
            30,
            "production".into(),
            "/tmp/db.ini".into(),
        );
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.worker_threads, 30);
        assert_eq!(cfg.environment, "production");
    }
}
