use std::collections::HashMap;

/// Credentials and DSN for one named environment section of a database
/// config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub username: String,
    pub password: String,
    pub db_dns: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseConfigError {
    #[error("failed to read database config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("no section named '{0}' in database config file")]
    MissingSection(String),
}

/// Parses the `#~<config-name>` sectioned key:value format used for the
/// database config file: a `#~name` header line starts a new section, and
/// `key:value` lines that follow belong to it until the next header.
fn parse_sections(contents: &str) -> HashMap<String, DatabaseConfig> {
    let mut sections = HashMap::new();
    let mut current: Option<(String, DatabaseConfig)> = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix("#~") {
            if let Some((name, cfg)) = current.take() {
                sections.insert(name, cfg);
            }
            current = Some((name.trim().to_string(), DatabaseConfig::default()));
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Some((_, cfg)) = current.as_mut() else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "username" => cfg.username = value,
            "password" => cfg.password = value,
            "db_dns" => cfg.db_dns = value,
            _ => {}
        }
    }
    if let Some((name, cfg)) = current.take() {
        sections.insert(name, cfg);
    }
    sections
}

/// Reads `path` and returns the section matching `config_name` (typically
/// `development` or `production`).
pub fn parse_database_file(
    path: &str,
    config_name: &str,
) -> Result<DatabaseConfig, DatabaseConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let mut sections = parse_sections(&contents);
    sections
        .remove(config_name)
        .ok_or_else(|| DatabaseConfigError::MissingSection(config_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
#~development
username:dev_user
password:dev_pass
db_dns:dev_db

#~production
username:prod_user
password:prod_pass
db_dns:prod_db
";

    #[test]
    fn parses_named_sections() {
        let sections = parse_sections(SAMPLE);
        assert_eq!(
            sections.get("development").unwrap().username,
            "dev_user"
        );
        assert_eq!(sections.get("production").unwrap().db_dns, "prod_db");
    }

    #[test]
    fn missing_section_is_an_error() {
        let sections = parse_sections(SAMPLE);
        assert!(!sections.contains_key("staging"));
    }
}
