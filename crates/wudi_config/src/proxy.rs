use serde::Deserialize;
use std::fmt;

/// Wire protocol spoken to the proxy once a TCP connection is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum ProxyProtocol {
    Socks5,
    Http,
}

impl TryFrom<u8> for ProxyProtocol {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ProxyProtocol::Socks5),
            1 => Ok(ProxyProtocol::Http),
            other => Err(format!("unknown proxy protocol code {other}")),
        }
    }
}

impl fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyProtocol::Socks5 => write!(f, "socks5"),
            ProxyProtocol::Http => write!(f, "http"),
        }
    }
}

/// Mirrors the `{ "proxy": { ... } }` shape of `proxy_config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfigFile {
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub target: String,
    pub count_target: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub share: bool,
    pub socket_count: u32,
    pub per_fetch: u32,
    pub protocol: ProxyProtocol,
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval: u64,
}

fn default_fetch_interval() -> u64 {
    120
}

impl ProxyConfig {
    pub fn from_str(json: &str) -> Result<Self, serde_json::Error> {
        let file: ProxyConfigFile = serde_json::from_str(json)?;
        Ok(file.proxy)
    }

    pub fn from_file(path: &str) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_proxy_config_json() {
        let json = r#"
        {
            "proxy": {
                "host": "http://vendor.example/extract",
                "target": "http://vendor.example/quota",
                "count_target": "http://vendor.example/count",
                "username": "user1",
                "password": "pass1",
                "share": true,
                "socket_count": 30,
                "per_fetch": 50,
                "protocol": 0,
                "fetch_interval": 60,
                "#available_protocols": ["socks5", "http"]
            }
        }
        "#;
        let cfg = ProxyConfig::from_str(json).unwrap();
        assert_eq!(cfg.protocol, ProxyProtocol::Socks5);
        assert_eq!(cfg.socket_count, 30);
        assert!(cfg.share);
    }

    #[test]
    fn defaults_fetch_interval_when_absent() {
        let json = r#"
        {
            "proxy": {
                "host": "h",
                "target": "t",
                "count_target": "c",
                "username": "u",
                "password": "p",
                "socket_count": 1,
                "per_fetch": 1,
                "protocol": 1
            }
        }
        "#;
        let cfg = ProxyConfig::from_str(json).unwrap();
        assert_eq!(cfg.fetch_interval, 120);
        assert_eq!(cfg.protocol, ProxyProtocol::Http);
    }

    #[test]
    fn rejects_unknown_protocol_code() {
        let json = r#"{"proxy":{"host":"h","target":"t","count_target":"c","username":"u","password":"p","socket_count":1,"per_fetch":1,"protocol":9}}"#;
        assert!(ProxyConfig::from_str(json).is_err());
    }
}
