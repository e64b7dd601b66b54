use std::time::Instant;

/// Liveness classification of a proxy endpoint. Only `Active` entries are
/// handed out by normal rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyProperty {
    Active,
    Unresponsive,
    Blocked,
    ToldToWait,
}

/// One upstream proxy: address, credentials, and a liveness tag.
#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub property: ProxyProperty,
    pub last_used: Instant,
}

impl ProxyEndpoint {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            property: ProxyProperty::Active,
            last_used: Instant::now(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_formats_host_and_port() {
        let ep = ProxyEndpoint::new("127.0.0.1", 1080, "u", "p");
        assert_eq!(ep.address(), "127.0.0.1:1080");
        assert_eq!(ep.property, ProxyProperty::Active);
    }
}
