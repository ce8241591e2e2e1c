//! Host resolution used by the SSRF guard

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;

/// Resolves a hostname to the addresses a connection would use
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|sa| sa.ip()).collect())
    }
}

/// Fixed host table, used for tests and air-gapped deployments
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, addr: IpAddr) -> Self {
        self.hosts.entry(host.to_ascii_lowercase()).or_default().push(addr);
        self
    }

    pub fn with_hosts(mut self, host: &str, addrs: Vec<IpAddr>) -> Self {
        self.hosts.insert(host.to_ascii_lowercase(), addrs);
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        self.hosts.get(&host.to_ascii_lowercase()).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address for {}", host))
        })
    }
}
