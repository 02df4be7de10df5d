//! Subnet discovery scanner
//!
//! Fans bounded-concurrency health probes across the local /24 and
//! returns the first responding device. Individual probe failures are
//! data, never errors; only a missing local subnet is fatal.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};

use crate::error::{Error, Result};
use crate::net::endpoint::DeviceEndpoint;
use crate::net::health::HealthClient;

/// Resolve the host's local IPv4 address
///
/// A host with no determinable IPv4 address has no scannable subnet,
/// which is a configuration error (operator must supply an address).
pub fn local_ipv4() -> Result<Ipv4Addr> {
    match local_ip_address::local_ip() {
        Ok(IpAddr::V4(addr)) => Ok(addr),
        Ok(IpAddr::V6(addr)) => Err(Error::Config(format!(
            "local address {} is IPv6; cannot derive a /24 subnet",
            addr
        ))),
        Err(e) => Err(Error::Config(format!("no local address: {}", e))),
    }
}

/// All candidate host addresses (.1 through .254) in `local`'s /24
fn subnet_hosts(local: Ipv4Addr) -> Vec<Ipv4Addr> {
    let [a, b, c, _] = local.octets();
    (1..=254).map(|host| Ipv4Addr::new(a, b, c, host)).collect()
}

/// Scan the /24 derived from `local` for a device
///
/// Probes run concurrently with at most `concurrency` in flight, each
/// bounded by the client's probe timeout. Returns the responder with
/// the lowest host number, or `Ok(None)` when nothing answers before
/// `overall_timeout` — a normal not-found result, not an error.
pub async fn discover(
    local: Ipv4Addr,
    client: &HealthClient,
    concurrency: usize,
    overall_timeout: Duration,
) -> Result<Option<DeviceEndpoint>> {
    if concurrency == 0 {
        return Err(Error::Config("probe concurrency must be at least 1".into()));
    }

    let hosts = subnet_hosts(local);
    tracing::info!(
        subnet = %format!("{}.{}.{}.x", local.octets()[0], local.octets()[1], local.octets()[2]),
        concurrency,
        "Scanning subnet for device"
    );

    let deadline = tokio::time::Instant::now() + overall_timeout;

    // Fan-out/fan-in: every probe settles to Some(addr) or None, so a
    // refused or timed-out host can never abort the batch.
    let mut probes = stream::iter(hosts)
        .map(|addr| async move { client.probe(addr).await })
        .buffer_unordered(concurrency);

    let mut responders: Vec<Ipv4Addr> = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, probes.next()).await {
            Ok(Some(Some(addr))) => {
                tracing::debug!(%addr, "Probe matched device payload");
                responders.push(addr);
            }
            Ok(Some(None)) => {}
            // All probes settled
            Ok(None) => break,
            // Overall deadline hit; keep whatever already answered
            Err(_) => {
                tracing::debug!("Discovery deadline reached with probes outstanding");
                break;
            }
        }
    }

    // Ties break by ascending host number
    responders.sort_unstable();
    Ok(responders.into_iter().next().map(DeviceEndpoint::new))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_hosts_cover_the_full_range() {
        let hosts = subnet_hosts(Ipv4Addr::new(192, 168, 1, 50));
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hosts[253], Ipv4Addr::new(192, 168, 1, 254));
        // The scanning host itself stays in the candidate list
        assert!(hosts.contains(&Ipv4Addr::new(192, 168, 1, 50)));
    }

    #[tokio::test]
    async fn zero_concurrency_is_a_config_error() {
        let network = crate::config::NetworkConfig::default();
        let client = HealthClient::new(&network).unwrap();
        let result = discover(
            Ipv4Addr::new(192, 168, 1, 50),
            &client,
            0,
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
