//! Single-device HTTP transport (spec §4.1).
//!
//! Grounded on `pmocontrol::linkplay_client::fetch_status_for_host` (the
//! `GET /httpapi.asp?command=...` shape, percent-encoding of command
//! arguments) generalized from "one fixed verb" to "any verb", and converted
//! from `ureq`'s blocking `Agent` to `reqwest`'s async client — the teacher's
//! sibling crate `pmoupnp` already depends on `reqwest` for its own HTTP
//! needs, and spec §1 explicitly rules out a blocking/synchronous API.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use crate::errors::{ControlError, RequestContext};
use crate::model::{DeviceId, Protocol};

/// Seam `Player` issues every wire command through. `Transport` is the only
/// production implementation; tests substitute a fake that records issued
/// commands and returns canned bodies without any real network I/O.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn execute(&self, command: &str) -> Result<RawResponse, ControlError>;
}

/// Address shapes probed, in order, on first connection (spec §4.1).
const ADDRESS_CANDIDATES: &[(Protocol, u16)] = &[
    (Protocol::Https, 443),
    (Protocol::Https, 4443),
    (Protocol::Https, 8443),
    (Protocol::Http, 80),
    (Protocol::Http, 8080),
];

#[derive(Clone, Copy, Debug)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// Raw HTTP response body plus the status line, handed to `Parser`/`Dialect`.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    /// Wire-format policy for setters (spec §4.2): a 200 with an empty or
    /// non-JSON "OK" body counts as success.
    pub fn is_bare_ok(&self) -> bool {
        self.status == 200 && (self.body.trim().is_empty() || self.body.trim().eq_ignore_ascii_case("ok"))
    }

    pub fn looks_like_unknown_command(&self) -> bool {
        self.body.to_ascii_lowercase().contains("unknown command")
    }
}

/// Thin per-device HTTP client. One `Transport` is created per attached
/// device and reused for its lifetime; the underlying `reqwest::Client` may
/// be shared across many `Transport`s (spec §5, "a single shared HTTP client
/// may be reused across all Players").
#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
    device: DeviceId,
    host: String,
    config: TransportConfig,
    address: std::sync::Arc<tokio::sync::RwLock<Option<(Protocol, u16)>>>,
}

impl Transport {
    pub fn new(client: reqwest::Client, device: DeviceId, host: String, config: TransportConfig) -> Self {
        Transport {
            client,
            device,
            host,
            config,
            address: std::sync::Arc::new(tokio::sync::RwLock::new(None)),
        }
    }

    /// Creates a transport with a known-good address, skipping probing.
    pub fn with_address(
        client: reqwest::Client,
        device: DeviceId,
        host: String,
        protocol: Protocol,
        port: u16,
        config: TransportConfig,
    ) -> Self {
        let transport = Self::new(client, device, host, config);
        {
            let address = transport.address.clone();
            tokio::spawn(async move {
                *address.write().await = Some((protocol, port));
            });
        }
        transport
    }

    fn build_url(&self, protocol: Protocol, port: u16, command: &str) -> String {
        format!(
            "{}://{}:{}/httpapi.asp?command={}",
            protocol.scheme(),
            self.host,
            port,
            percent_encode_command(command)
        )
    }

    /// Resolves and caches the device's working address by attempting each
    /// candidate shape until one returns a well-formed status response.
    async fn resolve_address(&self) -> Result<(Protocol, u16), ControlError> {
        if let Some(addr) = *self.address.read().await {
            return Ok(addr);
        }

        for &(protocol, port) in ADDRESS_CANDIDATES {
            let url = self.build_url(protocol, port, "getPlayerStatus");

            let Ok(response) = self.client.get(&url).timeout(self.config.timeout).send().await else {
                continue;
            };
            if response.status().is_success() {
                debug!(device = %self.device, %url, "resolved device address");
                *self.address.write().await = Some((protocol, port));
                return Ok((protocol, port));
            }
        }

        Err(ControlError::Connection(RequestContext {
            device: self.device.clone(),
            endpoint: format!("{}:<probe>", self.host),
            attempt: ADDRESS_CANDIDATES.len() as u32,
        }))
    }

    /// Issues one abstract wire command, retrying transient failures with
    /// exponential backoff (spec §4.1). Address changes are not retried
    /// across — a failed probe surfaces immediately.
    pub async fn execute(&self, command: &str) -> Result<RawResponse, ControlError> {
        let (protocol, port) = self.resolve_address().await?;
        let url = self.build_url(protocol, port, command);

        let mut attempt: u32 = 0;
        let mut backoff = self.config.initial_backoff;

        loop {
            attempt += 1;
            let ctx = RequestContext {
                device: self.device.clone(),
                endpoint: url.clone(),
                attempt,
            };

            match self.client.get(&url).timeout(self.config.timeout).send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.map_err(|e| {
                        ControlError::TransportProtocol(ctx.clone(), e.to_string())
                    })?;
                    let raw = RawResponse {
                        status: status.as_u16(),
                        body,
                    };

                    if status.is_client_error() {
                        return Err(ControlError::DeviceRejected(
                            ctx,
                            format!("HTTP {}", status.as_u16()),
                        ));
                    }
                    if raw.looks_like_unknown_command() {
                        return Err(ControlError::DeviceRejected(
                            ctx,
                            "unknown command".to_string(),
                        ));
                    }
                    if status.is_server_error() {
                        if attempt >= self.config.max_attempts {
                            return Err(ControlError::TransportProtocol(
                                ctx,
                                format!("HTTP {}", status.as_u16()),
                            ));
                        }
                        warn!(device = %self.device, %command, attempt, "transient 5xx, retrying");
                        tokio::time::sleep(jittered(backoff)).await;
                        backoff *= 2;
                        continue;
                    }

                    return Ok(raw);
                }
                Err(err) if err.is_timeout() => {
                    if attempt >= self.config.max_attempts {
                        return Err(ControlError::Timeout(ctx));
                    }
                    warn!(device = %self.device, %command, attempt, "timeout, retrying");
                    tokio::time::sleep(jittered(backoff)).await;
                    backoff *= 2;
                }
                Err(err) if err.is_connect() => {
                    if attempt >= self.config.max_attempts {
                        return Err(ControlError::Connection(ctx));
                    }
                    warn!(device = %self.device, %command, attempt, "connection failed, retrying");
                    tokio::time::sleep(jittered(backoff)).await;
                    backoff *= 2;
                }
                Err(err) => {
                    return Err(ControlError::TransportProtocol(ctx, err.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl CommandTransport for Transport {
    async fn execute(&self, command: &str) -> Result<RawResponse, ControlError> {
        Transport::execute(self, command).await
    }
}

/// Adds up to 20% random jitter to a backoff delay, so many devices hitting
/// the same transient failure at once don't retry in lockstep.
fn jittered(delay: Duration) -> Duration {
    let jitter_fraction = rand::rng().random_range(0.0..0.2);
    delay + Duration::from_secs_f64(delay.as_secs_f64() * jitter_fraction)
}

fn percent_encode_command(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b':' | b',' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ok_detection() {
        let ok = RawResponse {
            status: 200,
            body: "OK".to_string(),
        };
        assert!(ok.is_bare_ok());

        let empty = RawResponse {
            status: 200,
            body: "".to_string(),
        };
        assert!(empty.is_bare_ok());

        let json = RawResponse {
            status: 200,
            body: "{\"status\":\"play\"}".to_string(),
        };
        assert!(!json.is_bare_ok());
    }

    #[test]
    fn unknown_command_detection() {
        let r = RawResponse {
            status: 200,
            body: "unknown command".to_string(),
        };
        assert!(r.looks_like_unknown_command());
    }

    #[test]
    fn percent_encodes_reserved_chars() {
        assert_eq!(percent_encode_command("setPlayerCmd:vol:50"), "setPlayerCmd:vol:50");
        assert_eq!(percent_encode_command("a b"), "a%20b");
    }
}
