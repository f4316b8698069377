//! Test-only doubles (spec's test tooling section): a `CommandTransport`
//! fake that records every wire command issued and replays canned bodies,
//! so `Player`/`Group` behavior can be exercised without a real device on
//! the network.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::Result;
use crate::model::{DeviceId, DeviceIdentity, Protocol};
use crate::transport::{CommandTransport, RawResponse};

/// Records issued commands and replays queued responses in order. When the
/// queue is empty, `execute` returns a bare `200 OK` rather than erroring,
/// so tests only need to preload the responses whose body actually matters.
pub struct FakeTransport {
    queued: Mutex<VecDeque<RawResponse>>,
    issued: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        FakeTransport {
            queued: Mutex::new(VecDeque::new()),
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Queues the next `execute` call's response body (status 200).
    pub fn push_ok(&self, body: &str) {
        self.queued.lock().unwrap().push_back(RawResponse {
            status: 200,
            body: body.to_string(),
        });
    }

    /// Every command issued so far, in call order.
    pub fn issued_commands(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandTransport for FakeTransport {
    async fn execute(&self, command: &str) -> Result<RawResponse> {
        self.issued.lock().unwrap().push(command.to_string());
        let next = self.queued.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| RawResponse {
            status: 200,
            body: "OK".to_string(),
        }))
    }
}

/// A minimal, fully-populated `DeviceIdentity` for tests.
pub fn identity(id: &str, host: &str) -> DeviceIdentity {
    DeviceIdentity {
        uuid: DeviceId(id.to_string()),
        host: host.to_string(),
        port: 80,
        protocol: Protocol::Http,
        mac: None,
        friendly_name: format!("Test Device {id}"),
        model: "TestModel".to_string(),
        firmware_version: None,
        latest_firmware_version: None,
        update_available: false,
    }
}
