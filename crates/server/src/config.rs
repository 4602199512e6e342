use clap::Parser;
use dealdesk_engine::transport::TransportError;
use dealdesk_engine::{HttpTransport, RetryPolicy};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Runtime settings. Every flag can also come from a `DEALDESK_*` variable.
#[derive(Debug, Clone, Parser)]
#[command(name = "dealdesk-server", about = "Sell panel overlay runtime")]
pub struct OverlayConfig {
    /// Address the local message/UI surface listens on.
    #[arg(long, env = "DEALDESK_BIND", default_value = "127.0.0.1:39334")]
    pub bind: SocketAddr,

    /// Host resource name; a `cfx-nui-` prefix is stripped.
    #[arg(long, env = "DEALDESK_RESOURCE", default_value = "bldr-drugs")]
    pub resource: String,

    /// Full host base URL. Overrides `--resource` when set.
    #[arg(long, env = "DEALDESK_HOST_URL")]
    pub host_url: Option<String>,

    #[arg(long, env = "DEALDESK_FETCH_DELAY_MS", default_value_t = 500)]
    pub fetch_delay_ms: u64,

    #[arg(long, env = "DEALDESK_RETRY_MAX", default_value_t = 3)]
    pub retry_max: u32,

    #[arg(long, env = "DEALDESK_RETRY_DELAY_MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,

    #[arg(long, env = "DEALDESK_EXPIRY_MS", default_value_t = 300_000)]
    pub expiry_ms: u64,

    #[arg(long, env = "DEALDESK_CLOSE_SETTLE_MS", default_value_t = 500)]
    pub close_settle_ms: u64,

    #[arg(long, env = "DEALDESK_NOTICE_MS", default_value_t = 5000)]
    pub notice_ms: u64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 39334),
            resource: "bldr-drugs".to_string(),
            host_url: None,
            fetch_delay_ms: 500,
            retry_max: 3,
            retry_delay_ms: 1000,
            expiry_ms: 300_000,
            close_settle_ms: 500,
            notice_ms: 5000,
        }
    }
}

impl OverlayConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_max,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_millis(self.expiry_ms)
    }

    pub fn close_settle(&self) -> Duration {
        Duration::from_millis(self.close_settle_ms)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.notice_ms)
    }

    pub fn transport(&self) -> Result<HttpTransport, TransportError> {
        match &self.host_url {
            Some(url) => HttpTransport::new(url.clone()),
            None => HttpTransport::for_resource(&self.resource),
        }
    }
}
