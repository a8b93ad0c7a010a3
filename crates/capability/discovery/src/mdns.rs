//! mDNS 浏览定位本地电表。

use crate::{DiscoveryError, MeterLocator};
use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const METER_SERVICE_TYPE: &str = "_hwenergy._tcp.local.";
pub const METER_PRODUCT_TYPE: &str = "HWE-P1";

/// 浏览 `_hwenergy._tcp`，取第一个产品类型匹配的电表。
#[derive(Debug, Clone)]
pub struct MdnsMeterLocator {
    service_type: String,
    product_type: String,
    timeout: Duration,
}

impl MdnsMeterLocator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            service_type: METER_SERVICE_TYPE.to_string(),
            product_type: METER_PRODUCT_TYPE.to_string(),
            timeout,
        }
    }

    pub fn with_product_type(mut self, product_type: impl Into<String>) -> Self {
        self.product_type = product_type.into();
        self
    }

    async fn browse(&self) -> Result<IpAddr, DiscoveryError> {
        let mdns = ServiceDaemon::new().map_err(|err| DiscoveryError::Mdns(err.to_string()))?;
        let receiver = match mdns.browse(&self.service_type) {
            Ok(receiver) => receiver,
            Err(err) => {
                let _ = mdns.shutdown();
                return Err(DiscoveryError::Mdns(err.to_string()));
            }
        };
        info!(
            service_type = %self.service_type,
            product_type = %self.product_type,
            "mdns_browse_started"
        );

        let product_type = self.product_type.as_str();
        let found = tokio::time::timeout(self.timeout, async {
            while let Ok(event) = receiver.recv_async().await {
                let ServiceEvent::ServiceResolved(info) = event else {
                    continue;
                };
                let advertised = info.get_property_val_str("product_type");
                if advertised != Some(product_type) {
                    debug!(
                        name = %info.get_fullname(),
                        product_type = ?advertised,
                        "mdns_service_ignored"
                    );
                    continue;
                }
                let ip = info
                    .get_addresses_v4()
                    .iter()
                    .next()
                    .and_then(|ip| ip.to_string().parse::<IpAddr>().ok());
                if let Some(ip) = ip {
                    info!(name = %info.get_fullname(), ip = %ip, "meter discovered");
                    return Some(ip);
                }
            }
            None
        })
        .await;

        let _ = mdns.shutdown();
        match found {
            Ok(Some(ip)) => Ok(ip),
            _ => {
                warn!(
                    product_type = %self.product_type,
                    timeout_secs = self.timeout.as_secs(),
                    "no meter found via mdns"
                );
                Err(DiscoveryError::NotFound("meter"))
            }
        }
    }
}

#[async_trait]
impl MeterLocator for MdnsMeterLocator {
    async fn locate_meter(&self) -> Result<IpAddr, DiscoveryError> {
        self.browse().await
    }
}
