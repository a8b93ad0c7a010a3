//! 按配置组装数据源与显示屏输出端。

use bridge_config::{BridgeConfig, SourceKind};
use bridge_discovery::{MdnsMeterLocator, SsdpDisplayLocator, SsdpPolicy};
use bridge_ingest::{
    CloudWsConfig, CloudWsSource, HttpPollConfig, HttpPollSource, LocalWsConfig, LocalWsSource,
    SerialConfig, SerialSource, Source, SystemSerial,
};
use bridge_pipeline::PipelineConfig;
use bridge_sink::{LaMetricConfig, LaMetricSink, SinkError};
use std::sync::Arc;

/// 所选数据源；必填项缺失由 `connect()` 报告。
pub fn build_source(config: &BridgeConfig) -> Box<dyn Source> {
    let meter_locator = || Arc::new(MdnsMeterLocator::new(config.discovery_timeout));
    match config.source {
        SourceKind::Tibber => {
            let tibber = &config.tibber;
            Box::new(CloudWsSource::new(CloudWsConfig::new(
                tibber.token.clone(),
                tibber.endpoint.clone(),
                tibber.user_agent.clone(),
            )))
        }
        SourceKind::HomeWizardP1 => {
            let homewizard = &config.homewizard;
            let poll = HttpPollConfig {
                host: homewizard.p1_host.clone(),
                poll_interval: homewizard.poll_interval,
                request_timeout: homewizard.http_timeout,
                max_retries: homewizard.max_retries,
            };
            Box::new(HttpPollSource::new(poll, meter_locator()))
        }
        SourceKind::HomeWizardV2 => {
            let homewizard = &config.homewizard;
            let ws = LocalWsConfig {
                host: homewizard.host.clone(),
                token: homewizard.token.clone(),
                ..LocalWsConfig::default()
            };
            Box::new(LocalWsSource::new(ws, meter_locator()))
        }
        SourceKind::P1Serial => {
            let serial = &config.serial;
            let port = SerialConfig {
                read_timeout: serial.read_timeout,
                max_retries: serial.max_retries,
                ..SerialConfig::new(serial.device.clone(), serial.baud_rate)
            };
            Box::new(SerialSource::new(port, Arc::new(SystemSerial)))
        }
    }
}

pub fn build_sink(config: &BridgeConfig) -> Result<LaMetricSink, SinkError> {
    let lametric = &config.lametric;
    let policy = if lametric.ssdp_first_match {
        SsdpPolicy::FirstMatch
    } else {
        SsdpPolicy::DetectAmbiguity
    };
    let locator = Arc::new(SsdpDisplayLocator::new(config.discovery_timeout, policy));
    let sink_config = LaMetricConfig::new(
        lametric.url.clone(),
        lametric.api_key.clone().unwrap_or_default(),
        lametric.discover,
    );
    LaMetricSink::new(sink_config, locator)
}

pub fn pipeline_config(config: &BridgeConfig) -> PipelineConfig {
    PipelineConfig {
        stale_timeout: config.stale_timeout,
        stale_check_interval: config.stale_check_interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_config::{HomeWizardSettings, LaMetricSettings, SerialSettings, TibberSettings};
    use std::time::Duration;

    fn config(source: SourceKind) -> BridgeConfig {
        BridgeConfig {
            source,
            tibber: TibberSettings {
                token: Some("token".into()),
                endpoint: "https://api.tibber.com/v1-beta/gql".into(),
                user_agent: "power-bridge/test".into(),
            },
            homewizard: HomeWizardSettings {
                p1_host: Some("192.168.1.40".into()),
                host: None,
                token: None,
                poll_interval: Duration::from_secs(1),
                http_timeout: Duration::from_secs(5),
                max_retries: 3,
            },
            serial: SerialSettings {
                device: "/dev/ttyUSB0".into(),
                baud_rate: 115_200,
                read_timeout: Duration::from_secs(10),
                max_retries: 5,
            },
            lametric: LaMetricSettings {
                url: Some("http://192.168.1.50:8080/api/v1/dev/widget/update".into()),
                api_key: Some("key".into()),
                discover: false,
                ssdp_first_match: false,
            },
            discovery_timeout: Duration::from_secs(10),
            stale_timeout: Duration::from_secs(60),
            stale_check_interval: Duration::from_secs(10),
        }
    }

    #[test]
    fn factory_builds_selected_source() {
        for kind in SourceKind::ALL {
            let source = build_source(&config(kind));
            assert_eq!(source.name(), kind.as_str());
        }
    }

    #[test]
    fn sink_requires_api_key() {
        let mut config = config(SourceKind::Tibber);
        config.lametric.api_key = None;
        assert!(matches!(build_sink(&config), Err(SinkError::Configuration(_))));
    }

    #[test]
    fn sink_accepts_discovery_without_url() {
        let mut config = config(SourceKind::Tibber);
        config.lametric.url = None;
        config.lametric.discover = true;
        assert!(build_sink(&config).is_ok());
    }

    #[test]
    fn staleness_settings_flow_into_pipeline() {
        let mut config = config(SourceKind::Tibber);
        config.stale_timeout = Duration::from_secs(90);
        let pipeline = pipeline_config(&config);
        assert_eq!(pipeline.stale_timeout, Duration::from_secs(90));
        assert_eq!(pipeline.stale_check_interval, Duration::from_secs(10));
    }
}
