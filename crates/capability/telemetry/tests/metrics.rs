use bridge_telemetry::{
    TelemetryMetrics, metrics, record_reading_produced, record_sink_push,
    record_telegram_crc_failure,
};

#[test]
fn fresh_metrics_start_at_zero() {
    let snapshot = TelemetryMetrics::new().snapshot();
    assert_eq!(snapshot, Default::default());
}

#[test]
fn record_functions_increment_global_counters() {
    let before = metrics().snapshot();

    record_reading_produced();
    record_reading_produced();
    record_sink_push(true);
    record_sink_push(false);
    record_telegram_crc_failure();

    let after = metrics().snapshot();
    assert!(after.readings_produced >= before.readings_produced + 2);
    assert!(after.sink_push_success > before.sink_push_success);
    assert!(after.sink_push_failure > before.sink_push_failure);
    assert!(after.telegram_crc_failures > before.telegram_crc_failures);
}
