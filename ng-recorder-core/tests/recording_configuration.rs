mod common;

use common::*;
use ng_recorder_core::{
    node_id::ns0, Algorithm, DataKind, Device, LookupTag, RecorderError, ReferenceStatus,
    WireVariant,
};
use std::sync::Arc;

#[tokio::test]
async fn recordings_are_discovered_with_their_configurations() {
    init_tracing();
    let client = Arc::new(device_fixture());
    let mut device = Device::new(client.clone());

    let recordings = device.recordings().await;

    assert_eq!(recordings.len(), 1);
    assert_eq!(recordings[0].id(), 1);
    assert_eq!(recordings[0].node(), &ns2(RECORDING_1));
    assert_eq!(recordings[0].configuration_ids().collect::<Vec<_>>(), vec![1]);
}

#[tokio::test]
async fn recording_without_method_nodes_is_skipped() {
    init_tracing();
    let client = Arc::new(device_fixture());
    client.translate_response(
        "2:RecordingType/2:Data/2:CountByRange",
        ng_recorder_core::TranslateResponse::default(),
    );
    let mut device = Device::new(client.clone());

    assert!(device.recordings().await.is_empty());
}

#[tokio::test]
async fn recording_without_data_node_is_skipped() {
    init_tracing();
    let client = Arc::new(device_fixture());
    client.children(
        ns2(RECORDING_1),
        &[("RecordingConfiguration1", ns0::HAS_COMPONENT, ns2(CONFIG_1))],
    );
    let mut device = Device::new(client.clone());

    assert!(device.recordings().await.is_empty());
}

#[tokio::test]
async fn configuration_keeps_device_order_and_names_available_values() {
    init_tracing();
    let client = Arc::new(device_fixture());
    let mut device = Device::new(client.clone());
    let mut recording = device.recordings().await.remove(0);

    let config = recording.configuration(1, &mut device).await.unwrap();

    assert_eq!(config.id, 1);
    assert_eq!(config.algorithm, Algorithm::Sample);
    assert_eq!(config.interval_seconds, 900);
    let statuses: Vec<_> = config.values.iter().map(|v| v.status).collect();
    assert_eq!(
        statuses,
        vec![
            ReferenceStatus::Available,
            ReferenceStatus::Missing,
            ReferenceStatus::Available
        ]
    );
    assert!(config.values.iter().all(|v| v.kind == DataKind::Float32));
    assert_eq!(config.values[0].name.as_deref(), Some("Voltage/L1"));
    assert_eq!(config.values[1].name, None);
    assert_eq!(config.values[2].name.as_deref(), Some("Voltage/L3"));

    // one Lookup call served both available values
    assert_eq!(client.calls_to(&ns2(LOOKUP)).len(), 1);
    assert_eq!(
        client.calls_to(&ns2(LOOKUP))[0],
        vec![WireVariant::Int32(LookupTag::Recordable as i32)]
    );
}

#[tokio::test]
async fn configuration_is_read_once_per_session() {
    init_tracing();
    let client = Arc::new(device_fixture());
    let mut device = Device::new(client.clone());
    let mut recording = device.recordings().await.remove(0);

    let first = recording.configuration(1, &mut device).await.unwrap();
    let reads = MockClient::count(&client.reads);
    let second = recording.configuration(1, &mut device).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(MockClient::count(&client.reads), reads);
}

#[tokio::test]
async fn unregistered_configuration_is_not_found() {
    init_tracing();
    let client = Arc::new(device_fixture());
    let mut device = Device::new(client.clone());
    let mut recording = device.recordings().await.remove(0);
    let reads = MockClient::count(&client.reads);

    let err = recording.configuration(7, &mut device).await.unwrap_err();

    assert!(matches!(err, RecorderError::NotFound(_)));
    assert_eq!(MockClient::count(&client.reads), reads);
}

#[tokio::test]
async fn missing_mandatory_attribute_is_not_found() {
    init_tracing();
    let client = Arc::new(device_fixture());
    client.children(
        ns2(CONFIG_1),
        &[
            ("Algorithm", ns0::HAS_PROPERTY, ns2(1111)),
            ("Extremals", ns0::HAS_PROPERTY, ns2(1112)),
            ("Interval", ns0::HAS_PROPERTY, ns2(1113)),
        ],
    );
    let mut device = Device::new(client.clone());
    let mut recording = device.recordings().await.remove(0);

    let err = recording.configuration(1, &mut device).await.unwrap_err();

    assert!(matches!(err, RecorderError::NotFound(_)));
    assert_eq!(MockClient::count(&client.reads), 0);
}

#[tokio::test]
async fn lookup_cache_is_filled_in_one_call() {
    init_tracing();
    let client = Arc::new(device_fixture());
    let mut device = Device::new(client.clone());

    let l1 = device.lookup(&ns2(VOLTAGE_L1), LookupTag::Recordable).await;
    let l2 = device.lookup(&ns2(VOLTAGE_L2), LookupTag::Recordable).await;

    assert_eq!(l1.as_deref(), Some("Voltage/L1"));
    assert_eq!(l2.as_deref(), Some("Voltage/L2"));
    assert_eq!(client.calls_to(&ns2(LOOKUP)).len(), 1);
}

#[tokio::test]
async fn unknown_node_has_no_name() {
    init_tracing();
    let client = Arc::new(device_fixture());
    let mut device = Device::new(client.clone());

    assert!(device.lookup(&ns2(9999), LookupTag::Measurement).await.is_none());
}
