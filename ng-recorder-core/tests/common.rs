#![allow(dead_code)]

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use ng_recorder_core::{
    BrowseOptions, BrowsePathStep, BrowseReference, BrowseResponse, CallResponse, DecodedPoint,
    ExtensionObject, NodeIdentifier, PathResult, PointSink, QualifiedName, RecorderError,
    RecorderResult, StatusCode, TranslateResponse, UaClient, UaDateTime, WireVariant,
};
use ng_recorder_core::node_id::{ns0, NumericNodeId};
use prost::Message;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, Once,
    },
};
use tracing::Level;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

pub fn ns2(id: u32) -> NodeIdentifier {
    NodeIdentifier::Numeric(2, id)
}

pub fn path_key(steps: &[BrowsePathStep]) -> String {
    steps
        .iter()
        .map(|s| format!("{}:{}", s.namespace, s.name))
        .collect::<Vec<_>>()
        .join("/")
}

/// Scripted in-memory protocol client with per-operation call counters.
#[derive(Default)]
pub struct MockClient {
    translations: Mutex<HashMap<String, TranslateResponse>>,
    browses: Mutex<HashMap<NodeIdentifier, BrowseResponse>>,
    values: Mutex<HashMap<NodeIdentifier, WireVariant>>,
    scripted_calls: Mutex<HashMap<NodeIdentifier, VecDeque<RecorderResult<CallResponse>>>>,
    standing_calls: Mutex<HashMap<NodeIdentifier, CallResponse>>,
    call_log: Mutex<Vec<(NodeIdentifier, Vec<WireVariant>)>>,
    pub connects: AtomicUsize,
    pub translates: AtomicUsize,
    pub browse_count: AtomicUsize,
    pub calls: AtomicUsize,
    pub reads: AtomicUsize,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate_to(&self, path: &str, target: NodeIdentifier) {
        self.translate_response(
            path,
            TranslateResponse {
                status: StatusCode::Good,
                results: vec![PathResult {
                    status: StatusCode::Good,
                    targets: vec![target],
                }],
            },
        );
    }

    pub fn translate_response(&self, path: &str, response: TranslateResponse) {
        self.translations
            .lock()
            .unwrap()
            .insert(path.to_string(), response);
    }

    pub fn children(&self, node: NodeIdentifier, children: &[(&str, NumericNodeId, NodeIdentifier)]) {
        let references = children
            .iter()
            .map(|(name, ty, target)| BrowseReference {
                reference_type: (*ty).into(),
                browse_name: QualifiedName {
                    namespace: 2,
                    name: name.to_string(),
                },
                target: target.clone(),
            })
            .collect();
        self.browse_response(
            node,
            BrowseResponse {
                status: StatusCode::Good,
                references,
            },
        );
    }

    pub fn browse_response(&self, node: NodeIdentifier, response: BrowseResponse) {
        self.browses.lock().unwrap().insert(node, response);
    }

    pub fn value(&self, node: NodeIdentifier, value: WireVariant) {
        self.values.lock().unwrap().insert(node, value);
    }

    /// Queue a one-shot response for `method`; queued responses are used
    /// before the standing one.
    pub fn push_call(&self, method: NodeIdentifier, response: RecorderResult<CallResponse>) {
        self.scripted_calls
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(response);
    }

    pub fn standing_call(&self, method: NodeIdentifier, outputs: Vec<WireVariant>) {
        self.standing_calls.lock().unwrap().insert(
            method,
            CallResponse {
                status: StatusCode::Good,
                outputs,
            },
        );
    }

    pub fn calls_to(&self, method: &NodeIdentifier) -> Vec<Vec<WireVariant>> {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, inputs)| inputs.clone())
            .collect()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UaClient for MockClient {
    async fn connect(&self, _url: &str) -> RecorderResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn call(
        &self,
        _object: &NodeIdentifier,
        method: &NodeIdentifier,
        inputs: Vec<WireVariant>,
    ) -> RecorderResult<CallResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_log
            .lock()
            .unwrap()
            .push((method.clone(), inputs));
        if let Some(next) = self
            .scripted_calls
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            return next;
        }
        match self.standing_calls.lock().unwrap().get(method) {
            Some(response) => Ok(response.clone()),
            None => Ok(CallResponse {
                status: StatusCode::BadNotFound,
                outputs: Vec::new(),
            }),
        }
    }

    async fn browse(
        &self,
        node: &NodeIdentifier,
        _options: &BrowseOptions,
    ) -> RecorderResult<BrowseResponse> {
        self.browse_count.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .browses
            .lock()
            .unwrap()
            .get(node)
            .cloned()
            .unwrap_or(BrowseResponse {
                status: StatusCode::BadNotFound,
                references: Vec::new(),
            }))
    }

    async fn translate_path(
        &self,
        _start: &NodeIdentifier,
        steps: &[BrowsePathStep],
    ) -> RecorderResult<TranslateResponse> {
        self.translates.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .translations
            .lock()
            .unwrap()
            .get(&path_key(steps))
            .cloned()
            .unwrap_or(TranslateResponse {
                status: StatusCode::Good,
                results: vec![PathResult {
                    status: StatusCode::BadNotFound,
                    targets: Vec::new(),
                }],
            }))
    }

    async fn read_value(&self, node: &NodeIdentifier) -> RecorderResult<WireVariant> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.values
            .lock()
            .unwrap()
            .get(node)
            .cloned()
            .ok_or_else(|| RecorderError::NotFound(node.to_string()))
    }
}

// ---------------------------------------------------------------------------
// OPC UA binary fixtures
// ---------------------------------------------------------------------------

fn put_string(buf: &mut BytesMut, s: &[u8]) {
    buf.put_i32_le(s.len() as i32);
    buf.put_slice(s);
}

fn put_numeric_node_id(buf: &mut BytesMut, id: &NodeIdentifier) {
    let NodeIdentifier::Numeric(ns, value) = id else {
        panic!("fixtures only use numeric node ids");
    };
    buf.put_u8(0x02);
    buf.put_u16_le(*ns);
    buf.put_u32_le(*value);
}

fn extension_object(encoding_id: u32, body: BytesMut) -> WireVariant {
    WireVariant::ExtensionObject(ExtensionObject {
        type_id: ns2(encoding_id),
        body: body.freeze(),
    })
}

pub fn extremals(minimum: bool, maximum: bool, timestamps: bool) -> WireVariant {
    let mut body = BytesMut::new();
    body.put_u8(minimum as u8);
    body.put_u8(maximum as u8);
    body.put_u8(timestamps as u8);
    extension_object(1094, body)
}

/// `RecordingValueInfo` with status/data type given as raw enum values.
pub fn value_info(status: i32, node: &NodeIdentifier, data_type: i32) -> WireVariant {
    value_info_at(status, node, data_type, None)
}

pub fn value_info_at(
    status: i32,
    node: &NodeIdentifier,
    data_type: i32,
    array_index: Option<i32>,
) -> WireVariant {
    let mut body = BytesMut::new();
    body.put_i32_le(status);
    put_numeric_node_id(&mut body, node);
    body.put_i32_le(array_index.unwrap_or(0));
    body.put_i32_le(data_type);
    body.put_u8(array_index.is_some() as u8);
    body.put_u16_le(if array_index.is_some() { 3 } else { 0 });
    extension_object(5089, body)
}

pub fn lookup_info(node: &NodeIdentifier, browse_path: &str) -> WireVariant {
    let mut body = BytesMut::new();
    put_numeric_node_id(&mut body, node);
    put_string(&mut body, browse_path.as_bytes());
    extension_object(5003, body)
}

pub fn recording_point(config_id: u32, data: &[u8]) -> WireVariant {
    let mut body = BytesMut::new();
    body.put_u32_le(config_id);
    put_string(&mut body, data);
    extension_object(5021, body)
}

pub fn float_payload(start_time_utc: i64, samples: &[f32]) -> Bytes {
    ng_recorder_core::payload::proto::RecordedData {
        start_time_utc,
        float_values: Some(ng_recorder_core::payload::proto::FloatSeries {
            sample: samples.to_vec(),
            ..Default::default()
        }),
        ..Default::default()
    }
    .encode_to_vec()
    .into()
}

pub fn read_response(cursor: UaDateTime, points: Vec<WireVariant>) -> RecorderResult<CallResponse> {
    Ok(CallResponse {
        status: StatusCode::Good,
        outputs: vec![
            WireVariant::UInt32(points.len() as u32),
            WireVariant::DateTime(cursor),
            WireVariant::Array(points),
        ],
    })
}

// ---------------------------------------------------------------------------
// Device fixture
// ---------------------------------------------------------------------------

pub const RECORDINGS: u32 = 1000;
pub const DEVICE: u32 = 1001;
pub const LOOKUP: u32 = 1002;
pub const RECORDING_1: u32 = 1100;
pub const DATA_1: u32 = 1101;
pub const CONFIG_1: u32 = 1110;
pub const GET_RANGE: u32 = 3001;
pub const COUNT_BY_RANGE: u32 = 3002;
pub const READ_BY_START_AND_COUNT: u32 = 3003;

pub const VOLTAGE_L1: u32 = 5001;
pub const VOLTAGE_L2: u32 = 5002;
pub const VOLTAGE_L3: u32 = 5003;

pub fn range_start() -> UaDateTime {
    UaDateTime::from_unix_seconds(1_630_000_000)
}

pub fn range_end() -> UaDateTime {
    UaDateTime::from_unix_seconds(1_630_086_400)
}

/// A device with one recording (`Recording1`) whose configuration 1 holds
/// three Float32 values statused [Available, Missing, Available].
pub fn device_fixture() -> MockClient {
    let client = MockClient::new();
    client.translate_to("2:Device/2:Recordings", ns2(RECORDINGS));
    client.translate_to("2:Device", ns2(DEVICE));
    client.translate_to("2:Lookup", ns2(LOOKUP));
    client.translate_to("2:RecordingType/2:Data/2:GetRange", ns2(GET_RANGE));
    client.translate_to("2:RecordingType/2:Data/2:CountByRange", ns2(COUNT_BY_RANGE));
    client.translate_to(
        "2:RecordingType/2:Data/2:ReadByStartAndCount",
        ns2(READ_BY_START_AND_COUNT),
    );

    client.children(
        ns2(RECORDINGS),
        &[("Recording1", ns0::HAS_COMPONENT, ns2(RECORDING_1))],
    );
    client.children(
        ns2(RECORDING_1),
        &[
            ("Data", ns0::HAS_COMPONENT, ns2(DATA_1)),
            ("RecordingConfiguration1", ns0::HAS_COMPONENT, ns2(CONFIG_1)),
        ],
    );
    client.children(
        ns2(CONFIG_1),
        &[
            ("Algorithm", ns0::HAS_PROPERTY, ns2(1111)),
            ("Extremals", ns0::HAS_PROPERTY, ns2(1112)),
            ("Interval", ns0::HAS_PROPERTY, ns2(1113)),
            ("Values", ns0::HAS_PROPERTY, ns2(1114)),
        ],
    );
    client.value(ns2(1111), WireVariant::Int32(0));
    client.value(ns2(1112), extremals(false, false, false));
    client.value(ns2(1113), WireVariant::UInt32(900));
    client.value(
        ns2(1114),
        WireVariant::Array(vec![
            value_info(3, &ns2(VOLTAGE_L1), 6),
            value_info(4, &ns2(VOLTAGE_L2), 6),
            value_info(3, &ns2(VOLTAGE_L3), 6),
        ]),
    );

    client.standing_call(
        ns2(LOOKUP),
        vec![WireVariant::Array(vec![
            lookup_info(&ns2(VOLTAGE_L1), "Voltage/L1"),
            lookup_info(&ns2(VOLTAGE_L2), "Voltage/L2"),
            lookup_info(&ns2(VOLTAGE_L3), "Voltage/L3"),
        ])],
    );
    client.standing_call(
        ns2(GET_RANGE),
        vec![
            WireVariant::DateTime(range_start()),
            WireVariant::DateTime(range_end()),
        ],
    );
    client
}

/// Sink collecting every decoded point with its recording id.
#[derive(Default)]
pub struct CollectingSink {
    pub points: Vec<(u32, DecodedPoint)>,
}

impl PointSink for CollectingSink {
    fn accept(&mut self, recording_id: u32, point: &DecodedPoint) -> RecorderResult<()> {
        self.points.push((recording_id, point.clone()));
        Ok(())
    }
}
