use crate::{
    browse_path::BrowsePathStep,
    error::RecorderResult,
    node_id::{NodeIdentifier, NumericNodeId},
    wire::WireVariant,
};
use async_trait::async_trait;
use std::fmt;

/// Service status as surfaced by the protocol client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StatusCode {
    #[default]
    Good,
    BadNotFound,
    BadInternalError,
    BadInvalid,
    /// Any other bad status, carried opaquely.
    Bad(u32),
}

impl StatusCode {
    pub const GOOD_RAW: u32 = 0x0000_0000;
    pub const BAD_INTERNAL_ERROR_RAW: u32 = 0x8002_0000;
    pub const BAD_NOT_FOUND_RAW: u32 = 0x803E_0000;
    pub const BAD_INVALID_ARGUMENT_RAW: u32 = 0x80AB_0000;

    /// Map a raw 32-bit status; only the severity and sub-code bits matter.
    pub fn from_raw(raw: u32) -> Self {
        match raw & 0xFFFF_0000 {
            Self::GOOD_RAW => StatusCode::Good,
            Self::BAD_NOT_FOUND_RAW => StatusCode::BadNotFound,
            Self::BAD_INTERNAL_ERROR_RAW => StatusCode::BadInternalError,
            Self::BAD_INVALID_ARGUMENT_RAW => StatusCode::BadInvalid,
            // Uncertain statuses carry data and are treated as usable.
            code if code & 0x8000_0000 == 0 => StatusCode::Good,
            code => StatusCode::Bad(code),
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            StatusCode::Good => Self::GOOD_RAW,
            StatusCode::BadNotFound => Self::BAD_NOT_FOUND_RAW,
            StatusCode::BadInternalError => Self::BAD_INTERNAL_ERROR_RAW,
            StatusCode::BadInvalid => Self::BAD_INVALID_ARGUMENT_RAW,
            StatusCode::Bad(code) => *code,
        }
    }

    #[inline]
    pub fn is_good(&self) -> bool {
        matches!(self, StatusCode::Good)
    }

    #[inline]
    pub fn is_bad(&self) -> bool {
        !self.is_good()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Good => f.write_str("Good"),
            StatusCode::BadNotFound => f.write_str("BadNotFound"),
            StatusCode::BadInternalError => f.write_str("BadInternalError"),
            StatusCode::BadInvalid => f.write_str("BadInvalid"),
            StatusCode::Bad(code) => write!(f, "Bad(0x{code:08X})"),
        }
    }
}

/// Browse result mask bits.
pub mod result_mask {
    pub const REFERENCE_TYPE: u32 = 0x01;
    pub const IS_FORWARD: u32 = 0x02;
    pub const NODE_CLASS: u32 = 0x04;
    pub const BROWSE_NAME: u32 = 0x08;
    pub const DISPLAY_NAME: u32 = 0x10;
    pub const TYPE_DEFINITION: u32 = 0x20;
}

/// Filter options of a single-level forward browse.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseOptions {
    /// `None` follows every reference type.
    pub reference_type: Option<NumericNodeId>,
    pub include_subtypes: bool,
    /// Zero means unlimited.
    pub max_references: u32,
    pub result_mask: u32,
}

impl Default for BrowseOptions {
    fn default() -> Self {
        Self {
            reference_type: None,
            include_subtypes: true,
            max_references: 0,
            result_mask: result_mask::REFERENCE_TYPE | result_mask::BROWSE_NAME,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedName {
    pub namespace: u16,
    pub name: String,
}

/// One reference returned by a browse.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseReference {
    pub reference_type: NodeIdentifier,
    pub browse_name: QualifiedName,
    pub target: NodeIdentifier,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowseResponse {
    pub status: StatusCode,
    pub references: Vec<BrowseReference>,
}

/// Result set for one translated browse path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathResult {
    pub status: StatusCode,
    pub targets: Vec<NodeIdentifier>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslateResponse {
    pub status: StatusCode,
    pub results: Vec<PathResult>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallResponse {
    pub status: StatusCode,
    pub outputs: Vec<WireVariant>,
}

/// Protocol client capability used by the recorder.
///
/// Transport failures are returned as `Err`; service level outcomes are
/// reported through the status carried in each response.
#[async_trait]
pub trait UaClient: Send + Sync {
    async fn connect(&self, url: &str) -> RecorderResult<()>;

    async fn call(
        &self,
        object: &NodeIdentifier,
        method: &NodeIdentifier,
        inputs: Vec<WireVariant>,
    ) -> RecorderResult<CallResponse>;

    async fn browse(
        &self,
        node: &NodeIdentifier,
        options: &BrowseOptions,
    ) -> RecorderResult<BrowseResponse>;

    async fn translate_path(
        &self,
        start: &NodeIdentifier,
        steps: &[BrowsePathStep],
    ) -> RecorderResult<TranslateResponse>;

    /// Read the `Value` attribute of a variable node.
    async fn read_value(&self, node: &NodeIdentifier) -> RecorderResult<WireVariant>;
}
