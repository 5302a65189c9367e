use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::data_point::DataPoint;
use super::query::Query;

/// Response metadata attached to every [`DataResponse`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub query_time: DateTime<Utc>,

    /// Wall-clock time spent serving the request, in milliseconds
    pub execution_time_ms: f64,

    pub record_count: usize,

    #[serde(default)]
    pub cache_hit: bool,

    /// Fraction of expected fields populated, in [0, 1]
    #[serde(default)]
    pub data_quality_score: f64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ResponseMetadata {
    pub fn new(record_count: usize) -> Self {
        Self {
            query_time: Utc::now(),
            execution_time_ms: 0.0,
            record_count,
            cache_hit: false,
            data_quality_score: 0.0,
            warnings: Vec::new(),
        }
    }
}

/// Identity of the provider that produced a response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ProviderInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: None,
            version: None,
        }
    }
}

/// Ordered data points plus metadata, provider identity and the originating query.
///
/// Responses are plain values; every cache tier and every caller holds its
/// own copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    pub data: Vec<DataPoint>,
    pub metadata: ResponseMetadata,
    pub source: ProviderInfo,
    pub query: Query,
}

impl DataResponse {
    /// Builds a response whose record count matches `data`.
    pub fn new(data: Vec<DataPoint>, source: ProviderInfo, query: Query) -> Self {
        let metadata = ResponseMetadata::new(data.len());
        Self {
            data,
            metadata,
            source,
            query,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
