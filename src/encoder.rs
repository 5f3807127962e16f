//! Payload encoding
//!
//! Wraps computed matrices and summaries in a self-describing JSON document
//! carrying producer and provenance metadata.

use crate::cache::content_hash;
use crate::error::ComputeError;
use crate::types::{
    BucketMode, DateRange, IntervalRecord, OccupancyPayload, PayloadBody, PayloadProducer,
    PayloadProvenance,
};
use crate::{FLUX_VERSION, PRODUCER_NAME};
use chrono::Utc;
use uuid::Uuid;

/// Current payload schema version
pub const PAYLOAD_VERSION: &str = "1.0.0";

/// Inputs a payload is derived from
#[derive(Debug, Clone, Copy)]
pub struct EncodeContext<'a> {
    pub records: &'a [IntervalRecord],
    pub mode: BucketMode,
    pub date_range: Option<DateRange>,
}

/// Encoder for producing JSON payloads
pub struct HeatmapEncoder {
    instance_id: String,
}

impl Default for HeatmapEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HeatmapEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn encode(
        &self,
        context: &EncodeContext<'_>,
        body: PayloadBody,
    ) -> Result<OccupancyPayload, ComputeError> {
        let producer = PayloadProducer {
            name: PRODUCER_NAME.to_string(),
            version: FLUX_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let provenance = PayloadProvenance {
            mode: context.mode,
            record_count: context.records.len(),
            date_range: context.date_range,
            input_hash: content_hash(context.records)?,
            computed_at_utc: Utc::now().to_rfc3339(),
        };

        Ok(OccupancyPayload {
            schema_version: PAYLOAD_VERSION.to_string(),
            producer,
            provenance,
            body,
        })
    }

    /// Encode to a pretty-printed JSON string
    pub fn encode_to_json(
        &self,
        context: &EncodeContext<'_>,
        body: PayloadBody,
    ) -> Result<String, ComputeError> {
        let payload = self.encode(context, body)?;
        serde_json::to_string_pretty(&payload).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }

    /// Encode to single-line JSON
    pub fn encode_to_compact_json(
        &self,
        context: &EncodeContext<'_>,
        body: PayloadBody,
    ) -> Result<String, ComputeError> {
        let payload = self.encode(context, body)?;
        serde_json::to_string(&payload).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }
}
