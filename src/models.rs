use serde::{de, Deserialize, Deserializer, Serialize};

use crate::{error::ApiError, jobs::JobStatus};

pub const DEFAULT_FRAME_STEP: u32 = 10;

/// One named-entity mention: a token seen at `timestamp` seconds into a transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedEntity {
    pub timestamp: f64,
    pub token: String,
}

#[derive(Deserialize, Debug)]
pub struct RenderRequest {
    #[serde(deserialize_with = "deserialize_naments")]
    pub naments: Vec<NamedEntity>,
    #[serde(default = "default_frame_step")]
    pub frame_step: u32,
}

impl RenderRequest {
    /// Parses and validates a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, ApiError> {
        let request: RenderRequest = serde_json::from_slice(body)?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.naments.is_empty() {
            return Err(ApiError::BadRequest("naments must not be empty".to_owned()));
        }
        if self.frame_step == 0 {
            return Err(ApiError::BadRequest("frame_step must be >= 1".to_owned()));
        }
        if let Some(index) = self.naments.iter().position(|n| n.token.trim().is_empty()) {
            return Err(ApiError::BadRequest(format!(
                "naments[{index}] has an empty token"
            )));
        }
        Ok(())
    }
}

fn default_frame_step() -> u32 {
    DEFAULT_FRAME_STEP
}

// The companion app sends `naments` either as an array of `[timestamp, token]`
// pairs or as that array JSON-encoded into a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawNaments {
    Pairs(Vec<(RawTimestamp, String)>),
    Encoded(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Number(f64),
    Text(String),
}

impl RawTimestamp {
    fn to_seconds(&self) -> Result<f64, String> {
        let value = match self {
            RawTimestamp::Number(value) => *value,
            RawTimestamp::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("timestamp `{text}` is not a number"))?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("timestamp `{value}` is not finite"))
        }
    }
}

fn deserialize_naments<'de, D>(deserializer: D) -> Result<Vec<NamedEntity>, D::Error>
where
    D: Deserializer<'de>,
{
    let pairs = match RawNaments::deserialize(deserializer)? {
        RawNaments::Pairs(pairs) => pairs,
        RawNaments::Encoded(encoded) => {
            serde_json::from_str::<Vec<(RawTimestamp, String)>>(&encoded).map_err(|e| {
                de::Error::custom(format!("naments string is not a list of pairs: {e}"))
            })?
        }
    };

    pairs
        .into_iter()
        .map(|(timestamp, token)| {
            let timestamp = timestamp.to_seconds().map_err(de::Error::custom)?;
            Ok(NamedEntity { timestamp, token })
        })
        .collect()
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct JobCreated {
    pub job_id: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct JobStatusBody {
    pub status: JobStatus,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Message {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub detail: String,
}
