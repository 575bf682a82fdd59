//! The raw bencoded KRPC dictionary shape (spec §4.1). `serde_bencode`
//! serializes this directly; [`super::message::Message`] translates to and
//! from a friendlier enum on top of it.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryArgs {
    pub id: ByteBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_port: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<ByteBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseBody {
    pub id: ByteBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<ByteBuf>,
    #[serde(rename = "nodes6", skip_serializing_if = "Option::is_none")]
    pub nodes6: Option<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<ByteBuf>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<ByteBuf>,
}

/// One on-the-wire KRPC dictionary. Exactly one of `query_method`+`args`,
/// `response`, or `error` is populated, selected by `message_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "t")]
    pub transaction_id: ByteBuf,
    #[serde(rename = "y")]
    pub message_type: String,
    #[serde(rename = "q", skip_serializing_if = "Option::is_none")]
    pub query_method: Option<String>,
    #[serde(rename = "a", skip_serializing_if = "Option::is_none")]
    pub args: Option<QueryArgs>,
    #[serde(rename = "r", skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseBody>,
    #[serde(rename = "e", skip_serializing_if = "Option::is_none")]
    pub error: Option<(i64, String)>,
}
