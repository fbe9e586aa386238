use chrono::{DateTime, Utc};
use data_encoding::BASE32_NOPAD;

/// Data source of records created through the API.
pub const SYSTEM_DATA_SOURCE: &str = "system";

/// `<namespace>:<base32 millisecond timestamp>`.
///
/// The timestamp is packed as a big-endian u64 with leading zero bytes
/// stripped, base32 encoded without padding and lowercased.
pub fn generate_id(namespace: &str, at: DateTime<Utc>) -> String {
    let millis = at.timestamp_millis().max(0) as u64;
    let bytes = millis.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let postfix = BASE32_NOPAD.encode(&bytes[first..]).to_ascii_lowercase();
    format!("{namespace}:{postfix}")
}
