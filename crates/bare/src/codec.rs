//! Header envelope codec.
//!
//! Transports cap the size of individual header values, but the JSON blob of
//! logical headers can be arbitrarily long. The codec moves such a blob
//! through the transport in pieces:
//!
//! - **Encode** serialises the value to one string. If it exceeds the limit,
//!   the field is replaced by `{field}-0`, `{field}-1`, … each holding a chunk
//!   prefixed with `;`, prefix included in the limit.
//! - **Decode** collects the indexed chunks, checks the prefix and that the
//!   indices are contiguous from zero, and concatenates them by index before
//!   parsing. Chunk order on the wire is irrelevant.
//!
//! A transport that folds the indexed names away is not supported; as a
//! fallback, several plain occurrences of `{field}` are concatenated in
//! receipt order.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::{BareClientError, HeaderList, Result};

/// Marks a value as one chunk of a split field.
pub const CHUNK_PREFIX: char = ';';

fn chunk_name(field: &str, index: usize) -> String {
    format!("{field}-{index}")
}

fn chunk_index(field: &str, name: &str) -> Option<usize> {
    let suffix = name.strip_prefix(field)?.strip_prefix('-')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Splits `value` into pieces of at most `max_bytes` bytes on character
/// boundaries. A character wider than `max_bytes` gets a piece of its own, so
/// callers keep `max_bytes` at four or more.
fn chunks(value: &str, max_bytes: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (offset, ch) in value.char_indices() {
        let end = offset + ch.len_utf8();
        if end - start > max_bytes && offset > start {
            pieces.push(&value[start..offset]);
            start = offset;
        }
    }
    if start < value.len() {
        pieces.push(&value[start..]);
    }
    pieces
}

/// Splits `field` into indexed chunks if its value is longer than `max_len`.
///
/// Fields at or under the limit are left untouched.
pub fn split_field(headers: &mut HeaderList, field: &str, max_len: usize) {
    let Some(value) = headers.get(field).map(str::to_string) else {
        return;
    };
    if value.len() <= max_len {
        return;
    }

    headers.remove(field);
    let budget = max_len.saturating_sub(CHUNK_PREFIX.len_utf8()).max(1);
    let pieces = chunks(&value, budget);
    debug!(field, len = value.len(), chunks = pieces.len(), "splitting oversized envelope field");
    for (index, piece) in pieces.into_iter().enumerate() {
        headers.append(&chunk_name(field, index), format!("{CHUNK_PREFIX}{piece}"));
    }
}

/// Returns the logical value of `field`, reassembling chunks if present.
pub fn joined_value(headers: &HeaderList, field: &str) -> Result<Option<String>> {
    let mut indexed: Vec<(usize, &str)> = headers
        .iter()
        .filter_map(|(name, value)| chunk_index(field, name).map(|i| (i, value)))
        .collect();

    if indexed.is_empty() {
        let plain: Vec<&str> = headers.get_all(field).collect();
        return Ok(if plain.is_empty() {
            None
        } else {
            Some(plain.concat())
        });
    }

    indexed.sort_by_key(|(i, _)| *i);
    let mut joined = String::new();
    for (expected, (index, value)) in indexed.into_iter().enumerate() {
        if index != expected {
            return Err(BareClientError::malformed(
                field,
                format!("chunk {expected} is missing or duplicated"),
            ));
        }
        let piece = value.strip_prefix(CHUNK_PREFIX).ok_or_else(|| {
            BareClientError::malformed(field, format!("chunk {index} does not begin with ';'"))
        })?;
        joined.push_str(piece);
    }
    Ok(Some(joined))
}

/// Replaces indexed chunks of `field` with a single reassembled field.
pub fn join_field(headers: &mut HeaderList, field: &str) -> Result<()> {
    let Some(joined) = joined_value(headers, field)? else {
        return Ok(());
    };
    headers.retain(|name, _| chunk_index(field, name).is_none());
    headers.set(field, joined);
    Ok(())
}

/// Serialises `value` as JSON into `field`, splitting it when `max_len` is
/// given and exceeded.
pub fn encode_json<T: Serialize + ?Sized>(
    headers: &mut HeaderList,
    field: &str,
    value: &T,
    max_len: Option<usize>,
) -> Result<()> {
    let json = serde_json::to_string(value)
        .map_err(|e| BareClientError::malformed(field, format!("cannot serialise: {e}")))?;
    headers.set(field, json);
    if let Some(max_len) = max_len {
        split_field(headers, field, max_len);
    }
    Ok(())
}

/// Reassembles and parses the JSON value of `field`.
///
/// Returns `Ok(None)` if the field is absent and `MalformedEnvelope` if the
/// reassembled text is not valid JSON for `T`.
pub fn decode_json<T: DeserializeOwned>(headers: &HeaderList, field: &str) -> Result<Option<T>> {
    match joined_value(headers, field)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| BareClientError::malformed(field, e)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BareHeaders;

    const FIELD: &str = "x-bare-headers";

    #[test]
    fn short_values_stay_in_one_field() {
        let mut headers = HeaderList::new();
        headers.set(FIELD, "{}");
        split_field(&mut headers, FIELD, 16);
        assert_eq!(headers.get(FIELD), Some("{}"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn long_values_split_into_prefixed_chunks_within_limit() {
        let mut headers = HeaderList::new();
        headers.set(FIELD, "abcdefghij");
        split_field(&mut headers, FIELD, 4);

        assert!(!headers.contains(FIELD));
        let fields: Vec<_> = headers.iter().collect();
        assert_eq!(
            fields,
            [
                ("x-bare-headers-0", ";abc"),
                ("x-bare-headers-1", ";def"),
                ("x-bare-headers-2", ";ghi"),
                ("x-bare-headers-3", ";j"),
            ]
        );
        assert!(headers.iter().all(|(_, v)| v.len() <= 4));
    }

    #[test]
    fn chunks_never_cut_a_character() {
        let pieces = chunks("aéb€c", 2);
        assert_eq!(pieces.concat(), "aéb€c");
        assert!(pieces.iter().all(|p| !p.is_empty()));
    }

    #[test]
    fn reordered_chunks_still_decode() {
        let headers: HeaderList = [
            ("x-bare-headers-1", ";\"b\":\"2\"}"),
            ("x-bare-status", "200"),
            ("x-bare-headers-0", ";{\"a\":\"1\","),
        ]
        .into_iter()
        .collect();

        let decoded: BareHeaders = decode_json(&headers, FIELD).unwrap().unwrap();
        assert_eq!(decoded.get_first("a"), Some("1"));
        assert_eq!(decoded.get_first("b"), Some("2"));
    }

    #[test]
    fn missing_prefix_is_malformed() {
        let headers: HeaderList = [("x-bare-headers-0", "{}")].into_iter().collect();
        let err = joined_value(&headers, FIELD).unwrap_err();
        assert!(matches!(err, BareClientError::MalformedEnvelope(_)));
    }

    #[test]
    fn index_gap_is_malformed() {
        let headers: HeaderList = [("x-bare-headers-0", ";{"), ("x-bare-headers-2", ";}")]
            .into_iter()
            .collect();
        assert!(matches!(
            joined_value(&headers, FIELD),
            Err(BareClientError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn repeated_plain_fields_concatenate_in_receipt_order() {
        let headers: HeaderList = [(FIELD, "{\"a\":"), (FIELD, "\"1\"}")].into_iter().collect();
        let decoded: BareHeaders = decode_json(&headers, FIELD).unwrap().unwrap();
        assert_eq!(decoded.get_first("a"), Some("1"));
    }

    #[test]
    fn invalid_json_after_join_is_malformed() {
        let headers: HeaderList = [("x-bare-headers-0", ";{\"a\":")].into_iter().collect();
        let err = decode_json::<BareHeaders>(&headers, FIELD).unwrap_err();
        assert!(matches!(err, BareClientError::MalformedEnvelope(_)));
    }

    #[test]
    fn join_field_collapses_chunks() {
        let mut headers: HeaderList = [("x-bare-headers-0", ";{}"), ("x-bare-status", "200")]
            .into_iter()
            .collect();
        join_field(&mut headers, FIELD).unwrap();
        assert_eq!(headers.get(FIELD), Some("{}"));
        assert!(!headers.contains("x-bare-headers-0"));
        assert_eq!(headers.get("x-bare-status"), Some("200"));
    }

    #[test]
    fn unrelated_suffixes_are_not_chunks() {
        assert_eq!(chunk_index(FIELD, "x-bare-headers-12"), Some(12));
        assert_eq!(chunk_index(FIELD, "x-bare-headers-extra"), None);
        assert_eq!(chunk_index(FIELD, "x-bare-headers-"), None);
        assert_eq!(chunk_index(FIELD, "x-bare-headers"), None);
    }
}
