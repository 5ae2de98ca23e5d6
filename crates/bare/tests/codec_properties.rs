use bare::codec::{decode_json, encode_json};
use bare::config::MIN_HEADER_VALUE_LEN;
use bare::{BareHeaderValue, BareHeaders, HeaderList};
use proptest::prelude::*;

const FIELD: &str = "x-bare-headers";

fn header_map() -> impl Strategy<Value = BareHeaders> {
    let value = prop_oneof![
        "[ -~]{0,60}".prop_map(BareHeaderValue::Single),
        "[a-zé€𝄞 ]{0,30}".prop_map(BareHeaderValue::Single),
        prop::collection::vec("[ -~]{0,20}", 0..4).prop_map(BareHeaderValue::Multiple),
    ];
    prop::collection::vec(("[A-Za-z][A-Za-z0-9-]{0,15}", value), 1..24).prop_map(|entries| {
        let mut headers = BareHeaders::new();
        for (name, value) in entries {
            headers.set(&name, value);
        }
        headers
    })
}

// ── Chunked round trip is lossless and order-preserving ───────────────────

proptest! {
    #[test]
    fn chunked_round_trip_is_lossless(headers in header_map(), limit in MIN_HEADER_VALUE_LEN..64) {
        let mut envelope = HeaderList::new();
        encode_json(&mut envelope, FIELD, &headers, Some(limit)).unwrap();

        prop_assert!(envelope.iter().all(|(_, v)| v.len() <= limit));

        let decoded: BareHeaders = decode_json(&envelope, FIELD).unwrap().unwrap();
        prop_assert_eq!(decoded, headers);
    }

    #[test]
    fn reversed_chunks_decode_identically(headers in header_map(), limit in 8usize..48) {
        let mut envelope = HeaderList::new();
        encode_json(&mut envelope, FIELD, &headers, Some(limit)).unwrap();

        let mut fields: Vec<(String, String)> = envelope
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect();
        fields.reverse();
        let reversed: HeaderList = fields.into_iter().collect();

        let decoded: BareHeaders = decode_json(&reversed, FIELD).unwrap().unwrap();
        prop_assert_eq!(decoded, headers);
    }
}

// ── Wide characters never push a chunk over the smallest limit ───────────

#[test]
fn four_byte_characters_fit_the_minimum_limit() {
    let mut headers = BareHeaders::new();
    headers.set("X-Clef", "𝄞é€".repeat(8));

    let mut envelope = HeaderList::new();
    encode_json(&mut envelope, FIELD, &headers, Some(MIN_HEADER_VALUE_LEN)).unwrap();

    assert!(envelope
        .iter()
        .all(|(_, v)| v.len() <= MIN_HEADER_VALUE_LEN && v.starts_with(';')));
    let decoded: BareHeaders = decode_json(&envelope, FIELD).unwrap().unwrap();
    assert_eq!(decoded, headers);
}

// ── Serialised blobs over the default limit are always chunked ────────────

#[test]
fn default_limit_splits_large_header_blob() {
    let mut headers = BareHeaders::new();
    for i in 0..200 {
        headers.set(&format!("X-Custom-{i}"), "v".repeat(32));
    }

    let mut envelope = HeaderList::new();
    encode_json(&mut envelope, FIELD, &headers, Some(3072)).unwrap();

    assert!(!envelope.contains(FIELD));
    assert!(envelope.len() > 1);
    assert!(envelope.iter().all(|(_, v)| v.len() <= 3072 && v.starts_with(';')));

    let decoded: BareHeaders = decode_json(&envelope, FIELD).unwrap().unwrap();
    assert_eq!(decoded, headers);
}
