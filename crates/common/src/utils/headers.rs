use http::{HeaderMap, HeaderName, HeaderValue};

use crate::protocol::HeaderList;

/// Headers that describe one connection leg rather than the message, plus the
/// framing headers each leg recomputes. They are never carried across the tunnel.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Whether a header must be dropped when a message crosses the tunnel
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Convert HTTP headers to the ordered envelope list
/// Values that are not valid UTF-8 are skipped
pub fn header_list_from_map(headers: &HeaderMap) -> HeaderList {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Convert the envelope list to an HTTP HeaderMap
/// Invalid names or values are skipped
pub fn header_list_to_map(list: &HeaderList) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in list.iter() {
        if let (Ok(header_name), Ok(header_value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(header_name, header_value);
        }
    }

    headers
}
