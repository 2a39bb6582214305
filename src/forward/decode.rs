//! Upstream body decoding.

use std::io::Read;

use axum::http::header::CONTENT_ENCODING;
use axum::http::HeaderMap;
use bytes::Bytes;
use flate2::read::MultiGzDecoder;

/// Whether the headers announce a gzip body.
pub fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("gzip"))
}

/// Decode a fully buffered upstream body.
///
/// gzip is inflated; any other (or no) encoding is passed through as-is.
pub fn decode_body(headers: &HeaderMap, raw: &Bytes) -> std::io::Result<Bytes> {
    if !is_gzip(headers) {
        return Ok(raw.clone());
    }
    let mut decoded = Vec::with_capacity(raw.len() * 4);
    MultiGzDecoder::new(raw.as_ref()).read_to_end(&mut decoded)?;
    Ok(Bytes::from(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(text: &str) -> Bytes {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    #[test]
    fn gzip_is_inflated() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));

        let decoded = decode_body(&headers, &gzip("{\"currentVersion\":10.91}")).unwrap();
        assert_eq!(decoded, "{\"currentVersion\":10.91}");
    }

    #[test]
    fn missing_encoding_passes_through() {
        let raw = Bytes::from_static(b"\x1f\x8bnot really");
        assert_eq!(decode_body(&HeaderMap::new(), &raw).unwrap(), raw);
    }

    #[test]
    fn other_encodings_pass_through() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("br"));
        let raw = Bytes::from_static(b"opaque");
        assert_eq!(decode_body(&headers, &raw).unwrap(), raw);
    }

    #[test]
    fn corrupt_gzip_is_an_error() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("x-gzip"));
        assert!(decode_body(&headers, &Bytes::from_static(b"plain text")).is_err());
    }
}
