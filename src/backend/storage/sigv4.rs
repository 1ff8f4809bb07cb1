//! AWS Signature Version 4 request signing.
//!
//! Implements the canonical-request / string-to-sign / derived-key scheme
//! used to authenticate requests against S3-compatible object storage.
//! Only header-based signing is needed here (no presigned URLs).

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encode a string per the SigV4 rules: unreserved characters
/// (`A-Z a-z 0-9 - . _ ~`) stay, everything else becomes `%XX`. Forward
/// slashes are kept verbatim in URI paths (`encode_slash = false`).
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Derive the signing key for `date` (`YYYYMMDD`), region and service.
pub fn signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Canonical request text plus the semicolon-joined signed-header list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub text: String,
    pub signed_headers: String,
}

/// Build the canonical request. Header names must already be lowercase and
/// values trimmed; the function sorts them.
pub fn canonical_request(
    method: &str,
    canonical_uri: &str,
    canonical_query: &str,
    headers: &[(String, String)],
    payload_hash: &str,
) -> CanonicalRequest {
    let mut sorted: Vec<&(String, String)> = headers.iter().collect();
    sorted.sort();

    let signed_headers = sorted
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_headers: String = sorted
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    let text = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method, canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
    );

    CanonicalRequest {
        text,
        signed_headers,
    }
}

/// Build the string to sign from the request timestamp (`YYYYMMDDTHHMMSSZ`),
/// credential scope and canonical request.
pub fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    )
}

/// Final hex signature over the string to sign.
pub fn signature(signing_key: &[u8], string_to_sign: &str) -> String {
    hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes()))
}

/// Assemble the `Authorization` header value.
pub fn authorization_header(
    access_key: &str,
    scope: &str,
    signed_headers: &str,
    signature: &str,
) -> String {
    format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        access_key, scope, signed_headers, signature
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("abc-123_~.ok", true), "abc-123_~.ok");
        assert_eq!(uri_encode("a b", true), "a%20b");
        assert_eq!(uri_encode("chats/images/a.png", false), "chats/images/a.png");
        assert_eq!(uri_encode("chats/images/a.png", true), "chats%2Fimages%2Fa.png");
        assert_eq!(uri_encode("résumé", true), "r%C3%A9sum%C3%A9");
    }

    #[test]
    fn test_signing_key_derivation() {
        // Documented AWS example: secret key, 20150830, us-east-1, iam.
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20150830",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn test_canonical_request_layout() {
        let headers = vec![
            ("x-amz-date".to_string(), "20250801T000000Z".to_string()),
            ("host".to_string(), "bucket.s3.us-east-1.amazonaws.com".to_string()),
            ("x-amz-content-sha256".to_string(), "abc123".to_string()),
        ];
        let canonical = canonical_request("PUT", "/payments/images/r.png", "", &headers, "abc123");

        assert_eq!(
            canonical.signed_headers,
            "host;x-amz-content-sha256;x-amz-date"
        );
        let lines: Vec<&str> = canonical.text.split('\n').collect();
        assert_eq!(lines[0], "PUT");
        assert_eq!(lines[1], "/payments/images/r.png");
        assert_eq!(lines[2], "");
        // Headers come sorted, one per line, then a blank separator line.
        assert_eq!(lines[3], "host:bucket.s3.us-east-1.amazonaws.com");
        assert_eq!(lines[4], "x-amz-content-sha256:abc123");
        assert_eq!(lines[5], "x-amz-date:20250801T000000Z");
        assert_eq!(lines[6], "");
        assert_eq!(lines[7], "host;x-amz-content-sha256;x-amz-date");
        assert_eq!(lines[8], "abc123");
    }

    #[test]
    fn test_string_to_sign_layout() {
        let sts = string_to_sign(
            "20250801T000000Z",
            "20250801/us-east-1/s3/aws4_request",
            "canonical",
        );
        let lines: Vec<&str> = sts.split('\n').collect();
        assert_eq!(lines[0], "AWS4-HMAC-SHA256");
        assert_eq!(lines[1], "20250801T000000Z");
        assert_eq!(lines[2], "20250801/us-east-1/s3/aws4_request");
        assert_eq!(lines[3], sha256_hex(b"canonical"));
    }

    #[test]
    fn test_signature_is_hex() {
        let key = signing_key("secret", "20250801", "us-east-1", "s3");
        let sig = signature(&key, "string to sign");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
