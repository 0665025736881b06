//! AK/SK request signing (SDK-HMAC-SHA256)

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

pub const ALGORITHM: &str = "SDK-HMAC-SHA256";
pub const HEADER_DATE: &str = "X-Sdk-Date";
pub const HEADER_SECURITY_TOKEN: &str = "X-Security-Token";
const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Access key pair, optionally with a temporary security token
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub security_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &mask(&self.access_key))
            .field("secret_key", &"****")
            .field("security_token", &self.security_token.as_ref().map(|_| "****"))
            .finish()
    }
}

fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

/// Headers to attach to a signed request
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub headers: Vec<(String, String)>,
}

/// Sign a request.
///
/// `headers` are the headers that will be sent (besides the ones added
/// here); all of them take part in the signature.
pub fn sign(
    credentials: &Credentials,
    method: &str,
    url: &Url,
    headers: &[(String, String)],
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<SignedRequest, SignError> {
    let date = now.format(DATE_FORMAT).to_string();

    let mut all_headers: Vec<(String, String)> = headers.to_vec();
    all_headers.push((HEADER_DATE.to_string(), date.clone()));
    if let Some(host) = host_header(url) {
        all_headers.push(("Host".to_string(), host));
    }
    if let Some(token) = &credentials.security_token {
        all_headers.push((HEADER_SECURITY_TOKEN.to_string(), token.clone()));
    }

    let canonical = canonical_request(method, url, &all_headers, body);
    let string_to_sign = string_to_sign(&date, &canonical);
    let signature = hmac_hex(&credentials.secret_key, &string_to_sign)?;

    let authorization = format!(
        "{} Access={}, SignedHeaders={}, Signature={}",
        ALGORITHM,
        credentials.access_key,
        signed_header_names(&all_headers),
        signature
    );

    let mut out: Vec<(String, String)> = all_headers
        .into_iter()
        .filter(|(name, _)| !headers.iter().any(|(h, _)| h.eq_ignore_ascii_case(name)))
        // reqwest derives Host from the URL
        .filter(|(name, _)| !name.eq_ignore_ascii_case("host"))
        .collect();
    out.push(("Authorization".to_string(), authorization));

    Ok(SignedRequest { headers: out })
}

fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Build the canonical request string
pub fn canonical_request(
    method: &str,
    url: &Url,
    headers: &[(String, String)],
    body: &[u8],
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method.to_uppercase(),
        canonical_uri(url),
        canonical_query(url),
        canonical_headers(headers),
        signed_header_names(headers),
        hex::encode(Sha256::digest(body))
    )
}

fn canonical_uri(url: &Url) -> String {
    let encoded: Vec<String> = url
        .path()
        .split('/')
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            urlencoding::encode(&decoded).into_owned()
        })
        .collect();
    let uri = encoded.join("/");
    if uri.ends_with('/') {
        uri
    } else {
        format!("{}/", uri)
    }
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            (
                urlencoding::encode(&k).into_owned(),
                urlencoding::encode(&v).into_owned(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn sorted_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    let mut lowered: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
        .collect();
    lowered.sort();
    lowered
}

fn canonical_headers(headers: &[(String, String)]) -> String {
    sorted_headers(headers)
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect()
}

fn signed_header_names(headers: &[(String, String)]) -> String {
    let mut names: Vec<String> = sorted_headers(headers).into_iter().map(|(k, _)| k).collect();
    names.dedup();
    names.join(";")
}

fn string_to_sign(date: &str, canonical: &str) -> String {
    format!(
        "{}\n{}\n{}",
        ALGORITHM,
        date,
        hex::encode(Sha256::digest(canonical.as_bytes()))
    )
}

fn hmac_hex(key: &str, data: &str) -> Result<String, SignError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map_err(|e| SignError::InvalidKey(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
    }

    fn creds() -> Credentials {
        Credentials {
            access_key: "AKTEST".to_string(),
            secret_key: "SKTEST".to_string(),
            security_token: None,
        }
    }

    #[test]
    fn canonical_request_layout() {
        let url = Url::parse(
            "https://workspace.cn-north-4.myhuaweicloud.com/v2/p1/desktops?offset=0&limit=100&name=a%20b",
        )
        .unwrap();
        let headers = vec![
            ("Content-Type".to_string(), " application/json ".to_string()),
            ("X-Sdk-Date".to_string(), "20240301T083000Z".to_string()),
            (
                "Host".to_string(),
                "workspace.cn-north-4.myhuaweicloud.com".to_string(),
            ),
        ];

        let canonical = canonical_request("get", &url, &headers, b"");
        let expected = format!(
            "GET\n/v2/p1/desktops/\nlimit=100&name=a%20b&offset=0\n\
             content-type:application/json\n\
             host:workspace.cn-north-4.myhuaweicloud.com\n\
             x-sdk-date:20240301T083000Z\n\n\
             content-type;host;x-sdk-date\n{}",
            EMPTY_SHA256
        );
        assert_eq!(canonical, expected);
    }

    #[test]
    fn known_signature_for_fixed_request() {
        let url = Url::parse(
            "https://workspace.cn-north-4.myhuaweicloud.com/v2/p1/workspaces?b=x%2Fy&a=1",
        )
        .unwrap();
        let headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        let body = br#"{"name":"w"}"#;

        let mut signed_headers = headers.clone();
        signed_headers.push(("X-Sdk-Date".to_string(), "20240301T083000Z".to_string()));
        signed_headers.push((
            "Host".to_string(),
            "workspace.cn-north-4.myhuaweicloud.com".to_string(),
        ));
        assert_eq!(
            canonical_request("POST", &url, &signed_headers, body),
            "POST\n/v2/p1/workspaces/\na=1&b=x%2Fy\n\
             content-type:application/json\n\
             host:workspace.cn-north-4.myhuaweicloud.com\n\
             x-sdk-date:20240301T083000Z\n\n\
             content-type;host;x-sdk-date\n\
             d97922556d1c28a67d85d0f64c72b06e626d9b5bcc136f66e7c1fef0ecc545f7"
        );

        let signed = sign(&creds(), "POST", &url, &headers, body, fixed_time()).unwrap();
        let (_, auth) = signed
            .headers
            .iter()
            .find(|(k, _)| k == "Authorization")
            .unwrap();
        assert_eq!(
            auth,
            "SDK-HMAC-SHA256 Access=AKTEST, SignedHeaders=content-type;host;x-sdk-date, \
             Signature=40835a27c4de762691c2f8ebd461bf81a6712f2f9c03037875da9ae6efdbe685"
        );
        assert!(signed
            .headers
            .contains(&("X-Sdk-Date".to_string(), "20240301T083000Z".to_string())));
    }

    #[test]
    fn empty_secret_still_signs() {
        assert_eq!(
            hmac_hex("", "data").unwrap(),
            "e528c4d99e6177f5841f712a143b90843299a4aa181a06501422d9ca862bd2a5"
        );
    }

    #[test]
    fn security_token_is_signed_and_sent() {
        let url = Url::parse("http://127.0.0.1:9000/v1/p1/app-servers").unwrap();
        let mut credentials = creds();
        credentials.security_token = Some("TOKEN".to_string());

        let signed = sign(&credentials, "GET", &url, &[], b"", fixed_time()).unwrap();
        let names: Vec<&str> = signed.headers.iter().map(|(k, _)| k.as_str()).collect();
        assert!(names.contains(&"X-Security-Token"));
        assert!(names.contains(&"X-Sdk-Date"));
        assert!(!names.contains(&"Host"));

        let auth = &signed.headers.last().unwrap().1;
        assert!(auth.contains("SignedHeaders=host;x-sdk-date;x-security-token"));
    }

    #[test]
    fn debug_output_masks_secrets() {
        let printed = format!("{:?}", creds());
        assert!(!printed.contains("SKTEST"));
    }

    #[test]
    fn masking_counts_characters() {
        assert_eq!(mask("AKTEST"), "******");
        assert_eq!(mask("ÄÖÜßABCDEFéèêë"), "ÄÖÜß...éèêë");
        assert_eq!(mask("日本語のキー"), "******");
    }
}
