// Signed handshake URL for the chat socket
// HMAC-SHA256 over host, date and request line, passed as query parameters

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::SystemTime;
use url::Url;

use super::RewriteError;
use crate::config::ChatCredentials;

type HmacSha256 = Hmac<Sha256>;

/// Current time in the RFC 1123 form the signature covers
#[inline]
pub fn http_date_now() -> String {
    httpdate::fmt_http_date(SystemTime::now())
}

/// `host[:port]` exactly as it appears in the endpoint
fn authority(endpoint: &Url) -> Result<String, RewriteError> {
    let host = endpoint
        .host_str()
        .ok_or_else(|| RewriteError::Transport(format!("endpoint has no host: {endpoint}")))?;
    Ok(match endpoint.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Base64 HMAC-SHA256 of the canonical `host`/`date`/request-line string
#[inline]
pub fn signature(host: &str, date: &str, path: &str, secret: &str) -> Result<String, RewriteError> {
    let canonical = format!("host: {host}\ndate: {date}\nGET {path} HTTP/1.1");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| RewriteError::Protocol(format!("unusable api secret: {e}")))?;
    mac.update(canonical.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Endpoint with `authorization`, `date` and `host` query parameters added
#[inline]
pub fn signed_url(
    endpoint: &Url,
    credentials: &ChatCredentials,
    date: &str,
) -> Result<Url, RewriteError> {
    let host = authority(endpoint)?;
    let signature = signature(&host, date, endpoint.path(), &credentials.api_secret)?;
    let authorization = STANDARD.encode(format!(
        "api_key=\"{}\", algorithm=\"hmac-sha256\", headers=\"host date request-line\", signature=\"{}\"",
        credentials.api_key, signature
    ));

    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .clear()
        .append_pair("authorization", &authorization)
        .append_pair("date", date)
        .append_pair("host", &host);
    Ok(url)
}
