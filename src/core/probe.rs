//! Resource probing for pan-dl
//!
//! Learns the total length and a filename for a URL before any content is
//! fetched, and catches error payloads that some servers return with a
//! success status.

use std::path::Path;

use futures::StreamExt;
use log::{debug, info};
use percent_encoding::percent_decode_str;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_LENGTH, COOKIE};
use reqwest::{Client, Response, Url};
use serde::Deserialize;

use crate::core::error::{Error, Result};

/// Bodies smaller than this may be an error payload in disguise
pub const SMALL_BODY_THRESHOLD: u64 = 200;

/// Upper bound on how much of a suspicious body is read
const MAX_SNIFF_BYTES: usize = 64 * 1024;

/// Name used when neither the headers nor the URL provide one
pub const FALLBACK_FILENAME: &str = "download.bin";

/// Metadata learned from the probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    pub total_length: u64,
    pub filename: String,
}

/// Structured error body, e.g. `{"error_code":110,"error_msg":"bad cookie"}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorPayload {
    #[serde(alias = "errno")]
    pub error_code: i64,
    #[serde(default, alias = "errmsg")]
    pub error_msg: String,
}

/// Issue the HEAD probe and resolve length and filename
pub async fn probe(client: &Client, url: &Url, cookie: Option<&str>) -> Result<ProbeInfo> {
    let response = with_cookie(client.head(url.clone()), cookie).send().await?;
    let status = response.status();
    let headers = response.headers().clone();
    let announced = parse_content_length(&headers).ok();
    debug!("HEAD {url} -> {status}, length {announced:?}");

    let suspicious = !status.is_success() || announced.is_some_and(|len| len < SMALL_BODY_THRESHOLD);
    if suspicious {
        let get = with_cookie(client.get(url.clone()), cookie).send().await?;
        let get_status = get.status();
        let body = read_capped(get, MAX_SNIFF_BYTES).await?;

        if let Some(payload) = sniff_error_payload(&body) {
            if payload.error_code != 0 {
                return Err(Error::RemoteError(payload.error_msg));
            }
        }
        if !status.is_success() {
            let text = String::from_utf8_lossy(&body).trim().to_string();
            return Err(Error::RemoteError(if text.is_empty() {
                format!("probe failed: {get_status}")
            } else {
                text
            }));
        }
    }

    let total_length = parse_content_length(&headers)?;
    let filename = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition)
        .map(|name| sanitize_filename(&name))
        .unwrap_or_else(|| filename_from_url(url));

    info!("Probed {url}: {total_length} bytes, filename {filename}");
    Ok(ProbeInfo {
        total_length,
        filename,
    })
}

pub(crate) fn with_cookie(request: reqwest::RequestBuilder, cookie: Option<&str>) -> reqwest::RequestBuilder {
    match cookie {
        Some(cookie) => request.header(COOKIE, cookie),
        None => request,
    }
}

/// Read at most `limit` bytes of a response body
async fn read_capped(response: Response, limit: usize) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let room = limit - body.len();
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() >= limit {
            break;
        }
    }
    Ok(body)
}

/// Total length from `Content-Length`
pub fn parse_content_length(headers: &HeaderMap) -> Result<u64> {
    let value = headers
        .get(CONTENT_LENGTH)
        .ok_or_else(|| Error::ProtocolError("response has no Content-Length".to_string()))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| Error::ProtocolError(format!("unparseable Content-Length: {value:?}")))
}

/// Try to decode a body as a structured error object
pub fn sniff_error_payload(body: &[u8]) -> Option<ErrorPayload> {
    serde_json::from_slice(body).ok()
}

/// Extract the filename parameter of a `Content-Disposition` value.
///
/// `filename*=` (RFC 5987) takes precedence over `filename=`.
pub fn filename_from_disposition(disposition: &str) -> Option<String> {
    let lower = disposition.to_ascii_lowercase();

    if let Some(i) = lower.find("filename*=") {
        let value = parameter_value(&disposition[i + "filename*=".len()..]);
        let encoded = match value.find("''") {
            Some(pos) => &value[pos + 2..],
            None => value,
        };
        if let Ok(decoded) = percent_decode_str(encoded).decode_utf8() {
            let decoded = decoded.trim();
            if !decoded.is_empty() {
                return Some(decoded.to_string());
            }
        }
    }

    if let Some(i) = lower.find("filename=") {
        let value = parameter_value(&disposition[i + "filename=".len()..]);
        let value = value.trim_matches('\'').trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

fn parameter_value(rest: &str) -> &str {
    let rest = rest.trim_start();
    if let Some(quoted) = rest.strip_prefix('"') {
        return quoted.split('"').next().unwrap_or(quoted).trim();
    }
    rest.split(';').next().unwrap_or(rest).trim()
}

/// Last path segment of the URL, percent-decoded; the query is never included
pub fn filename_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    sanitize_filename(&decoded)
}

/// Reduce a suggested name to a bare file name in the destination directory
pub fn sanitize_filename(name: &str) -> String {
    let name = name.replace('\\', "/");
    match Path::new(&name).file_name().and_then(|s| s.to_str()) {
        Some(base) if !base.is_empty() && base != "." && base != ".." => base.to_string(),
        _ => FALLBACK_FILENAME.to_string(),
    }
}
