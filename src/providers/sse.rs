use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::types::{now_ms, PriceFrame, RawSseFrame};

static PARSE_FAILURES: AtomicU64 = AtomicU64::new(0);

/// One HTTPS streaming connection per address. Lines are buffered until a
/// newline; only lines starting `data:` carry a frame, everything else
/// (comments, keep-alives, blank lines) is ignored.
pub struct SseClient {
    http: reqwest::Client,
    base_url: String,
}

impl SseClient {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(0)) // streaming: no overall timeout, only connect timeout below
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build SSE HTTP client");
        Self { http, base_url }
    }

    pub async fn open_sse(&self, address: &str) -> Result<mpsc::Receiver<PriceFrame>> {
        let url = format!("{}/{}", self.base_url, address);
        let resp = self.http.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(AppError::Http(resp.error_for_status().unwrap_err()));
        }

        let (tx, rx) = mpsc::channel(64);
        let address = address.to_string();
        tokio::spawn(async move {
            stream_frames(resp, address, tx).await;
        });
        Ok(rx)
    }
}

async fn stream_frames(resp: reqwest::Response, address: String, tx: mpsc::Sender<PriceFrame>) {
    let mut stream = resp.bytes_stream();
    let mut buf = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                debug!(address = %address, "SSE stream error: {e}");
                return;
            }
        };
        buf.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buf.find('\n') {
            let line = buf[..pos].trim_end_matches('\r').to_string();
            buf.drain(..=pos);
            if let Some(frame) = parse_line(&line) {
                if tx.send(frame).await.is_err() {
                    return; // receiver dropped — connection no longer wanted
                }
            }
        }
    }
}

fn parse_line(line: &str) -> Option<PriceFrame> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    match serde_json::from_str::<RawSseFrame>(payload) {
        Ok(raw) => Some(PriceFrame {
            address: raw.a,
            price: raw.p,
            price_timestamp_ms: raw.t_p.unwrap_or_else(now_ms),
        }),
        Err(_) => {
            let count = PARSE_FAILURES.fetch_add(1, Ordering::Relaxed) + 1;
            if count <= 10 || count % 1000 == 0 {
                warn!(count, "SSE frame parse failure: {}", &payload[..80.min(payload.len())]);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_line() {
        let line = r#"data: {"a":"0xabc","c":"solana","p":1.23,"t":1700000000,"t_p":1700000001000}"#;
        let frame = parse_line(line).expect("should parse");
        assert_eq!(frame.address, "0xabc");
        assert!((frame.price - 1.23).abs() < 1e-9);
        assert_eq!(frame.price_timestamp_ms, 1700000001000);
    }

    #[test]
    fn non_data_lines_are_skipped() {
        assert!(parse_line(": keep-alive").is_none());
        assert!(parse_line("").is_none());
        assert!(parse_line("event: ping").is_none());
    }

    #[test]
    fn malformed_json_is_silently_skipped() {
        assert!(parse_line("data: {not json}").is_none());
    }
}
