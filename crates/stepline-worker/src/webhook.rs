// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Terminal webhook delivery.
//!
//! Fired once per run when it transitions into SUCCEEDED or FAILED. Delivery
//! is at-least-once and bounded: three attempts with exponential sleeps, no
//! persisted queue. A worker crash mid-dispatch drops the remaining attempts;
//! receivers must tolerate duplicates either way.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use stepline_core::domain::RunStatus;
use stepline_core::metrics;

type HmacSha256 = Hmac<Sha256>;

const WEBHOOK_RETRY_ATTEMPTS: u32 = 3;
const WEBHOOK_RETRY_BASE: Duration = Duration::from_millis(300);
const WEBHOOK_HEADER_SIG: &str = "X-Signature";

/// Build the HTTP client used for webhook deliveries.
pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("webhook client construction cannot fail with static options")
}

/// Deliver the terminal notification for a run.
///
/// Blank URLs are a no-op. Non-2xx responses and transport errors are
/// retried; a shutdown signal aborts between attempts.
pub async fn deliver_terminal_webhook(
    client: &reqwest::Client,
    shutdown: &mut watch::Receiver<bool>,
    run_id: Uuid,
    status: RunStatus,
    finished_at: DateTime<Utc>,
    webhook_url: &str,
    webhook_secret: &str,
) {
    let webhook_url = webhook_url.trim();
    if webhook_url.is_empty() {
        return;
    }

    // Serialize once; the signature must cover the exact body bytes.
    let body = serde_json::json!({
        "run_id": run_id,
        "status": status,
        "finished_at": finished_at.to_rfc3339_opts(SecondsFormat::Micros, true),
    })
    .to_string();

    let signature = sign_payload(webhook_secret, body.as_bytes());

    let mut last_err: Option<String> = None;
    for attempt in 1..=WEBHOOK_RETRY_ATTEMPTS {
        let mut request = client
            .post(webhook_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.clone());
        if let Some(ref sig) = signature {
            request = request.header(WEBHOOK_HEADER_SIG, sig.clone());
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                info!(
                    run_id = %run_id,
                    status = %status,
                    attempt,
                    response_status = response.status().as_u16(),
                    "webhook success"
                );
                metrics::inc_webhook_delivery("delivered");
                return;
            }
            Ok(response) => {
                let code = response.status().as_u16();
                last_err = Some(format!("non-2xx response: {}", code));
                warn!(
                    run_id = %run_id,
                    status = %status,
                    attempt,
                    response_status = code,
                    "webhook failure"
                );
            }
            Err(e) => {
                last_err = Some(e.to_string());
                warn!(run_id = %run_id, status = %status, attempt, error = %e, "webhook failure");
            }
        }

        if attempt < WEBHOOK_RETRY_ATTEMPTS {
            let wait = WEBHOOK_RETRY_BASE * 2u32.pow(attempt - 1);
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender means the process is going away too.
                    if changed.is_err() || *shutdown.borrow() {
                        warn!(run_id = %run_id, status = %status, attempt, "webhook canceled before retry");
                        metrics::inc_webhook_delivery("canceled");
                        return;
                    }
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    if let Some(last_err) = last_err {
        error!(run_id = %run_id, status = %status, error = %last_err, "webhook retries exhausted");
        metrics::inc_webhook_delivery("exhausted");
    }
}

/// `hex(HMAC-SHA256(secret, payload))`, or `None` for a blank secret.
pub fn sign_payload(secret: &str, payload: &[u8]) -> Option<String> {
    if secret.trim().is_empty() {
        return None;
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_payload_blank_secret_is_none() {
        assert_eq!(sign_payload("", b"body"), None);
        assert_eq!(sign_payload("   ", b"body"), None);
    }

    #[test]
    fn test_sign_payload_known_vector() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?"
        let sig = sign_payload("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_signature_is_lowercase_hex() {
        let sig = sign_payload("secret", b"{}").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
