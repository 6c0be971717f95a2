//! Fire-and-forget flag alerts to an instructor-facing webhook.
//!
//! Delivery failures are logged and dropped; they never affect session state.
//! Retries, if any, belong to the receiving service.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use tracing::{info, instrument, warn};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagAlert {
  pub session_id: String,
  pub assignment_id: String,
  pub student_id: String,
  pub attempt_number: u32,
  pub reason: String,
}

#[derive(Clone)]
pub struct Notifier {
  pub client: reqwest::Client,
  pub webhook_url: String,
}

impl Notifier {
  /// Construct the notifier if VIVA_NOTIFY_WEBHOOK_URL is set; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let webhook_url = std::env::var("VIVA_NOTIFY_WEBHOOK_URL").ok()?;
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(10))
      .build()
      .ok()?;
    Some(Self { client, webhook_url })
  }

  #[instrument(level = "info", skip(self, alert), fields(session = %alert.session_id))]
  pub async fn send(&self, alert: &FlagAlert) -> Result<(), String> {
    let resp = self
      .client
      .post(&self.webhook_url)
      .header(CONTENT_TYPE, "application/json")
      .header(USER_AGENT, "viva-backend/0.1")
      .json(alert)
      .send()
      .await
      .map_err(|e| format!("webhook request failed: {e}"))?;
    let status = resp.status();
    if !status.is_success() {
      return Err(format!("webhook returned HTTP {status}"));
    }
    info!(target: "viva", %status, "Flag alert delivered");
    Ok(())
  }
}

/// Spawn delivery in the background. Without a notifier the alert is only logged.
pub fn dispatch(notifier: Option<&Notifier>, alert: FlagAlert) {
  match notifier {
    Some(n) => {
      let n = n.clone();
      tokio::spawn(async move {
        if let Err(e) = n.send(&alert).await {
          warn!(target: "viva", session = %alert.session_id, error = %e, "Flag alert not delivered");
        }
      });
    }
    None => {
      info!(target: "viva", session = %alert.session_id, reason = %alert.reason, "Session flagged (no notifier configured)");
    }
  }
}
