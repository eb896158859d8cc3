//! HTTP ledger
//!
//! POSTs hits to `{base}/hits` and round results to `{base}/rounds` as JSON.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{HitReceipt, HitRecorder, HitRequest, LedgerError, RoundRecord, RoundStore};

pub struct HttpLedger {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct Submission<'a, T> {
    #[serde(flatten)]
    body: &'a T,
    submitted_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct SaveResponse {
    session_id: String,
}

impl HttpLedger {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, LedgerError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&Submission {
                body,
                submitted_at: Utc::now(),
            })
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Ledger error: {} - {}", status, body);
            return Err(LedgerError::Rejected(format!("{} - {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| LedgerError::Transport(format!("Failed to parse response: {}", e)))
    }
}

impl HitRecorder for HttpLedger {
    async fn record_hit(&self, request: HitRequest) -> Result<HitReceipt, LedgerError> {
        self.post("hits", &request).await
    }
}

impl RoundStore for HttpLedger {
    async fn save_round(&self, record: RoundRecord) -> Result<String, LedgerError> {
        let response: SaveResponse = self.post("rounds", &record).await?;
        Ok(response.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let ledger = HttpLedger::new("http://localhost:8080/");
        assert_eq!(ledger.base_url, "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_transport_error() {
        let ledger = HttpLedger::new("http://127.0.0.1:9");
        let result = ledger
            .record_hit(HitRequest {
                participant_address: "0x1".into(),
                points: 10,
            })
            .await;
        assert!(matches!(result, Err(LedgerError::Transport(_))));
    }
}
