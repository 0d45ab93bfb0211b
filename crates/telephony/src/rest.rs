//! Provider REST client
//!
//! Call-control surface: hangup and live-call TwiML updates for transfers.
//! One client per call session, built from the account credentials the
//! configuration service returns, and cached on the session for the call's
//! lifetime.

use crate::TelephonyError;

const API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Clone)]
pub struct TwilioClient {
    account_sid: String,
    auth_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl TwilioClient {
    pub fn new(account_sid: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            base_url: API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at a different API host (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn call_url(&self, call_sid: &str) -> String {
        format!(
            "{}/Accounts/{}/Calls/{}.json",
            self.base_url, self.account_sid, call_sid
        )
    }

    /// Hang the call up.
    pub async fn complete_call(&self, call_sid: &str) -> Result<(), TelephonyError> {
        self.update(call_sid, &[("Status", "completed")]).await
    }

    /// Redirect the live call to new TwiML (transfers).
    pub async fn update_call_twiml(
        &self,
        call_sid: &str,
        twiml: &str,
    ) -> Result<(), TelephonyError> {
        self.update(call_sid, &[("Twiml", twiml)]).await
    }

    /// Redirect the live call to a webhook URL that serves TwiML.
    pub async fn update_call_url(&self, call_sid: &str, url: &str) -> Result<(), TelephonyError> {
        self.update(call_sid, &[("Url", url), ("Method", "POST")])
            .await
    }

    async fn update(&self, call_sid: &str, form: &[(&str, &str)]) -> Result<(), TelephonyError> {
        let response = self
            .client
            .post(self.call_url(call_sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_url_shape() {
        let client = TwilioClient::new("AC123", "token");
        assert_eq!(
            client.call_url("CA456"),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls/CA456.json"
        );
    }
}
