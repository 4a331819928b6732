//! License delivery email via Postmark.
//!
//! Delivery is a best-effort side channel: callers go through
//! `tasks::best_effort` and issuance never depends on the send
//! succeeding. When Postmark is not configured the send is skipped with
//! a log line.

use reqwest::Client;
use serde::Serialize;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::LicenseRecord;

const POSTMARK_API_URL: &str = "https://api.postmarkapp.com/email";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    text_body: String,
    reply_to: &'a str,
}

#[derive(Clone)]
pub struct EmailService {
    api_key: Option<String>,
    mail_from: Option<String>,
    support_email: Option<String>,
    http_client: Client,
}

impl EmailService {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.postmark_api_key.clone(),
            mail_from: config.mail_from.clone(),
            support_email: config.support_email.clone(),
            http_client: Client::new(),
        }
    }

    /// Send the license block to the buyer.
    pub async fn send_license(&self, record: &LicenseRecord) -> Result<()> {
        let (Some(api_key), Some(mail_from)) = (self.api_key.as_deref(), self.mail_from.as_deref())
        else {
            tracing::warn!("POSTMARK_API_KEY or MAIL_FROM not set, skipping license email");
            return Ok(());
        };
        let support_email = self.support_email.as_deref().unwrap_or(mail_from);

        let subject = format!("Your fedDSP license for {}", record.product_code);
        let text_body = format!(
            "Hi {name},\n\n\
             Thanks for your purchase! Here's your license for {product}:\n\n\
             {artifact}\n\n\
             How to activate:\n\
             1) Open the {product} plugin.\n\
             2) Press the I button on the menu bar: this opens the Information panel\n\
             3) Press the license button and paste your license code, including the BEGIN and END lines\n\n\
             Order: {license_id}\n\
             Issued to: {email}\n\
             Issued at: {issued_at} UTC\n\n\
             Need help? Contact {support}.\n\n\
             Thanks, fedDSP",
            name = record.buyer_name,
            product = record.product_code,
            artifact = record.license_artifact,
            license_id = record.license_id,
            email = record.buyer_email,
            issued_at = record.issued_at,
            support = support_email,
        );

        let request = PostmarkEmailRequest {
            from: mail_from,
            to: &record.buyer_email,
            subject,
            text_body,
            reply_to: support_email,
        };

        let response = self
            .http_client
            .post(POSTMARK_API_URL)
            .header("X-Postmark-Server-Token", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Postmark request failed: {e}")))?;

        if response.status().is_success() {
            tracing::info!(
                to = %record.buyer_email,
                license_id = %record.license_id,
                "license email sent"
            );
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(AppError::Internal(format!(
                "Postmark error: {status} - {body}"
            )))
        }
    }
}
