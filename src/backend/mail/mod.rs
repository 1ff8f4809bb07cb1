//! Outbound mail over SMTP.
//!
//! Currently carries a single message kind: the password-reset OTP. The
//! transport is built once at startup from the SMTP environment variables;
//! when they are absent the server runs with mail disabled.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::backend::auth::otp::OTP_TTL_MINUTES;
use crate::backend::server::config::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// SMTP mailer
#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl Mailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }

    /// Send the password-reset OTP to `to`.
    pub async fn send_reset_otp(&self, to: &str, otp: &str) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(to.parse()?)
            .subject("Your Password Reset OTP")
            .header(ContentType::TEXT_HTML)
            .body(reset_otp_html(otp))?;

        self.transport.send(message).await?;
        tracing::info!("reset OTP email sent to {}", to);
        Ok(())
    }
}

/// HTML body for the password-reset OTP email.
fn reset_otp_html(otp: &str) -> String {
    format!(
        r#"<div style="font-family:Arial,sans-serif;background:#f5f7fa;padding:30px 0;">
  <div style="max-width:500px;margin:auto;background:#ffffff;border-radius:12px;overflow:hidden;">
    <div style="background:#0a1f44;padding:18px;text-align:center;">
      <h2 style="color:#fff;margin:0;font-size:22px;">Branchtalk</h2>
    </div>
    <div style="padding:26px 32px;color:#333;">
      <h3 style="color:#0a1f44;margin-bottom:8px;font-size:18px;">Password Reset Request</h3>
      <p style="font-size:15px;line-height:1.6;color:#444;">
        We received a request to reset your account password. Use the OTP below
        to continue.
      </p>
      <div style="text-align:center;margin:20px auto;font-size:25px;font-weight:600;color:#0a1f44;">{otp}</div>
      <p style="font-size:14px;color:#222;">
        This OTP is valid for <b>{minutes} minutes</b>. Do not share it with anyone.
      </p>
      <p style="font-size:13px;color:#555;">
        If you did not request a password reset, you can ignore this email.
      </p>
    </div>
  </div>
</div>"#,
        otp = otp,
        minutes = OTP_TTL_MINUTES,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_template_contains_otp_and_validity() {
        let html = reset_otp_html("482913");
        assert!(html.contains("482913"));
        assert!(html.contains("10 minutes"));
        assert!(html.contains("Password Reset Request"));
    }
}
