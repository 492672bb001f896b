use crate::config::MailConfig;
use crate::error::{AppError, Result};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};

/// Sends survey links over SMTP with implicit TLS.
#[derive(Clone)]
pub struct Mailer {
    smtp: SmtpTransport,
    from: Mailbox,
}

fn delivery_failure(e: impl std::fmt::Display) -> AppError {
    AppError::EmailDeliveryFailure(e.to_string())
}

impl Mailer {
    /// Build a mailer from the configuration, or `None` when no SMTP host is
    /// configured.
    pub fn from_config(config: &MailConfig) -> Result<Option<Self>> {
        let Some(host) = config.host.as_deref() else {
            return Ok(None);
        };

        let from = config
            .from
            .as_deref()
            .or(config.username.as_deref())
            .ok_or_else(|| delivery_failure("No sender address configured"))?
            .parse::<Mailbox>()
            .map_err(delivery_failure)?;

        let tls_parameters = TlsParameters::new(host.to_string()).map_err(delivery_failure)?;
        let mut builder = SmtpTransport::relay(host)
            .map_err(delivery_failure)?
            .port(config.port)
            .tls(Tls::Wrapper(tls_parameters));

        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Some(Mailer {
            smtp: builder.build(),
            from,
        }))
    }

    pub fn send_survey_link(
        &self,
        to_email: &str,
        survey_name: &str,
        survey_url: &str,
    ) -> Result<()> {
        let to = to_email.parse::<Mailbox>().map_err(|e| {
            AppError::InvalidInput(format!("Invalid email address {}: {}", to_email, e))
        })?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(format!("You're invited to fill out {}", survey_name))
            .body(survey_invitation_body(survey_name, survey_url))
            .map_err(delivery_failure)?;

        self.smtp.send(&email).map_err(delivery_failure)?;
        log::info!("Sent survey link for {} to {}", survey_name, to_email);
        Ok(())
    }
}

pub fn survey_invitation_body(survey_name: &str, survey_url: &str) -> String {
    format!(
        "Hello,\n\nYou have been invited to fill out the survey \"{}\".\nOpen this link to respond:\n\n{}\n\nThank you!",
        survey_name, survey_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail_config(host: Option<&str>, from: Option<&str>) -> MailConfig {
        MailConfig {
            host: host.map(str::to_string),
            port: 465,
            username: None,
            password: None,
            from: from.map(str::to_string),
        }
    }

    #[test]
    fn no_host_means_no_mailer() {
        assert!(Mailer::from_config(&mail_config(None, None)).unwrap().is_none());
    }

    #[test]
    fn host_without_sender_is_a_delivery_failure() {
        assert!(matches!(
            Mailer::from_config(&mail_config(Some("smtp.example.com"), None)),
            Err(AppError::EmailDeliveryFailure(_))
        ));
    }

    #[test]
    fn configured_mailer_builds_without_connecting() {
        let mailer = Mailer::from_config(&mail_config(
            Some("smtp.example.com"),
            Some("Surveys <surveys@example.com>"),
        ))
        .unwrap();
        assert!(mailer.is_some());
    }

    #[test]
    fn invitation_contains_link() {
        let body = survey_invitation_body("team.xlsx", "http://localhost:3000/survey/abc");
        assert!(body.contains("\"team.xlsx\""));
        assert!(body.contains("http://localhost:3000/survey/abc"));
    }
}
