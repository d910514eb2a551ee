//! Email transports and notification templates

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
    models::{Component, NotificationKind, User},
};

const SIGNATURE: &str = "Challengers Component Tracker";

/// Outbound email channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

/// SMTP delivery through lettre
#[derive(Clone)]
pub struct SmtpMailer {
    mailer: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> AppResult<Self> {
        let from_name = config.smtp_from_name.as_deref().unwrap_or(SIGNATURE);
        let from = Mailbox::from_str(&format!("{} <{}>", from_name, config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let builder = if config.smtp_use_tls {
            SmtpTransport::starttls_relay(&config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&config.smtp_host)
        }
        .port(config.smtp_port);

        let builder = if let (Some(username), Some(password)) =
            (&config.smtp_username, &config.smtp_password)
        {
            builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            builder
        };

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailTransport for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::External(format!("Invalid to address: {}", e)))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body(body)),
                    ),
            )
            .map_err(|e| AppError::External(format!("Failed to build email: {}", e)))?;

        // lettre's SMTP transport is blocking
        let mailer = self.mailer.clone();
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::External(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

/// Plain-text body wrapped for the HTML alternative
fn html_body(body: &str) -> String {
    let escaped = body
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!("<html><body><pre>{}</pre></body></html>", escaped)
}

/// Writes messages to the log instead of sending them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl EmailTransport for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        tracing::info!(to, subject, "Email delivery disabled, message not sent");
        tracing::debug!("{}", body);
        Ok(())
    }
}

/// Rendered subject and plain-text body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    match date {
        Some(date) => date.format("%A, %B %-d, %Y").to_string(),
        None => "Not set".to_string(),
    }
}

fn plural(count: i64) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Render the message for `kind` addressed to `recipient`
pub fn render(recipient: &User, component: &Component, kind: &NotificationKind) -> EmailMessage {
    let (subject, body) = match kind {
        NotificationKind::Checkout => (
            format!("Component Checked Out: {}", component.name),
            format!(
                r#"Hi {name},

You have successfully checked out the following component:

  Component: {component} ({code})
  Due Date:  {due}

You'll receive a reminder 1 day before the due date and daily reminders if
the component becomes overdue.

Please return the component on time to help other team members access it.
"#,
                name = recipient.name,
                component = component.name,
                code = component.component_code,
                due = format_date(component.due_date),
            ),
        ),
        NotificationKind::Return { duration_days } => (
            format!("Component Returned: {}", component.name),
            format!(
                r#"Hi {name},

Thank you for returning the component:

  Component:    {component} ({code})
  Borrowed for: {days} day{s}

The component is now available for other team members.
"#,
                name = recipient.name,
                component = component.name,
                code = component.component_code,
                days = duration_days,
                s = plural(*duration_days),
            ),
        ),
        NotificationKind::OverdueReminder { days_overdue } => (
            format!(
                "URGENT: {} is {} day{} OVERDUE",
                component.name,
                days_overdue,
                plural(*days_overdue)
            ),
            format!(
                r#"Hi {name},

URGENT: The following component is overdue and needs to be returned immediately:

  Component:    {component} ({code})
  Days Overdue: {days}

Other team members may need this component. You will receive daily reminders
until it is returned. Contact an admin if you need an extension.
"#,
                name = recipient.name,
                component = component.name,
                code = component.component_code,
                days = days_overdue,
            ),
        ),
        NotificationKind::DueSoon => (
            format!("Reminder: {} Due Soon", component.name),
            format!(
                r#"Hi {name},

This is a friendly reminder that your component is due soon:

  Component: {component} ({code})
  Due Date:  {due}

Please return the component on time to avoid overdue notifications.
"#,
                name = recipient.name,
                component = component.name,
                code = component.component_code,
                due = format_date(component.due_date),
            ),
        ),
        NotificationKind::ComponentRequest {
            member,
            notes,
            requested_days,
        } => {
            let notes = if notes.is_empty() {
                String::new()
            } else {
                format!("  Notes:              {}\n", notes)
            };
            (
                format!("New Component Request from {}", member.name),
                format!(
                    r#"Hi {name},

{member} has requested a component from the inventory:

  Component:          {component} ({code})
  Requested by:       {member} ({username})
  Requested Duration: {days} days
{notes}
Please review and approve or reject this request from the admin portal.
"#,
                    name = recipient.name,
                    member = member.name,
                    username = member.username,
                    component = component.name,
                    code = component.component_code,
                    days = requested_days,
                    notes = notes,
                ),
            )
        }
        NotificationKind::RequestRejected { reason } => (
            format!("Request Rejected: {}", component.name),
            format!(
                r#"Hi {name},

Your request for the following component was rejected:

  Component: {component} ({code})
  Reason:    {reason}
"#,
                name = recipient.name,
                component = component.name,
                code = component.component_code,
                reason = reason,
            ),
        ),
    };

    EmailMessage {
        subject,
        body: format!("{}\n-- \n{}\n", body, SIGNATURE),
    }
}
