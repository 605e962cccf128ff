//! Transactional email.
//!
//! Messages are composed by pure functions and handed to [`Mailer::send`],
//! which delivers them on the blocking pool and only logs the outcome. A
//! request never waits for SMTP and a failed delivery is not retried.

use serde_json::Value;
use tracing::{error, info, warn};

use crate::core::config::EmailConfig;
use crate::core::shared::models::Ticket;
use crate::core::shared::utils::title_case_key;

#[cfg(feature = "mail")]
use lettre::{
    message::{header::ContentType, Mailbox, Message},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(value_text)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}

/// `- Key Name: value` lines for a ticket's detail object.
///
/// A `<field>_other` entry is only listed when `<field>` itself is "Other".
pub fn details_text(details: &Value) -> String {
    let Some(map) = details.as_object() else {
        return String::new();
    };

    map.iter()
        .filter(|(key, _)| match key.strip_suffix("_other") {
            Some(base) => map.get(base).and_then(Value::as_str) == Some("Other"),
            None => true,
        })
        .filter_map(|(key, value)| {
            value_text(value).map(|text| format!("- {}: {}", title_case_key(key), text))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn new_ticket_email(ticket: &Ticket, department_name: &str, service_name: &str) -> OutgoingEmail {
    let body = format!(
        "\nHi {name},\n\n\
         This is to confirm that we have successfully received your request.\n\n\
         Ticket Number: {number}\n\
         Department: {department}\n\
         Service Requested: {service}\n\n\
         Request Details:\n{details}\n\n\
         Our team will review your request and get back to you shortly. You can view the status of this ticket in your \"My Tickets\" dashboard.\n\n\
         Thank you,\n\
         TCSD e-Services Team\n",
        name = ticket.requester_name,
        number = ticket.ticket_number,
        department = department_name,
        service = service_name,
        details = details_text(&ticket.details),
    );

    OutgoingEmail {
        to: vec![ticket.requester_email.clone()],
        subject: format!("New Ticket Created: #{}", ticket.ticket_number),
        body,
    }
}

/// Sent to the service's managers and every admin when a requester replies.
/// `None` when nobody would receive it.
pub fn staff_notification_email(
    ticket: &Ticket,
    service_name: &str,
    response_body: &str,
    recipients: Vec<String>,
    ticket_url: &str,
) -> Option<OutgoingEmail> {
    let mut recipients = recipients;
    recipients.sort();
    recipients.dedup();
    if recipients.is_empty() {
        return None;
    }

    let body = format!(
        "\nHi Team,\n\
         A new response has been added to Ticket #{number} by the requester.\n\n\
         Ticket Details:\n\
         - Service: {service}\n\
         - Requester: {requester}\n\n\
         New Response:\n\
         --------------------------------------------------\n\
         {response}\n\
         --------------------------------------------------\n\n\
         You can view the ticket here:\n\
         {url}\n\n\
         Thank you,\n\
         e-Services Notifier\n",
        number = ticket.ticket_number,
        service = service_name,
        requester = ticket.requester_name,
        response = response_body,
        url = ticket_url,
    );

    Some(OutgoingEmail {
        to: recipients,
        subject: format!("New Response on Ticket #{}", ticket.ticket_number),
        body,
    })
}

pub fn resolution_email(ticket: &Ticket, service_name: &str, response_body: &str) -> OutgoingEmail {
    let body = format!(
        "\nHi {name},\n\
         Your ticket #{number} regarding \"{service}\" has been marked as RESOLVED.\n\n\
         Here is the final response from our team:\n\
         --------------------------------------------------\n\
         {response}\n\
         --------------------------------------------------\n\n\
         If you have further questions, please create a new ticket.\n\n\
         Thank you,\n\
         TCSD e-Services Team\n",
        name = ticket.requester_name,
        number = ticket.ticket_number,
        service = service_name,
        response = response_body,
    );

    OutgoingEmail {
        to: vec![ticket.requester_email.clone()],
        subject: format!("Update on your Ticket: #{} - RESOLVED", ticket.ticket_number),
        body,
    }
}

pub fn password_reset_email(email: &str, reset_url: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: vec![email.to_string()],
        subject: "Password Reset Request".to_string(),
        body: format!(
            "To reset your password, visit the following link:\n\
             {reset_url}\n\
             If you did not make this request then simply ignore this email and no changes will be made.\n\
             This link is valid for 30 minutes.\n"
        ),
    }
}

pub struct Mailer {
    from_name: String,
    from_address: String,
    #[cfg(feature = "mail")]
    transport: Option<SmtpTransport>,
}

impl Mailer {
    pub fn new(config: &EmailConfig) -> Self {
        if !config.is_usable() {
            info!("Email delivery disabled; notifications will only be logged");
        }
        #[cfg(feature = "mail")]
        let transport = if config.is_usable() {
            Self::build_transport(config)
        } else {
            None
        };

        Self {
            from_name: config.from_name.clone(),
            from_address: config.sender_address().to_string(),
            #[cfg(feature = "mail")]
            transport,
        }
    }

    /// A mailer that never delivers, for tests and tooling.
    pub fn disabled() -> Self {
        Self {
            from_name: "TCSD e-Services".to_string(),
            from_address: String::new(),
            #[cfg(feature = "mail")]
            transport: None,
        }
    }

    #[cfg(feature = "mail")]
    fn build_transport(config: &EmailConfig) -> Option<SmtpTransport> {
        match SmtpTransport::starttls_relay(&config.smtp_host) {
            Ok(builder) => {
                let builder = builder.port(config.smtp_port);
                let builder = if config.username.is_empty() {
                    builder
                } else {
                    builder.credentials(Credentials::new(
                        config.username.clone(),
                        config.password.clone(),
                    ))
                };
                Some(builder.build())
            }
            Err(e) => {
                error!("SMTP relay error for {}: {}", config.smtp_host, e);
                None
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "mail")]
        {
            self.transport.is_some()
        }
        #[cfg(not(feature = "mail"))]
        {
            false
        }
    }

    #[cfg(feature = "mail")]
    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, String> {
        let from_address = self
            .from_address
            .parse()
            .map_err(|e| format!("Invalid from address: {e}"))?;
        let mut builder = Message::builder()
            .from(Mailbox::new(Some(self.from_name.clone()), from_address))
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &email.to {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|e| format!("Invalid to address {recipient}: {e}"))?;
            builder = builder.to(mailbox);
        }
        builder
            .body(email.body.clone())
            .map_err(|e| format!("Failed to build email: {e}"))
    }

    /// Fire-and-forget delivery.
    pub fn send(&self, email: OutgoingEmail) {
        if email.to.is_empty() {
            warn!("Dropping email \"{}\" with no recipients", email.subject);
            return;
        }

        #[cfg(feature = "mail")]
        if let Some(transport) = self.transport.clone() {
            let message = match self.build_message(&email) {
                Ok(message) => message,
                Err(e) => {
                    error!("Could not compose \"{}\": {}", email.subject, e);
                    return;
                }
            };
            let recipients = email.to.join(", ");
            let subject = email.subject;
            let _delivery = tokio::task::spawn_blocking(move || match transport.send(&message) {
                Ok(_) => info!("Email \"{}\" sent to {}", subject, recipients),
                Err(e) => error!("Error sending \"{}\" to {}: {}", subject, recipients, e),
            });
            return;
        }

        info!(
            "Email delivery disabled; not sending \"{}\" to {}",
            email.subject,
            email.to.join(", ")
        );
    }
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("from_name", &self.from_name)
            .field("from_address", &self.from_address)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::TicketStatus;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn ticket(details: Value) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            ticket_number: "ICT-2025-0007".into(),
            status: TicketStatus::Open,
            date_posted: Utc::now(),
            requester_name: "Maria Santos".into(),
            requester_email: "maria.santos@deped.gov.ph".into(),
            requester_contact: Some("09171234567".into()),
            details,
            department_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            school_id: None,
            assigned_staff_id: None,
        }
    }

    #[test]
    fn test_details_text_other_rule() {
        let details = json!({
            "equipment_type": "Other",
            "equipment_type_other": "Smart TV",
            "purpose": "Loan",
            "purpose_other": "should not show",
            "remarks": "",
        });
        let text = details_text(&details);
        assert!(text.contains("- Equipment Type: Other"));
        assert!(text.contains("- Equipment Type Other: Smart TV"));
        assert!(text.contains("- Purpose: Loan"));
        assert!(!text.contains("should not show"));
        assert!(!text.contains("Remarks"));
    }

    #[test]
    fn test_details_text_non_object() {
        assert_eq!(details_text(&json!(null)), "");
    }

    #[test]
    fn test_new_ticket_email() {
        let email = new_ticket_email(&ticket(json!({"problem_description": "No display"})), "ICT", "Repair");
        assert_eq!(email.to, vec!["maria.santos@deped.gov.ph"]);
        assert_eq!(email.subject, "New Ticket Created: #ICT-2025-0007");
        assert!(email.body.contains("Hi Maria Santos,"));
        assert!(email.body.contains("Service Requested: Repair"));
        assert!(email.body.contains("- Problem Description: No display"));
    }

    #[test]
    fn test_staff_notification_dedups_and_skips_empty() {
        let t = ticket(json!({}));
        assert!(staff_notification_email(&t, "Repair", "hi", vec![], "http://x").is_none());

        let email = staff_notification_email(
            &t,
            "Repair",
            "Any update?",
            vec![
                "admin@deped.gov.ph".into(),
                "staff@deped.gov.ph".into(),
                "admin@deped.gov.ph".into(),
            ],
            "http://localhost:8080/tickets/1",
        )
        .expect("email");
        assert_eq!(email.to.len(), 2);
        assert_eq!(email.subject, "New Response on Ticket #ICT-2025-0007");
        assert!(email.body.contains("Any update?"));
        assert!(email.body.contains("http://localhost:8080/tickets/1"));
    }

    #[test]
    fn test_resolution_email() {
        let email = resolution_email(&ticket(json!({})), "Repair", "Your ticket has been resolved.");
        assert_eq!(email.subject, "Update on your Ticket: #ICT-2025-0007 - RESOLVED");
        assert!(email.body.contains("regarding \"Repair\" has been marked as RESOLVED"));
        assert!(email.body.contains("Your ticket has been resolved."));
    }

    #[test]
    fn test_password_reset_email() {
        let email = password_reset_email("a@deped.gov.ph", "http://h/auth/reset-password/tok");
        assert_eq!(email.subject, "Password Reset Request");
        assert!(email.body.contains("http://h/auth/reset-password/tok"));
        assert!(email.body.contains("valid for 30 minutes"));
    }

    #[test]
    fn test_disabled_mailer_only_logs() {
        let mailer = Mailer::disabled();
        assert!(!mailer.is_enabled());
        mailer.send(password_reset_email("a@deped.gov.ph", "http://h"));
    }
}
