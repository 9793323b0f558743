use std::collections::BTreeMap;

use anyhow::Context;

use chrono::Duration;

use url::Url;

use uuid::Uuid;

use crate::client::{Email, EmailClient};
use crate::crypto::{SigningKey, Withdrawal};
use crate::domain::{EmailAddress, RegistrationEntry};

use super::{NotificationEvent, Notifier, NotifyError};

/// Sends notification events as emails through the mail API
#[derive(Debug)]
pub struct EmailNotifier {
    email_client: EmailClient,
    signing_key: SigningKey,
    base_url: Url,
    withdrawal_valid_for: Duration,
}

impl EmailNotifier {
    pub fn new(
        email_client: EmailClient,
        signing_key: SigningKey,
        base_url: Url,
        withdrawal_valid_for: Duration,
    ) -> Self {
        Self {
            email_client,
            signing_key,
            base_url,
            withdrawal_valid_for,
        }
    }

    /// Signed link to the withdrawal page of `entry`
    fn withdrawal_url(&self, offering_id: Uuid, entry: &RegistrationEntry) -> anyhow::Result<Url> {
        let token = Withdrawal::new(offering_id, entry.id)
            .sign(&self.signing_key, self.withdrawal_valid_for)
            .context("Failed to sign withdrawal token")?;

        self.base_url
            .join(&format!("offerings/withdraw/{}", token))
            .context("Failed to build withdrawal URL")
    }

    /// One line per participant, each with its withdrawal link
    fn participant_lines(
        &self,
        offering_id: Uuid,
        entries: &[RegistrationEntry],
    ) -> anyhow::Result<(String, String)> {
        let mut html = String::from("<ul>");
        let mut text = String::new();
        for entry in entries {
            let url = self.withdrawal_url(offering_id, entry)?;
            html.push_str(&format!(
                "<li>{} (<a href=\"{}\">withdrawal options</a>)</li>",
                entry.participant_name, url
            ));
            text.push_str(&format!(
                "- {}, withdrawal options: {}\n",
                entry.participant_name, url
            ));
        }
        html.push_str("</ul>");
        Ok((html, text))
    }

    fn build(&self, event: &NotificationEvent) -> anyhow::Result<Vec<(EmailAddress, Email)>> {
        match event {
            NotificationEvent::RegistrationConfirmed {
                offering_id,
                offering_name,
                contact_email,
                contact_name,
                participants,
                total_price,
            } => {
                let (html_list, text_list) = self.participant_lines(*offering_id, participants)?;
                let email = Email {
                    subject: format!("Registration confirmed: {}", offering_name),
                    html_body: format!(
                        "<p>Hello {},</p><p>the following participants are confirmed for {}:</p>\
                         {}<p>Total: {}</p>",
                        contact_name, offering_name, html_list, total_price
                    ),
                    text_body: format!(
                        "Hello {},\n\nthe following participants are confirmed for {}:\n\
                         {}\nTotal: {}\n",
                        contact_name, offering_name, text_list, total_price
                    ),
                };
                Ok(vec![(contact_email.clone(), email)])
            }
            NotificationEvent::WaitlistJoined {
                offering_name,
                contact_email,
                contact_name,
                participants,
                ..
            } => {
                let names = participants
                    .iter()
                    .map(|entry| entry.participant_name.as_ref())
                    .collect::<Vec<_>>()
                    .join(", ");
                let email = Email {
                    subject: format!("Waitlist: {}", offering_name),
                    html_body: format!(
                        "<p>Hello {},</p><p>{} is fully booked. {} are on the waitlist \
                         and we will let you know when a spot opens.</p>",
                        contact_name, offering_name, names
                    ),
                    text_body: format!(
                        "Hello {},\n\n{} is fully booked. {} are on the waitlist \
                         and we will let you know when a spot opens.\n",
                        contact_name, offering_name, names
                    ),
                };
                Ok(vec![(contact_email.clone(), email)])
            }
            NotificationEvent::WaitlistPromoted {
                offering_id,
                offering_name,
                promoted_entries,
            } => {
                // One mail per contact, even when siblings were promoted together
                let mut by_contact: BTreeMap<&str, (EmailAddress, Vec<RegistrationEntry>)> =
                    BTreeMap::new();
                for entry in promoted_entries {
                    by_contact
                        .entry(entry.contact_email.as_ref())
                        .or_insert_with(|| (entry.contact_email.clone(), Vec::new()))
                        .1
                        .push(entry.clone());
                }

                by_contact
                    .into_values()
                    .map(|(recipient, entries)| -> anyhow::Result<(EmailAddress, Email)> {
                        let (html_list, text_list) =
                            self.participant_lines(*offering_id, &entries)?;
                        let email = Email {
                            subject: format!("A spot opened up: {}", offering_name),
                            html_body: format!(
                                "<p>Good news! These participants moved from the waitlist \
                                 to confirmed for {}:</p>{}",
                                offering_name, html_list
                            ),
                            text_body: format!(
                                "Good news! These participants moved from the waitlist \
                                 to confirmed for {}:\n{}",
                                offering_name, text_list
                            ),
                        };
                        Ok((recipient, email))
                    })
                    .collect()
            }
        }
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    #[tracing::instrument(name = "Email notification", skip_all, fields(kind = event.kind()))]
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let emails = self.build(event).map_err(NotifyError::Build)?;

        for (recipient, email) in emails {
            self.email_client
                .send(&recipient, &email)
                .await
                .map_err(|source| NotifyError::Send { recipient, source })?;
        }
        Ok(())
    }
}
