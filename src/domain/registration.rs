use chrono::{DateTime, NaiveDate, Utc};

use serde::{Deserialize, Serialize};

use uuid::Uuid;

use super::{EmailAddress, PersonName, Price, Role};

/// Upper bound on participants in one request
pub const MAX_PARTICIPANTS: usize = 20;

/// One participant named in a registration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub name: PersonName,
    pub birth_date: NaiveDate,
    pub role: Role,
}

/// Person to notify about a registration, not necessarily a participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub name: PersonName,
    pub email: EmailAddress,
}

/// A participant's slot in an offering, either confirmed or waitlisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationEntry {
    pub id: Uuid,
    /// Idempotency key of the request that created this entry
    pub request_id: Uuid,
    /// Account that performed the registration
    pub user_id: Uuid,
    pub participant_name: PersonName,
    pub participant_birth_date: NaiveDate,
    pub role: Role,
    pub contact_email: EmailAddress,
    pub registered_at: DateTime<Utc>,
}

/// Validated registration request, consumed once by the registration service
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    request_id: Uuid,
    offering_id: Uuid,
    user_id: Uuid,
    club_id: Option<Uuid>,
    participants: Vec<Participant>,
    contact: Contact,
    total_price: Price,
    coupon_id: Option<Uuid>,
}

impl RegistrationRequest {
    /// Start building a request for `offering_id`, made by the account `user_id`
    pub fn builder(
        offering_id: Uuid,
        user_id: Uuid,
        contact: Contact,
    ) -> RegistrationRequestBuilder {
        RegistrationRequestBuilder {
            request_id: None,
            offering_id,
            user_id,
            club_id: None,
            participants: Vec::new(),
            contact,
            total_price: Price::ZERO,
            coupon_id: None,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn offering_id(&self) -> Uuid {
        self.offering_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn club_id(&self) -> Option<Uuid> {
        self.club_id
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn total_price(&self) -> Price {
        self.total_price
    }

    pub fn coupon_id(&self) -> Option<Uuid> {
        self.coupon_id
    }

    /// Identity charged with a coupon redemption: the club if known, else the account
    pub fn coupon_consumer(&self) -> Uuid {
        self.club_id.unwrap_or(self.user_id)
    }

    /// Ledger entries for every participant, in request order
    pub fn entries(&self, registered_at: DateTime<Utc>) -> Vec<RegistrationEntry> {
        self.participants
            .iter()
            .map(|participant| RegistrationEntry {
                id: Uuid::new_v4(),
                request_id: self.request_id,
                user_id: self.user_id,
                participant_name: participant.name.clone(),
                participant_birth_date: participant.birth_date,
                role: participant.role,
                contact_email: self.contact.email.clone(),
                registered_at,
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct RegistrationRequestBuilder {
    request_id: Option<Uuid>,
    offering_id: Uuid,
    user_id: Uuid,
    club_id: Option<Uuid>,
    participants: Vec<Participant>,
    contact: Contact,
    total_price: Price,
    coupon_id: Option<Uuid>,
}

impl RegistrationRequestBuilder {
    /// Use a caller supplied idempotency key instead of a random one
    pub fn request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn club_id(mut self, club_id: Option<Uuid>) -> Self {
        self.club_id = club_id;
        self
    }

    pub fn participant(mut self, participant: Participant) -> Self {
        self.participants.push(participant);
        self
    }

    pub fn total_price(mut self, total_price: Price) -> Self {
        self.total_price = total_price;
        self
    }

    pub fn coupon_id(mut self, coupon_id: Option<Uuid>) -> Self {
        self.coupon_id = coupon_id;
        self
    }

    /// Validate and build the request
    pub fn build(self) -> Result<RegistrationRequest, String> {
        if self.participants.is_empty() {
            return Err("A registration needs at least one participant".into());
        }
        if self.participants.len() > MAX_PARTICIPANTS {
            return Err(format!(
                "A registration cannot contain more than {} participants",
                MAX_PARTICIPANTS
            ));
        }

        Ok(RegistrationRequest {
            request_id: self.request_id.unwrap_or_else(Uuid::new_v4),
            offering_id: self.offering_id,
            user_id: self.user_id,
            club_id: self.club_id,
            participants: self.participants,
            contact: self.contact,
            total_price: self.total_price,
            coupon_id: self.coupon_id,
        })
    }
}
