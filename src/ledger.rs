use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use serde::{Deserialize, Serialize};

use uuid::Uuid;

use crate::domain::RegistrationEntry;

/// Kind of bookable offering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferingKind {
    Camp,
    Bootcamp,
}

impl OfferingKind {
    pub fn as_str(&self) -> &str {
        match self {
            OfferingKind::Camp => "camp",
            OfferingKind::Bootcamp => "bootcamp",
        }
    }
}

impl FromStr for OfferingKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "camp" => Ok(Self::Camp),
            "bootcamp" => Ok(Self::Bootcamp),
            other => Err(format!("{} is not a valid offering kind", other)),
        }
    }
}

impl fmt::Display for OfferingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remaining spots of an offering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Spots {
    Unbounded,
    Limited(u32),
}

impl Spots {
    /// Whether `count` more participants fit
    pub fn has_room_for(&self, count: usize) -> bool {
        match self {
            Spots::Unbounded => true,
            Spots::Limited(remaining) => count <= *remaining as usize,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Spots::Limited(0))
    }
}

/// Which list of an offering an entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Registered,
    Waitlisted,
}

/// A camp or bootcamp with its confirmed registrations and waitlist.
///
/// The ledger methods only do bookkeeping. Capacity policy is decided by the
/// caller (see [`crate::registration::RegistrationService`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    pub id: Uuid,
    pub name: String,
    pub kind: OfferingKind,
    /// Maximum number of confirmed participants, `None` if unbounded
    pub capacity: Option<u32>,
    pub registration_deadline: Option<DateTime<Utc>>,
    /// Confirmed entries, in confirmation order
    pub registrations: Vec<RegistrationEntry>,
    /// Waiting entries, in queue order
    pub waitlist: Vec<RegistrationEntry>,
}

impl Offering {
    pub fn new(
        name: String,
        kind: OfferingKind,
        capacity: Option<u32>,
        registration_deadline: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            kind,
            capacity,
            registration_deadline,
            registrations: Vec::new(),
            waitlist: Vec::new(),
        }
    }

    pub fn spots_remaining(&self) -> Spots {
        match self.capacity {
            None => Spots::Unbounded,
            Some(capacity) => {
                let taken = u32::try_from(self.registrations.len()).unwrap_or(u32::MAX);
                Spots::Limited(capacity.saturating_sub(taken))
            }
        }
    }

    pub fn is_registration_open(&self, now: DateTime<Utc>) -> bool {
        self.registration_deadline
            .map(|deadline| now < deadline)
            .unwrap_or(true)
    }

    /// Append confirmed entries; capacity must already have been checked
    pub fn append_registrations(mut self, entries: Vec<RegistrationEntry>) -> Self {
        self.registrations.extend(entries);
        self
    }

    pub fn append_to_waitlist(mut self, entries: Vec<RegistrationEntry>) -> Self {
        self.waitlist.extend(entries);
        self
    }

    /// Look up a single entry in either list
    pub fn find_entry(&self, entry_id: Uuid) -> Option<(&RegistrationEntry, Placement)> {
        if let Some(entry) = self.registrations.iter().find(|e| e.id == entry_id) {
            return Some((entry, Placement::Registered));
        }
        self.waitlist
            .iter()
            .find(|e| e.id == entry_id)
            .map(|entry| (entry, Placement::Waitlisted))
    }

    /// Remove a single entry from whichever list holds it
    pub fn remove_entry(mut self, entry_id: Uuid) -> Option<(Self, RegistrationEntry, Placement)> {
        if let Some(index) = self.registrations.iter().position(|e| e.id == entry_id) {
            let entry = self.registrations.remove(index);
            return Some((self, entry, Placement::Registered));
        }
        if let Some(index) = self.waitlist.iter().position(|e| e.id == entry_id) {
            let entry = self.waitlist.remove(index);
            return Some((self, entry, Placement::Waitlisted));
        }
        None
    }

    /// Where entries created by `request_id` ended up, if anywhere
    pub fn placement_of_request(&self, request_id: Uuid) -> Option<Placement> {
        if self.registrations.iter().any(|e| e.request_id == request_id) {
            Some(Placement::Registered)
        } else if self.waitlist.iter().any(|e| e.request_id == request_id) {
            Some(Placement::Waitlisted)
        } else {
            None
        }
    }

    /// Entries created by `request_id` in `placement`, in stored order
    pub fn entries_of_request(
        &self,
        request_id: Uuid,
        placement: Placement,
    ) -> Vec<RegistrationEntry> {
        let list = match placement {
            Placement::Registered => &self.registrations,
            Placement::Waitlisted => &self.waitlist,
        };
        list.iter()
            .filter(|e| e.request_id == request_id)
            .cloned()
            .collect()
    }
}
