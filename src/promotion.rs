use crate::domain::RegistrationEntry;
use crate::ledger::Offering;

/// Result of moving waitlist entries into the confirmed registrations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub offering: Offering,
    /// Entries that moved, in promotion order
    pub promoted: Vec<RegistrationEntry>,
}

/// Promote the first `freed_spots` waitlist entries, first come first served.
///
/// Promotes the whole waitlist when it is shorter than `freed_spots`. Does not
/// look at capacity and sends no notifications.
pub fn promote_from_waitlist(mut offering: Offering, freed_spots: usize) -> Promotion {
    let count = freed_spots.min(offering.waitlist.len());
    let promoted: Vec<RegistrationEntry> = offering.waitlist.drain(..count).collect();
    let offering = offering.append_registrations(promoted.clone());

    Promotion { offering, promoted }
}
