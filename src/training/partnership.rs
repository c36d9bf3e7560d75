//! Partnership matching: which commercial relationship a new training
//! period attaches to, and the continuity path that revives a previous
//! year's partnership when its delivery partner is still on the provider's
//! roster.
//!
//! Matcher misses are `None`, never errors; callers fall back to an
//! expression of interest against the provider's active record for the
//! target year.

use chrono::NaiveDate;

use super::domain::{LeadProviderId, SchoolId, SchoolPartnership, SchoolPartnershipId};
use super::store::{NewSchoolPartnership, PartnershipLink, TrainingStore};

pub struct PartnershipMatcher<'a> {
    store: &'a TrainingStore,
}

impl<'a> PartnershipMatcher<'a> {
    pub fn new(store: &'a TrainingStore) -> Self {
        Self { store }
    }

    /// Earliest-created confirmed partnership between the school and lead
    /// provider within `contract_year`.
    pub fn first_match(
        &self,
        school: SchoolId,
        lead_provider: LeadProviderId,
        contract_year: i32,
    ) -> Option<SchoolPartnership> {
        self.store
            .partnership_links(school)
            .into_iter()
            .filter(|link| {
                link.lead_provider == lead_provider && link.contract_year == contract_year
            })
            .min_by_key(|link| (link.partnership.created_on, link.partnership.id))
            .map(|link| link.partnership)
    }

    /// Continuity search: among the school's partnerships with this lead
    /// provider in years before `current_year`, the most recent one whose
    /// delivery partner is still on the provider's roster this year.
    /// Ordering: contract year desc, then creation date desc, then id desc.
    pub fn find_previous_reusable(
        &self,
        school: SchoolId,
        lead_provider: LeadProviderId,
        current_year: i32,
    ) -> Option<SchoolPartnership> {
        self.store.active_lead_provider(lead_provider, current_year)?;

        let mut candidates: Vec<PartnershipLink> = self
            .store
            .partnership_links(school)
            .into_iter()
            .filter(|link| {
                link.lead_provider == lead_provider && link.contract_year < current_year
            })
            .collect();
        candidates.sort_by_key(|link| {
            (
                link.contract_year,
                link.partnership.created_on,
                link.partnership.id,
            )
        });
        candidates.reverse();

        candidates
            .into_iter()
            .find(|link| {
                self.store
                    .roster_pairing(lead_provider, current_year, link.delivery_partner)
                    .is_some()
            })
            .map(|link| link.partnership)
    }

    /// Recompute a previous partnership for the current year: same lead
    /// provider and delivery partner, this year's active record. Returns the
    /// row to insert; the caller commits it inside the operation's own batch
    /// so a revived partnership never survives a failed operation. Any
    /// missing link is `None` and callers fall back to an expression of
    /// interest.
    pub fn create_from_previous(
        &self,
        previous: SchoolPartnershipId,
        school: SchoolId,
        current_year: i32,
        created_on: NaiveDate,
    ) -> Option<NewSchoolPartnership> {
        let link = self.store.partnership_link(previous)?;
        if link.partnership.school != school {
            return None;
        }
        let Some(pairing) =
            self.store
                .roster_pairing(link.lead_provider, current_year, link.delivery_partner)
        else {
            tracing::debug!(
                lead_provider = link.lead_provider.0,
                contract_year = current_year,
                "previous partnership has no current-year pairing to reuse"
            );
            return None;
        };

        Some(NewSchoolPartnership {
            school,
            provider_partnership: pairing.id,
            created_on,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::domain::DeliveryPartnerId;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn seeded_years(store: &TrainingStore, years: &[i32]) {
        for &year in years {
            store.add_contract_period(year, date(year, 6, 1), date(year + 1, 5, 31), true);
        }
    }

    struct Fixture {
        store: TrainingStore,
        school: SchoolId,
        lead_provider: LeadProviderId,
    }

    fn fixture() -> Fixture {
        let store = TrainingStore::new();
        seeded_years(&store, &[2022, 2023, 2024]);
        Fixture {
            store,
            school: SchoolId(1),
            lead_provider: LeadProviderId(1),
        }
    }

    impl Fixture {
        fn partnership(
            &self,
            year: i32,
            delivery_partner: DeliveryPartnerId,
            created_on: NaiveDate,
        ) -> SchoolPartnership {
            let active = self
                .store
                .add_active_lead_provider(self.lead_provider, year)
                .expect("provider activates");
            let pairing = self
                .store
                .add_provider_partnership(active.id, delivery_partner)
                .expect("pairing registers");
            self.store
                .add_school_partnership(self.school, pairing.id, created_on)
                .expect("partnership registers")
        }
    }

    #[test]
    fn first_match_prefers_the_earliest_created_partnership() {
        let fx = fixture();
        let later = fx.partnership(2024, DeliveryPartnerId(1), date(2024, 8, 1));
        let earlier = fx.partnership(2024, DeliveryPartnerId(2), date(2024, 6, 15));

        let matcher = PartnershipMatcher::new(&fx.store);
        let found = matcher.first_match(fx.school, fx.lead_provider, 2024);
        assert_eq!(found.map(|p| p.id), Some(earlier.id));
        assert_ne!(later.id, earlier.id);
    }

    #[test]
    fn reuse_skips_the_most_recent_year_when_its_partner_left_the_roster() {
        let fx = fixture();
        // Year 2022 used partner B, 2023 used partner A. Only B is paired
        // with the provider in 2024.
        let partner_a = DeliveryPartnerId(10);
        let partner_b = DeliveryPartnerId(20);
        let year_2022 = fx.partnership(2022, partner_b, date(2022, 7, 1));
        fx.partnership(2023, partner_a, date(2023, 7, 1));

        let current = fx
            .store
            .add_active_lead_provider(fx.lead_provider, 2024)
            .expect("provider activates");
        fx.store
            .add_provider_partnership(current.id, partner_b)
            .expect("pairing registers");

        let matcher = PartnershipMatcher::new(&fx.store);
        let found = matcher.find_previous_reusable(fx.school, fx.lead_provider, 2024);
        assert_eq!(found.map(|p| p.id), Some(year_2022.id));
    }

    #[test]
    fn reuse_returns_none_when_the_provider_is_inactive_this_year() {
        let fx = fixture();
        fx.partnership(2023, DeliveryPartnerId(1), date(2023, 7, 1));

        let matcher = PartnershipMatcher::new(&fx.store);
        assert_eq!(
            matcher.find_previous_reusable(fx.school, fx.lead_provider, 2024),
            None
        );
    }

    #[test]
    fn reuse_never_crosses_schools_or_providers() {
        let fx = fixture();
        let partner = DeliveryPartnerId(1);
        fx.partnership(2023, partner, date(2023, 7, 1));
        let current = fx
            .store
            .add_active_lead_provider(fx.lead_provider, 2024)
            .expect("provider activates");
        fx.store
            .add_provider_partnership(current.id, partner)
            .expect("pairing registers");

        let matcher = PartnershipMatcher::new(&fx.store);
        assert_eq!(
            matcher.find_previous_reusable(SchoolId(99), fx.lead_provider, 2024),
            None
        );
        assert_eq!(
            matcher.find_previous_reusable(fx.school, LeadProviderId(99), 2024),
            None
        );
    }

    #[test]
    fn create_from_previous_plans_the_current_year_row() {
        let fx = fixture();
        let partner = DeliveryPartnerId(1);
        let previous = fx.partnership(2023, partner, date(2023, 7, 1));
        let current = fx
            .store
            .add_active_lead_provider(fx.lead_provider, 2024)
            .expect("provider activates");
        let current_pairing = fx
            .store
            .add_provider_partnership(current.id, partner)
            .expect("pairing registers");

        let matcher = PartnershipMatcher::new(&fx.store);
        let planned = matcher
            .create_from_previous(previous.id, fx.school, 2024, date(2024, 9, 2))
            .expect("a row is planned");

        assert_eq!(planned.provider_partnership, current_pairing.id);
        assert_eq!(planned.school, fx.school);
        assert_eq!(planned.created_on, date(2024, 9, 2));
        assert!(
            fx.store
                .partnership_links(fx.school)
                .iter()
                .all(|link| link.contract_year != 2024),
            "planning writes nothing"
        );
    }

    #[test]
    fn create_from_previous_misses_quietly() {
        let fx = fixture();
        let previous = fx.partnership(2023, DeliveryPartnerId(1), date(2023, 7, 1));
        // Provider never activated for 2024.
        let matcher = PartnershipMatcher::new(&fx.store);
        let planned = matcher.create_from_previous(previous.id, fx.school, 2024, date(2024, 9, 2));
        assert!(planned.is_none());

        // Cross-school hand-offs are refused too.
        let planned = matcher.create_from_previous(previous.id, SchoolId(99), 2024, date(2024, 9, 2));
        assert!(planned.is_none());
    }
}
