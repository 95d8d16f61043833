//! Advertisement filter
//!
//! Decides whether an advertisement belongs to the scan target. Pure, never
//! fails; an advertisement without a local name never matches.

use crate::domain::models::Advertisement;
use crate::domain::settings::MatchPolicy;

#[derive(Debug, Clone, Copy, Default)]
pub struct AdvertisementFilter {
    policy: MatchPolicy,
}

impl AdvertisementFilter {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn matches(&self, advertisement: &Advertisement, target: &str) -> bool {
        if target.is_empty() {
            return false;
        }
        let Some(name) = advertisement.local_name.as_deref() else {
            return false;
        };

        match self.policy {
            MatchPolicy::Exact => name == target,
            MatchPolicy::Prefix => name.starts_with(target),
            MatchPolicy::Contains => name.contains(target),
        }
    }
}
