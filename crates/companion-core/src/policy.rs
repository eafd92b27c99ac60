use chrono::{DateTime, NaiveTime, TimeZone, Utc};

use companion_types::models::Plan;

pub const FREE_DAILY_LIMIT: u32 = 15;
pub const BASIC_DAILY_LIMIT: u32 = 150;

/// The parts of a subscription that decide the quota.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionTerms {
    pub plan: Plan,
    pub active: bool,
}

/// Daily quota for a plan. `None` means unbounded.
pub fn plan_quota(plan: Plan) -> Option<u32> {
    match plan {
        Plan::Free => Some(FREE_DAILY_LIMIT),
        Plan::Basic => Some(BASIC_DAILY_LIMIT),
        Plan::Premium => None,
    }
}

/// Quota that applies to a user. No subscription, or a deactivated one, gets
/// the free allowance.
pub fn daily_quota(terms: Option<&SubscriptionTerms>) -> Option<u32> {
    match terms {
        Some(terms) if terms.active => plan_quota(terms.plan),
        _ => plan_quota(Plan::Free),
    }
}

pub fn is_limit_reached(count: u32, quota: Option<u32>) -> bool {
    quota.is_some_and(|limit| count >= limit)
}

/// Midnight of `now`'s calendar day in `now`'s own timezone, as a UTC instant.
pub fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    match now.timezone().from_local_datetime(&midnight).earliest() {
        Some(start) => start.with_timezone(&Utc),
        // Midnight fell into a DST gap: rewind by the wall-clock time elapsed today.
        None => now.with_timezone(&Utc) - (now.naive_local() - midnight),
    }
}
