//! Deciding whether a Job earns its owner a coffee

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;

use crate::config::Settings;
use crate::events::{job_key, EventType, JobEvent};
use crate::ledger::CoffeeLedger;
use crate::{Error, Result};

/// Annotation set on a Job once its owner got a coffee for it
pub const SERVED_ANNOTATION: &str = "kubespresso.io/coffee-served-at";

/// Owner used when a Job has neither an owner label nor a namespace
const FALLBACK_OWNER: &str = "default";

/// The label-driven rules a decision is taken against
#[derive(Clone, Debug)]
pub struct CoffeeRules {
    pub duration_label: String,
    pub owner_label: String,
    pub min_expected: Duration,
}

impl CoffeeRules {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            duration_label: settings.duration_label.clone(),
            owner_label: settings.owner_label.clone(),
            min_expected: settings.min_expected_duration()?,
        })
    }
}

/// Why a Job does not lead to a coffee
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Deleted,
    NoExpectedDuration,
    InvalidExpectedDuration,
    TooShort,
    AlreadyServed,
    Finished,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Deleted => "deleted",
            SkipReason::NoExpectedDuration => "no_expected_duration",
            SkipReason::InvalidExpectedDuration => "invalid_expected_duration",
            SkipReason::TooShort => "too_short",
            SkipReason::AlreadyServed => "already_served",
            SkipReason::Finished => "finished",
        }
    }
}

/// Outcome of looking at one Job event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Brew a cup for `owner`
    Brew { owner: String, expected: Duration },
    /// The owner already had today's coffee
    AlreadyHadCoffee { owner: String },
    Skip(SkipReason),
}

impl Decision {
    /// Metric label for the outcome
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Brew { .. } => "brew",
            Decision::AlreadyHadCoffee { .. } => "already_had_coffee",
            Decision::Skip(reason) => reason.as_str(),
        }
    }
}

/// Check whether this is the first time we see the Job and whether its
/// owner still has not had a coffee today.
pub fn should_make_coffee(
    event: &JobEvent,
    rules: &CoffeeRules,
    ledger: &CoffeeLedger,
    today: NaiveDate,
) -> Decision {
    if event.event_type == EventType::Deleted {
        return Decision::Skip(SkipReason::Deleted);
    }

    let job = &event.job;

    let Some(raw) = job.labels().get(&rules.duration_label) else {
        return Decision::Skip(SkipReason::NoExpectedDuration);
    };

    let expected = match parse_expected_duration(raw) {
        Ok(expected) => expected,
        Err(_) => return Decision::Skip(SkipReason::InvalidExpectedDuration),
    };

    if expected < rules.min_expected {
        return Decision::Skip(SkipReason::TooShort);
    }

    if was_served(job, ledger) {
        return Decision::Skip(SkipReason::AlreadyServed);
    }

    if is_finished(job) {
        return Decision::Skip(SkipReason::Finished);
    }

    let owner = resolve_owner(job, &rules.owner_label);
    if ledger.had_coffee_on(&owner, today) {
        return Decision::AlreadyHadCoffee { owner };
    }

    Decision::Brew { owner, expected }
}

fn was_served(job: &Job, ledger: &CoffeeLedger) -> bool {
    job.annotations().contains_key(SERVED_ANNOTATION) || ledger.is_served(&ledger_id(job))
}

/// Day a Job was served on, read back from its annotation
pub fn served_on(job: &Job, offset: FixedOffset) -> Option<NaiveDate> {
    let raw = job.annotations().get(SERVED_ANNOTATION)?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|at| today(at.with_timezone(&Utc), offset))
}

/// Identity of a Job in the ledger: its UID, or `namespace/name` without one
pub fn ledger_id(job: &Job) -> String {
    job.uid().unwrap_or_else(|| job_key(job))
}

/// Parse an `expectedDuration` label value.
///
/// Accepts unit suffixed numbers (`30s`, `45m`, `2h`, `1d`) and their
/// concatenation (`1h30m`). A bare number is minutes.
pub fn parse_expected_duration(value: &str) -> Result<Duration> {
    let invalid = |reason: &str| Error::InvalidDuration {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty value"));
    }

    let seconds = if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        trimmed
            .parse::<u64>()
            .ok()
            .and_then(|minutes| minutes.checked_mul(60))
            .ok_or_else(|| invalid("value too large"))?
    } else {
        let mut total: u64 = 0;
        let mut digits = String::new();
        for c in trimmed.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            if digits.is_empty() {
                return Err(invalid("unit without a number"));
            }
            let unit = match c.to_ascii_lowercase() {
                's' => 1,
                'm' => 60,
                'h' => 60 * 60,
                'd' => 24 * 60 * 60,
                other => return Err(invalid(format!("unknown unit '{}'", other).as_str())),
            };
            total = digits
                .parse::<u64>()
                .ok()
                .and_then(|n| n.checked_mul(unit))
                .and_then(|part| total.checked_add(part))
                .ok_or_else(|| invalid("value too large"))?;
            digits.clear();
        }
        if !digits.is_empty() {
            return Err(invalid("number without a unit"));
        }
        total
    };

    if seconds == 0 {
        return Err(invalid("must be greater than zero"));
    }

    Ok(Duration::from_secs(seconds))
}

/// The person to brew for: the owner label, else the Job's namespace
pub fn resolve_owner(job: &Job, owner_label: &str) -> String {
    job.labels()
        .get(owner_label)
        .map(|owner| owner.trim())
        .filter(|owner| !owner.is_empty())
        .map(str::to_string)
        .or_else(|| job.namespace())
        .unwrap_or_else(|| FALLBACK_OWNER.to_string())
}

/// Whether the Job already completed or failed
pub fn is_finished(job: &Job) -> bool {
    let Some(status) = job.status.as_ref() else {
        return false;
    };

    if status.completion_time.is_some() {
        return true;
    }

    status.conditions.as_ref().is_some_and(|conditions| {
        conditions
            .iter()
            .any(|c| (c.type_ == "Complete" || c.type_ == "Failed") && c.status == "True")
    })
}

/// The calendar day `now` falls on at the given offset
pub fn today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}
