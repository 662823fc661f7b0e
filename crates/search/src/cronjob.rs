//! CronJob adapter.
//!
//! Adds the derived `status` condition field (`paused` when `spec.suspend` is set, else
//! `running`) and the `lastScheduleTime` order key.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use quarry_core::ObjectSource;

use crate::compare::{absent_first, by_name, less_by_metadata};
use crate::predicate::matches_exact;
use crate::searcher::Searcher;
use crate::SearchError;

pub const STATUS: &str = "status";
pub const STATUS_PAUSED: &str = "paused";
pub const STATUS_RUNNING: &str = "running";
pub const LAST_SCHEDULE_TIME: &str = "lastScheduleTime";

pub fn cronjob_status(item: &CronJob) -> &'static str {
    if item.spec.as_ref().and_then(|s| s.suspend).unwrap_or(false) { STATUS_PAUSED } else { STATUS_RUNNING }
}

pub fn last_schedule_time(item: &CronJob) -> Option<&Time> {
    item.status.as_ref().and_then(|s| s.last_schedule_time.as_ref())
}

pub struct CronJobSearcher<S> {
    source: S,
}

impl<S: ObjectSource<CronJob>> CronJobSearcher<S> {
    pub fn new(source: S) -> Self { Self { source } }
    pub fn into_inner(self) -> S { self.source }
}

impl<S: ObjectSource<CronJob>> Searcher for CronJobSearcher<S> {
    type Object = CronJob;

    fn source(&self) -> &dyn ObjectSource<CronJob> { &self.source }

    fn kind(&self) -> &str { "CronJob" }

    fn derived_match_fields(&self) -> &[&str] { &[STATUS] }

    fn matches(&self, conditions: &BTreeMap<String, String>, item: &CronJob) -> Result<bool, SearchError> {
        for (k, v) in conditions {
            let ok = match k.as_str() {
                STATUS => cronjob_status(item) == v,
                _ => matches_exact(k, v, &item.metadata)?,
            };
            if !ok { return Ok(false); }
        }
        Ok(true)
    }

    // Never-run jobs sort first here, unlike absent creation timestamps which sort last.
    fn compare(&self, a: &CronJob, b: &CronJob, order_by: &str) -> bool {
        match order_by {
            LAST_SCHEDULE_TIME => absent_first(last_schedule_time(a), last_schedule_time(b))
                .then_with(|| by_name(&a.metadata, &b.metadata))
                .is_lt(),
            _ => less_by_metadata(&a.metadata, &b.metadata, order_by),
        }
    }
}
