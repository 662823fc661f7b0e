//! Property-based tests for the query contract using proptest.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, CronJobStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use proptest::prelude::*;
use quarry_core::{WorldSnapshot, ALL_NAMESPACES};
use quarry_search::{Conditions, CronJobSearcher, SearchRequest, Searcher, LAST_SCHEDULE_TIME};

// ============================================================================
// Test helpers
// ============================================================================

const PREFIXES: [&str; 4] = ["nightly", "weekly", "report", "backup"];
const NAMESPACES: [&str; 2] = ["ops", "tools"];
const APPS: [&str; 3] = ["web", "api", "batch"];
const ORDER_KEYS: [&str; 5] = ["name", "namespace", "createTime", LAST_SCHEDULE_TIME, "unknownKey"];

#[derive(Debug, Clone)]
struct Spec {
    prefix: usize,
    ns: usize,
    app: usize,
    suspend: Option<bool>,
    last: Option<u8>,
    created: Option<u8>,
}

fn spec_strategy() -> impl Strategy<Value = Spec> {
    (0..PREFIXES.len(), 0..NAMESPACES.len(), 0..APPS.len(), any::<Option<bool>>(), any::<Option<u8>>(), any::<Option<u8>>())
        .prop_map(|(prefix, ns, app, suspend, last, created)| Spec { prefix, ns, app, suspend, last, created })
}

fn at(hour: u8) -> Time { Time(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(hour as i64 % 8)) }

// Names are unique (index suffix); timestamps collide often so ties are exercised.
fn build(specs: &[Spec]) -> Vec<CronJob> {
    specs
        .iter()
        .enumerate()
        .map(|(i, s)| CronJob {
            metadata: ObjectMeta {
                name: Some(format!("{}-{i:03}", PREFIXES[s.prefix])),
                namespace: Some(NAMESPACES[s.ns].to_string()),
                labels: Some([("app".to_string(), APPS[s.app].to_string())].into_iter().collect()),
                creation_timestamp: s.created.map(at),
                ..Default::default()
            },
            spec: Some(CronJobSpec { schedule: "@daily".into(), suspend: s.suspend, ..Default::default() }),
            status: Some(CronJobStatus { last_schedule_time: s.last.map(at), ..Default::default() }),
        })
        .collect()
}

fn searcher(specs: &[Spec]) -> CronJobSearcher<WorldSnapshot<CronJob>> {
    CronJobSearcher::new(WorldSnapshot::new(1, build(specs)))
}

fn keys(v: &[Arc<CronJob>]) -> Vec<String> {
    v.iter().map(|o| format!("{}/{}", o.metadata.namespace.as_deref().unwrap_or(""), o.metadata.name.as_deref().unwrap_or(""))).collect()
}

fn key_set(v: &[Arc<CronJob>]) -> BTreeSet<String> { keys(v).into_iter().collect() }

fn exact_strategy() -> impl Strategy<Value = Conditions> {
    (prop::option::of(prop::bool::ANY), prop::option::of(0..APPS.len())).prop_map(|(paused, app)| {
        let mut c = Conditions::new();
        if let Some(p) = paused { c = c.with_match("status", if p { "paused" } else { "running" }); }
        if let Some(a) = app { c = c.with_match("label:app", APPS[a]); }
        c
    })
}

fn fuzzy_strategy() -> impl Strategy<Value = Conditions> {
    (prop::option::of("[a-z]{0,3}"), prop::option::of(0..NAMESPACES.len())).prop_map(|(frag, ns)| {
        let mut c = Conditions::new();
        if let Some(f) = frag { c = c.with_fuzzy("name", f); }
        if let Some(n) = ns { c = c.with_fuzzy("namespace", &NAMESPACES[n][..2]); }
        c
    })
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    /// An empty condition set returns the whole namespace.
    #[test]
    fn empty_conditions_return_everything(
        specs in prop::collection::vec(spec_strategy(), 0..40),
        ns in prop::sample::select(vec!["ops", "tools", ALL_NAMESPACES]),
        order in prop::sample::select(ORDER_KEYS.to_vec()),
        reverse in any::<bool>(),
    ) {
        let s = searcher(&specs);
        let hits = s.search(&SearchRequest::new(ns).order_by(order).reverse(reverse)).unwrap();
        let want = build(&specs).into_iter().filter(|o| ns.is_empty() || o.metadata.namespace.as_deref() == Some(ns)).count();
        prop_assert_eq!(hits.len(), want);
    }

    /// Merging condition sets intersects their results.
    #[test]
    fn merged_conditions_intersect(
        specs in prop::collection::vec(spec_strategy(), 0..40),
        c1 in exact_strategy(),
        c2 in fuzzy_strategy(),
    ) {
        let s = searcher(&specs);
        let run = |c: &Conditions| key_set(&s.search(&SearchRequest::all_namespaces().with_conditions(c.clone())).unwrap());
        let both = run(&c1.merged(&c2));
        let expected: BTreeSet<String> = run(&c1).intersection(&run(&c2)).cloned().collect();
        prop_assert_eq!(both, expected);
    }

    /// Results never grow the namespace and every hit satisfies the conditions.
    #[test]
    fn hits_satisfy_conditions(
        specs in prop::collection::vec(spec_strategy(), 0..40),
        c1 in exact_strategy(),
        c2 in fuzzy_strategy(),
    ) {
        let s = searcher(&specs);
        let c = c1.merged(&c2);
        let hits = s.search(&SearchRequest::all_namespaces().with_conditions(c.clone())).unwrap();
        prop_assert!(hits.len() <= specs.len());
        for h in hits.iter() {
            prop_assert!(s.matches(&c.matches, h).unwrap());
            prop_assert!(s.fuzzy(&c.fuzzy, h).unwrap());
        }
    }

    /// With unique names, descending by name is exactly ascending reversed.
    #[test]
    fn reverse_is_an_involution_without_ties(
        specs in prop::collection::vec(spec_strategy(), 0..40),
    ) {
        let s = searcher(&specs);
        let asc = keys(&s.search(&SearchRequest::new("ops").order_by("name")).unwrap());
        let mut desc = keys(&s.search(&SearchRequest::new("ops").order_by("name").reverse(true)).unwrap());
        desc.reverse();
        prop_assert_eq!(asc, desc);
    }

    /// Output is sorted under the adapter's relation in both directions, so tied
    /// elements are always adjacent.
    #[test]
    fn output_respects_comparator(
        specs in prop::collection::vec(spec_strategy(), 0..40),
        order in prop::sample::select(ORDER_KEYS.to_vec()),
        reverse in any::<bool>(),
    ) {
        let s = searcher(&specs);
        let hits = s.search(&SearchRequest::all_namespaces().order_by(order).reverse(reverse)).unwrap();
        for w in hits.windows(2) {
            let (a, b) = (&w[0], &w[1]);
            if reverse {
                prop_assert!(!s.compare(a, b, order));
            } else {
                prop_assert!(!s.compare(b, a, order));
            }
        }
    }

    /// The comparator is irreflexive and asymmetric for every key.
    #[test]
    fn comparator_is_strict(
        specs in prop::collection::vec(spec_strategy(), 1..20),
        order in prop::sample::select(ORDER_KEYS.to_vec()),
    ) {
        let items = build(&specs);
        let s = searcher(&[]);
        for a in items.iter() {
            prop_assert!(!s.compare(a, a, order));
            for b in items.iter() {
                prop_assert!(!(s.compare(a, b, order) && s.compare(b, a, order)));
            }
        }
    }
}
