use chrono::{Duration, NaiveDate};
use drift::cluster::{similarity, Assignment, ClusterEvent, ClusterId, SearchMode};
use drift::{OnlineClustering, SingletonPolicy, SparseTimeSeries, Timestamp, Workload};

fn t0() -> Timestamp {
    NaiveDate::from_ymd_opt(2017, 2, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn at(day: i64, minute: i64) -> Timestamp {
    t0() + Duration::minutes(day * 1440 + minute)
}

/// `count` occurrences at each of `minutes` on each day in `days`.
fn daily(days: std::ops::Range<i64>, minutes: &[i64], count: u64) -> SparseTimeSeries {
    days.flat_map(|d| minutes.iter().map(move |m| (at(d, *m), count)))
        .collect()
}

fn workload(entities: Vec<(&str, SparseTimeSeries)>) -> Workload {
    Workload::from_series(entities.into_iter().map(|(k, s)| (k.to_string(), s)))
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn identical_series_share_a_cluster() {
    init_logger();
    let w = workload(vec![
        ("a", daily(0..6, &[60, 61, 300], 4)),
        ("b", daily(0..6, &[60, 61, 300], 4)),
        ("c", daily(0..6, &[900], 2)),
    ]);

    for search in [SearchMode::Indexed, SearchMode::Exhaustive] {
        let out = OnlineClustering::new(0.5)
            .with_search(search)
            .with_seed(11)
            .fit(&w)
            .unwrap();
        for (_, snapshot) in out.history.iter().skip(1) {
            assert!(snapshot["a"].is_assigned());
            assert_eq!(snapshot["a"], snapshot["b"]);
            assert_ne!(snapshot["a"], snapshot["c"]);
        }
    }
}

#[test]
fn disjoint_patterns_never_share_a_cluster() {
    init_logger();
    let w = workload(vec![
        ("early", daily(0..3, &[100, 200], 6)),
        ("late", daily(4..7, &[100, 200], 6)),
    ]);
    let out = OnlineClustering::new(0.9).with_seed(2).fit(&w).unwrap();
    assert!(out.windows() >= 6);
    for (_, snapshot) in &out.history {
        if let Assignment::AssignedTo(id) = snapshot["early"] {
            assert_ne!(snapshot["late"], Assignment::AssignedTo(id));
        }
    }
    assert!(!out
        .events
        .iter()
        .any(|(_, e)| matches!(e, ClusterEvent::Merged { .. })));
}

#[test]
fn zero_threshold_keeps_one_cluster() {
    init_logger();
    let w = workload(vec![
        ("a", daily(0..5, &[10, 20], 1)),
        ("b", daily(0..5, &[20, 30], 7)),
        ("c", daily(0..5, &[10, 30], 3)),
        ("idle", SparseTimeSeries::new()),
    ]);
    let out = OnlineClustering::new(0.0).with_seed(4).fit(&w).unwrap();

    assert_eq!(out.clusters_created, 1);
    for (_, snapshot) in out.history.iter().skip(1) {
        for entity in ["a", "b", "c"] {
            assert_eq!(snapshot[entity], Assignment::AssignedTo(ClusterId(0)));
        }
        assert_eq!(snapshot["idle"], Assignment::Unassigned);
    }
    assert_eq!(out.members_of(ClusterId(0)), vec!["a", "b", "c"]);
}

#[test]
fn similarity_equal_to_threshold_does_not_match() {
    init_logger();
    // "a" also has a point on day 1 so the workload spans exactly one window.
    let mut a = daily(0..1, &[0], 3);
    a.record(at(0, 1), 4);
    a.record(at(1, 0), 1);
    let mut b = daily(0..1, &[0], 4);
    b.record(at(0, 1), 3);
    let w = workload(vec![("a", a.clone()), ("b", b.clone())]);

    let samples: Vec<Timestamp> = (0..1440).map(|m| at(0, m)).collect();
    let mut first_day = SparseTimeSeries::new();
    first_day.add_range(&a, at(0, 0), at(1, 0));
    let rho = similarity(&b, &first_day, &samples);
    assert!(rho > 0.9 && rho < 1.0);

    for search in [SearchMode::Indexed, SearchMode::Exhaustive] {
        let at_threshold = OnlineClustering::new(rho)
            .with_search(search)
            .with_seed(1)
            .fit(&w)
            .unwrap();
        let last = at_threshold.final_assignments().unwrap();
        assert_eq!(at_threshold.windows(), 1);
        assert_ne!(last["a"], last["b"], "{search:?}");

        let just_below = OnlineClustering::new(rho - 1e-9)
            .with_search(search)
            .with_seed(1)
            .fit(&w)
            .unwrap();
        let last = just_below.final_assignments().unwrap();
        assert_eq!(last["a"], last["b"], "{search:?}");
    }
}

#[test]
fn merged_clusters_carry_all_members_to_the_survivor() {
    init_logger();
    // Day 0: "a" and "b" arrive with different shapes and found two clusters.
    // From day 1 both follow "c"'s shape, which pulls their centers close enough
    // to merge.
    let mut a = daily(0..1, &[100], 5);
    a.add_all(&daily(1..8, &[500, 501], 5));
    let mut b = daily(0..1, &[900], 5);
    b.add_all(&daily(1..8, &[500, 501], 5));
    let w = workload(vec![("a", a), ("b", b), ("c", daily(1..8, &[500, 501], 5))]);

    let out = OnlineClustering::new(0.6)
        .with_singletons(SingletonPolicy::Keep)
        .with_seed(8)
        .fit(&w)
        .unwrap();

    let first = &out.history[1].1;
    assert_ne!(first["a"], first["b"]);

    let last = out.final_assignments().unwrap();
    assert!(last["a"].is_assigned());
    assert_eq!(last["a"], last["b"]);
    assert_eq!(last["a"], last["c"]);

    // No snapshot ever points at a cluster that a merge retired before it.
    let mut retired = Vec::new();
    for (label, snapshot) in &out.history {
        for (when, e) in &out.events {
            if let ClusterEvent::Merged { absorbed, .. } = e {
                if when == label {
                    retired.push(*absorbed);
                }
            }
        }
        for a in snapshot.values() {
            if let Some(id) = a.cluster() {
                assert!(!retired.contains(&id));
            }
        }
    }
}

#[test]
fn loads_and_clusters_a_csv_directory() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, template: &str, series: &SparseTimeSeries| {
        let mut body = format!("{},\"{template}\"\n", series.total());
        for (t, c) in series.iter() {
            body.push_str(&format!("{},{c}\n", t.format("%Y-%m-%d %H:%M:%S")));
        }
        std::fs::write(dir.path().join(name), body).unwrap();
    };
    write("0.csv", "SELECT * FROM a WHERE id = $1", &daily(0..4, &[30, 31], 9));
    write("1.csv", "SELECT * FROM b WHERE id = $1", &daily(0..4, &[30, 31], 2));
    write("2.csv", "UPDATE c SET x = $1", &daily(0..4, &[1200], 1));

    let w = Workload::from_csv_dir(dir.path()).unwrap();
    assert_eq!(w.len(), 3);
    let out = OnlineClustering::new(0.8).with_seed(3).fit(&w).unwrap();
    let last = out.final_assignments().unwrap();
    assert_eq!(
        last["SELECT * FROM a WHERE id = $1"],
        last["SELECT * FROM b WHERE id = $1"]
    );
    assert_ne!(
        last["SELECT * FROM a WHERE id = $1"],
        last["UPDATE c SET x = $1"]
    );
}
