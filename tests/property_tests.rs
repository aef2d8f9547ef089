use chrono::{Duration, NaiveDate};
use drift::cluster::{
    similarity, Assignment, ClusterEngine, ClusterEvent, EngineState, Window, WindowSampler,
};
use drift::{OnlineClustering, SparseTimeSeries, Timestamp, Workload};
use proptest::prelude::*;

fn t0() -> Timestamp {
    NaiveDate::from_ymd_opt(2016, 12, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn at(day: i64, minute: i64) -> Timestamp {
    t0() + Duration::minutes(day * 1440 + minute)
}

/// Up to six entities with a handful of points each over five days. Minutes are
/// drawn from a narrow band so that patterns overlap often enough to cluster.
fn workloads() -> impl Strategy<Value = Workload> {
    prop::collection::vec(
        prop::collection::vec((0i64..5, 0i64..12, 1u64..6), 1..12),
        1..6,
    )
    .prop_map(|entities| {
        let mut series: Vec<(String, SparseTimeSeries)> = entities
            .into_iter()
            .enumerate()
            .map(|(i, points)| {
                let s = points
                    .into_iter()
                    .map(|(d, m, c)| (at(d, m * 5), c))
                    .collect();
                (format!("q{i}"), s)
            })
            .collect();
        // Pin the span to five full days.
        series.push((
            "zz-anchor".to_string(),
            [(at(0, 0), 1), (at(5, 0), 1)].into_iter().collect(),
        ));
        Workload::from_series(series)
    })
}

proptest! {
    #[test]
    fn prop_similarity_is_symmetric_and_bounded(
        a in prop::collection::vec(0u64..50, 1..40),
        b in prop::collection::vec(0u64..50, 1..40),
    ) {
        let n = a.len().max(b.len()) as i64;
        let samples: Vec<Timestamp> = (0..n).map(|m| at(0, m)).collect();
        let to_series = |counts: &[u64]| -> SparseTimeSeries {
            counts
                .iter()
                .enumerate()
                .map(|(i, c)| (at(0, i as i64), *c))
                .collect()
        };
        let x = to_series(&a);
        let y = to_series(&b);

        let xy = similarity(&x, &y, &samples);
        let yx = similarity(&y, &x, &samples);
        prop_assert_eq!(xy, yx);
        prop_assert!(xy >= 0.0);
        prop_assert!(xy < 1.0);
    }

    #[test]
    fn prop_seeded_runs_are_identical(w in workloads(), seed in 0u64..1000) {
        // A small cap forces actual random sampling.
        let model = OnlineClustering::new(0.6).with_sample_cap(200).with_seed(seed);
        let first = model.fit(&w).unwrap();
        let second = model.fit(&w).unwrap();
        prop_assert_eq!(first.history, second.history);
        prop_assert_eq!(first.cluster_totals, second.cluster_totals);
        prop_assert_eq!(first.clusters_created, second.clusters_created);
    }

    #[test]
    fn prop_cluster_ids_are_monotonic(w in workloads(), rho in 0.0f64..1.0) {
        let out = OnlineClustering::new(rho).with_seed(5).fit(&w).unwrap();

        let founded: Vec<u64> = out
            .events
            .iter()
            .filter_map(|(_, e)| match e {
                ClusterEvent::Created { cluster, .. } | ClusterEvent::Recreated { cluster, .. } => {
                    Some(cluster.0)
                }
                _ => None,
            })
            .collect();
        prop_assert!(founded.windows(2).all(|p| p[0] < p[1]));
        prop_assert_eq!(founded.len() as u64, out.clusters_created);
        prop_assert_eq!(out.cluster_totals.len() as u64, out.clusters_created);

        // Every snapshot only uses ids that had been handed out by then.
        for (_, snapshot) in &out.history {
            for a in snapshot.values() {
                if let Assignment::AssignedTo(id) = a {
                    prop_assert!(id.0 < out.clusters_created);
                }
            }
        }
    }

    #[test]
    fn prop_centers_conserve_member_contributions(w in workloads(), rho in 0.0f64..1.0) {
        // Drive the engine by hand with a one-day lookback so the bound moves.
        let mut engine = ClusterEngine::new(&w, rho, WindowSampler::new(10_000, Some(9)));
        let mut state = EngineState::new(w.entities());
        for day in 0..5 {
            let window = Window {
                lookback: at((day - 1).max(0), 0),
                current: at(day, 0),
                next: at(day + 1, 0),
            };
            state = engine.step(state, &window).unwrap().state;

            for (id, cluster) in &state.clusters {
                let mut expected = SparseTimeSeries::new();
                for (entity, a) in &state.assignments {
                    if *a == Assignment::AssignedTo(*id) {
                        expected.add_range(w.series(entity).unwrap(), window.lookback, window.next);
                    }
                }
                let actual: SparseTimeSeries = cluster
                    .center
                    .range(window.lookback, window.next)
                    .map(|(t, c)| (*t, *c))
                    .collect();
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
