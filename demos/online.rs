//! Online clustering of a small synthetic query workload.
//!
//! Pass a directory of per-template CSV files to cluster real data instead:
//!
//! ```text
//! RUST_LOG=info cargo run --example online -- path/to/templates 0.8
//! ```

use chrono::{Duration, NaiveDate};
use drift::{ClusterId, OnlineClustering, SparseTimeSeries, Workload};

fn synthetic() -> Workload {
    let t0 = NaiveDate::from_ymd_opt(2016, 10, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let daily = |days: std::ops::Range<i64>, minutes: &[i64], count: u64| -> SparseTimeSeries {
        days.flat_map(|d| minutes.iter().map(move |m| (d * 1440 + m, count)))
            .map(|(m, c)| (t0 + Duration::minutes(m), c))
            .collect()
    };

    Workload::from_series([
        // Morning batch jobs
        ("SELECT * FROM orders WHERE day = $1".to_string(), daily(0..7, &[360, 361, 362], 40)),
        ("UPDATE orders SET state = $1".to_string(), daily(0..7, &[360, 361, 362], 8)),
        // Evening reporting
        ("SELECT sum(total) FROM orders".to_string(), daily(0..7, &[1200, 1260], 3)),
        ("SELECT count(*) FROM users".to_string(), daily(0..7, &[1200, 1260], 5)),
        // Shows up mid-week
        ("INSERT INTO audit VALUES ($1)".to_string(), daily(3..7, &[600], 12)),
    ])
}

fn main() -> drift::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let workload = match args.next() {
        Some(dir) => Workload::from_csv_dir(dir)?,
        None => synthetic(),
    };
    let rho = args.next().and_then(|r| r.parse().ok()).unwrap_or(0.8);

    let outcome = OnlineClustering::new(rho).with_seed(42).fit(&workload)?;

    println!(
        "=== {} windows, {} clusters created ===",
        outcome.windows(),
        outcome.clusters_created
    );
    for (at, snapshot) in &outcome.history {
        let assigned = snapshot.values().filter(|a| a.is_assigned()).count();
        println!("  {at}: {assigned}/{} assigned", snapshot.len());
    }

    println!("\n=== final clusters ===");
    let mut live: Vec<ClusterId> = outcome
        .final_assignments()
        .into_iter()
        .flatten()
        .filter_map(|(_, a)| a.cluster())
        .collect();
    live.sort();
    live.dedup();
    for id in live {
        println!("  cluster {id} (total {}):", outcome.cluster_totals[&id]);
        for member in outcome.members_of(id) {
            println!("    {member}");
        }
    }

    println!(
        "\n{} of {} occurrences attributed to clusters",
        outcome.total_attributed(),
        workload.grand_total()
    );
    Ok(())
}
