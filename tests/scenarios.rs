use hllpp::{Config, HashAlgorithm, Hllpp};
use rayon::prelude::*;

fn config(p: u8) -> Config {
    Config::new(p, HashAlgorithm::Fast).unwrap()
}

fn key(i: u32) -> [u8; 4] {
    i.to_le_bytes()
}

/// Scenario 1: 10 distinct IPs, sparse mode, exact count.
#[test]
fn ten_distinct_ips_sparse_exact() {
    let sketch = Hllpp::new(config(14));
    for i in 0..10u32 {
        sketch.insert_ip(&format!("10.0.{}.{}", i / 256, i % 256)).unwrap();
    }
    assert!(!sketch.is_dense());
    assert_eq!(sketch.element_count(), 10);
}

/// Scenario 2: 20,000 distinct IPs, relative error under 5%.
#[test]
fn twenty_thousand_ips_under_five_percent_error() {
    let sketch = Hllpp::new(config(14));
    for i in 0..20_000u32 {
        sketch.insert_ip(&format!("10.{}.{}.{}", (i >> 16) & 0xFF, (i >> 8) & 0xFF, i & 0xFF))
            .unwrap();
    }
    let estimate = sketch.element_count() as f64;
    let error = (estimate - 20_000.0).abs() / 20_000.0;
    assert!(error < 0.05, "relative error {error} too high");
}

/// Scenario 3: 1,000,000 distinct inserts split across two threads; estimate within 2%, and the
/// sketch has promoted to dense by the end.
#[test]
fn one_million_inserts_across_two_threads() {
    let sketch = Hllpp::new(config(14));
    (0..2).into_par_iter().for_each(|half| {
        let base = half * 500_000u32;
        for i in 0..500_000u32 {
            sketch.insert_key(&key(base + i));
        }
    });

    assert!(sketch.is_dense());
    let estimate = sketch.element_count() as f64;
    let error = (estimate - 1_000_000.0).abs() / 1_000_000.0;
    assert!(error < 0.02, "relative error {error} too high");
}

/// Scenario 4: merge two disjoint 500k sketches; estimate of the merge is ~1,000,000 ±2%.
#[test]
fn merging_two_disjoint_dense_sketches() {
    let a = Hllpp::new(config(14));
    for i in 0..500_000u32 {
        a.insert_key(&key(i));
    }
    let b = Hllpp::new(config(14));
    for i in 500_000..1_000_000u32 {
        b.insert_key(&key(i));
    }

    a.merge(&b).unwrap();
    let estimate = a.element_count() as f64;
    let error = (estimate - 1_000_000.0).abs() / 1_000_000.0;
    assert!(error < 0.02, "relative error {error} too high");
}

/// Scenario 5: merge a 100-element sparse sketch into a 2,000,000-element dense sketch;
/// estimate within 2% of 2,000,100.
#[test]
fn merging_sparse_into_dense() {
    let sparse = Hllpp::new(config(14));
    for i in 0..100u32 {
        sparse.insert_key(&key(i + 10_000_000));
    }
    assert!(!sparse.is_dense());

    let dense = Hllpp::new(config(14));
    for i in 0..2_000_000u32 {
        dense.insert_key(&key(i));
    }
    assert!(dense.is_dense());

    dense.merge(&sparse).unwrap();
    let estimate = dense.element_count() as f64;
    let error = (estimate - 2_000_100.0).abs() / 2_000_100.0;
    assert!(error < 0.02, "relative error {error} too high");
}

/// Scenario 6: exporting a dense sketch and importing it elsewhere reproduces the same count
/// and the same wire bytes.
#[test]
fn dense_export_import_round_trip() {
    let sketch = Hllpp::new(config(13));
    for i in 0..200_000u32 {
        sketch.insert_key(&key(i));
    }
    assert!(sketch.is_dense());

    let bytes = sketch.export();
    let restored = Hllpp::import(&bytes).unwrap();

    assert!(restored.is_dense());
    assert_eq!(sketch.element_count(), restored.element_count());
    assert_eq!(bytes, restored.export());
}

#[test]
fn empty_sketch_counts_zero() {
    let sketch = Hllpp::new(config(12));
    assert_eq!(sketch.element_count(), 0);
}

/// Installs the same subscriber a host process would, then drives a promotion and a
/// mismatched-precision merge to confirm the `tracing` events emitted by `hllpp`/`dense`/`sparse`
/// are well-formed under a real subscriber rather than only under the default no-op one.
#[test]
fn library_events_are_well_formed_under_a_real_subscriber() {
    let _guard = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("hllpp=trace")
        .set_default();

    let sketch = Hllpp::new(config(10));
    for i in 0..50_000u32 {
        sketch.insert_key(&key(i));
    }
    assert!(sketch.is_dense());

    let mismatched = Hllpp::new(config(12));
    assert!(sketch.merge(&mismatched).is_err());
}

#[test]
fn cardinality_at_the_dense_switchover_point() {
    let sketch = Hllpp::new(config(10));
    let m = 1usize << 10;
    for i in 0..(m as u32) {
        sketch.insert_key(&key(i));
    }
    let estimate = sketch.element_count() as f64;
    let error = (estimate - m as f64).abs() / m as f64;
    assert!(error < 0.1, "relative error {error} too high at m boundary");
}
