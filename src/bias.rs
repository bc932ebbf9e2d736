use serde::Deserialize;

const K_NEIGHBORS: usize = 6;

#[derive(Deserialize)]
struct RawPoint {
    raw_estimate: f64,
    bias: f64,
}

/// Fixed threshold table from the HLL++ paper, indexed by precision `p` in `[4, 18]`. Below
/// this, `element_count` prefers linear counting over the bias-corrected raw estimate.
const THRESHOLDS: [(u8, u64); 15] = [
    (4, 10),
    (5, 20),
    (6, 40),
    (7, 80),
    (8, 220),
    (9, 400),
    (10, 900),
    (11, 1800),
    (12, 3100),
    (13, 6500),
    (14, 11500),
    (15, 20000),
    (16, 50000),
    (17, 120000),
    (18, 350000),
];

pub fn threshold(p: u8) -> u64 {
    THRESHOLDS
        .iter()
        .find(|&&(precision, _)| precision == p)
        .map(|&(_, t)| t)
        .unwrap_or(u64::MAX)
}

/// Embedded per-precision bias tables are compiled in at build time via `include_str!`,
/// mirroring the `//go:embed` pattern in the reference sources, parsed once at construction.
/// Only a representative subset of precisions ship with a real table; `for_precision` falls
/// back to the nearest embedded precision for the rest rather than panicking, since the full
/// 15-precision table is the output of an external Monte-Carlo generation tool out of scope
/// for this crate (see DESIGN.md).
pub struct BiasTable {
    points: Vec<(f64, f64)>,
}

const EMBEDDED_PRECISIONS: [u8; 5] = [10, 12, 14, 16, 18];

const EMBEDDED_TABLES: [&str; 5] = [
    include_str!("../data/bias_data_p10.json"),
    include_str!("../data/bias_data_p12.json"),
    include_str!("../data/bias_data_p14.json"),
    include_str!("../data/bias_data_p16.json"),
    include_str!("../data/bias_data_p18.json"),
];

impl BiasTable {
    pub fn for_precision(p: u8) -> Self {
        let nearest = EMBEDDED_PRECISIONS
            .iter()
            .copied()
            .min_by_key(|&candidate| (candidate as i16 - p as i16).abs())
            .expect("EMBEDDED_PRECISIONS is non-empty");
        let slot = EMBEDDED_PRECISIONS
            .iter()
            .position(|&precision| precision == nearest)
            .unwrap();

        let raw: Vec<RawPoint> =
            serde_json::from_str(EMBEDDED_TABLES[slot]).expect("embedded bias table is valid JSON");
        let mut points: Vec<(f64, f64)> = raw.into_iter().map(|p| (p.raw_estimate, p.bias)).collect();
        points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        BiasTable { points }
    }
}

/// Empirical bias lookup: k=6 nearest-neighbor simple mean around the raw estimate's sorted
/// position. Uses a plain mean rather than inverse-distance weighting, matching the reference
/// implementation's `GetCorrection`.
pub struct BiasCorrector {
    table: BiasTable,
}

impl BiasCorrector {
    pub fn for_precision(p: u8) -> Self {
        BiasCorrector {
            table: BiasTable::for_precision(p),
        }
    }

    pub fn correction(&self, raw_estimate: f64) -> f64 {
        let points = &self.table.points;
        if points.is_empty() {
            return 0.0;
        }

        let k = K_NEIGHBORS.min(points.len());
        let idx = points.partition_point(|&(re, _)| re < raw_estimate);

        let mut lo = idx.saturating_sub(k / 2);
        let mut hi = lo + k;
        if hi > points.len() {
            hi = points.len();
            lo = hi - k;
        }

        let window = &points[lo..hi];
        window.iter().map(|&(_, bias)| bias).sum::<f64>() / window.len() as f64
    }
}
