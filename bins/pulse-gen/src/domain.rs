use serde_json::json;

const LOCATIONS: &[&str] = &["tokyo", "osaka", "nagoya", "fukuoka", "sapporo"];
const ZONES: &[&str] = &["zone-a", "zone-b", "zone-c"];

// ═══════════════════════════════════════════════════════════════
//  RNG (xorshift64)
// ═══════════════════════════════════════════════════════════════

pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: i64) -> Self {
        let state = if seed == 0 {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
                | 1 // ensure non-zero
        } else {
            seed as u64
        };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Returns f64 in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64)
    }

    pub fn next_intn(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        let v = lo + self.next_f64() * (hi - lo);
        (v * 100.0).round() / 100.0
    }
}

// ═══════════════════════════════════════════════════════════════
//  Sample records
// ═══════════════════════════════════════════════════════════════

/// One sensor record. `malformed` swaps humidity for a non-numeric value
/// to exercise the pipeline's quarantine path.
pub fn sample(rng: &mut Rng, sources: usize, malformed: bool) -> serde_json::Value {
    let mut record = json!({
        "source": format!("sensor-{}", rng.next_intn(sources.max(1)) + 1),
        "metrics": {
            "temperature": rng.uniform(20.0, 35.0),
            "humidity": rng.uniform(30.0, 80.0),
            "pressure": rng.uniform(1000.0, 1020.0),
            "cpu_usage": rng.uniform(10.0, 90.0),
            "memory_usage": rng.uniform(20.0, 85.0),
            "network_throughput": rng.uniform(100.0, 1000.0),
        },
        "relationships": {
            "device_id": format!("device-{}", rng.next_intn(5) + 1),
            "location": LOCATIONS[rng.next_intn(LOCATIONS.len())],
            "zone": ZONES[rng.next_intn(ZONES.len())],
        },
    });
    if malformed {
        record["metrics"]["humidity"] = json!("n/a");
    }
    record
}
