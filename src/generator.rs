use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::rngs::{StdRng, ThreadRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::clock::{Clock, MonotonicStamp};
use crate::domain::{BatchConfig, LightMode, Resolution};

pub const SCANNER_MODEL: &str = "Zeiss Axioscan 7";

const ROCK_TYPES: [&str; 7] = [
    "Sandstone",
    "Limestone",
    "Granite",
    "Basalt",
    "Shale",
    "Marble",
    "Quartzite",
];
const FORMATIONS: [&str; 6] = [
    "Bakken",
    "Eagle Ford",
    "Permian",
    "Marcellus",
    "Haynesville",
    "Utica",
];
const MINERAL_ASSEMBLAGES: [[&str; 3]; 5] = [
    ["Quartz", "Feldspar", "Mica"],
    ["Calcite", "Dolomite", "Quartz"],
    ["Quartz", "Feldspar", "Biotite"],
    ["Plagioclase", "Pyroxene", "Olivine"],
    ["Clay", "Quartz", "Feldspar"],
];
const TEXTURES: [&str; 3] = ["Fine-grained", "Medium-grained", "Coarse-grained"];
const COLORS: [&str; 5] = ["Gray", "Brown", "Red", "White", "Black"];

const BASE_LAT: f64 = 30.2672;
const BASE_LNG: f64 = -97.7431;
const GEO_JITTER_DEG: f64 = 0.1;

pub trait RandomSource {
    fn next_f64(&mut self) -> f64;

    fn pick_index(&mut self, len: usize) -> usize {
        ((self.next_f64() * len as f64) as usize).min(len.saturating_sub(1))
    }

    fn in_range(&mut self, low: f64, high: f64) -> f64 {
        low + self.next_f64() * (high - low)
    }
}

impl RandomSource for StdRng {
    fn next_f64(&mut self) -> f64 {
        self.random::<f64>()
    }
}

impl RandomSource for ThreadRng {
    fn next_f64(&mut self) -> f64 {
        self.random::<f64>()
    }
}

fn pick<'a, T>(rng: &mut dyn RandomSource, items: &'a [T]) -> &'a T {
    &items[rng.pick_index(items.len())]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionLocation {
    pub lat: f64,
    pub lng: f64,
    pub state: String,
    pub county: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionMetadata {
    pub grain_size_mm: f64,
    pub porosity_percent: f64,
    pub texture: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub id: String,
    pub thin_section_id: String,
    pub name: String,
    pub rock_type: String,
    pub formation: String,
    pub minerals: Vec<String>,
    pub location: SectionLocation,
    pub scan_date: DateTime<Utc>,
    pub scanner: String,
    pub resolution: Resolution,
    pub light_mode: LightMode,
    pub metadata: SectionMetadata,
    pub view_path: String,
    pub tiled_preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOutput {
    pub batch_id: String,
    pub sections: Vec<GeneratedSection>,
    pub total_size_gb: f64,
    pub total_frames: u32,
    pub scan_time_secs: f64,
    pub checksum: String,
    pub generated_at: DateTime<Utc>,
}

impl ScanOutput {
    pub fn total_size_display(&self) -> String {
        format!("{:.2}", self.total_size_gb)
    }

    pub fn scan_time_display(&self) -> String {
        format!("{:.1}s", self.scan_time_secs)
    }
}

pub struct ScanGenerator {
    clock: Arc<dyn Clock>,
    stamps: MonotonicStamp,
}

impl ScanGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            stamps: MonotonicStamp::default(),
        }
    }

    pub fn generate(&mut self, config: &BatchConfig, rng: &mut dyn RandomSource) -> ScanOutput {
        let stamp = self.stamps.next(self.clock.as_ref());
        let now = self.clock.now();
        let sections = (0..config.num_sections)
            .map(|index| generate_section(config, stamp, index, now, rng))
            .collect::<Vec<_>>();
        let checksum = checksum(&sections, rng);
        let scan_time_secs = (rng.in_range(15.0, 30.0) * 10.0).floor() / 10.0;

        ScanOutput {
            batch_id: format!("batch-{stamp}"),
            sections,
            total_size_gb: config.total_size_gb(),
            total_frames: config.total_frames(),
            scan_time_secs,
            checksum,
            generated_at: now,
        }
    }
}

fn generate_section(
    config: &BatchConfig,
    stamp: u64,
    index: u32,
    now: DateTime<Utc>,
    rng: &mut dyn RandomSource,
) -> GeneratedSection {
    let rock_type = *pick(rng, &ROCK_TYPES);
    let formation = *pick(rng, &FORMATIONS);
    let minerals = pick(rng, &MINERAL_ASSEMBLAGES)
        .iter()
        .map(|mineral| mineral.to_string())
        .collect();
    let id = format!("section-{stamp}-{index}");
    let thin_section_id = format!("TS-{:06}", rng.pick_index(100_000));
    let location = SectionLocation {
        lat: BASE_LAT + (rng.next_f64() - 0.5) * GEO_JITTER_DEG,
        lng: BASE_LNG + (rng.next_f64() - 0.5) * GEO_JITTER_DEG,
        state: "Texas".to_string(),
        county: "Travis".to_string(),
    };
    let metadata = SectionMetadata {
        grain_size_mm: round_to(rng.in_range(0.1, 2.1), 2),
        porosity_percent: round_to(rng.in_range(2.0, 17.0), 1),
        texture: pick(rng, &TEXTURES).to_string(),
        color: pick(rng, &COLORS).to_string(),
    };

    GeneratedSection {
        name: format!("{formation} {rock_type} Sample {}", index + 1),
        rock_type: rock_type.to_string(),
        formation: formation.to_string(),
        minerals,
        location,
        scan_date: now,
        scanner: SCANNER_MODEL.to_string(),
        resolution: config.resolution,
        light_mode: config.light_mode,
        metadata,
        view_path: format!("/view/{id}"),
        tiled_preview: format!("/media/pyramids/{id}/"),
        thin_section_id,
        id,
    }
}

fn checksum(sections: &[GeneratedSection], rng: &mut dyn RandomSource) -> String {
    let mut hasher = Sha256::new();
    if let Ok(payload) = serde_json::to_vec(sections) {
        hasher.update(payload);
    }
    let salt: [u8; 16] = std::array::from_fn(|_| rng.pick_index(256) as u8);
    hasher.update(salt);
    hex::encode(hasher.finalize())
}

/// Truncates so values stay inside the half-open range they were drawn from.
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).floor() / factor
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::clock::ManualClock;

    fn generator() -> ScanGenerator {
        ScanGenerator::new(Arc::new(ManualClock::starting_at_millis(1_700_000_000_000)))
    }

    #[test]
    fn ultra_both_five_sections() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = BatchConfig::clamped(5, LightMode::Both, Resolution::Ultra);
        let output = generator().generate(&config, &mut rng);
        assert_eq!(output.total_size_gb, 187.5);
        assert_eq!(output.total_frames, 10);
        assert_eq!(output.sections.len(), 5);
    }

    #[test]
    fn stamps_are_unique_with_a_frozen_clock() {
        let mut generator = generator();
        let mut rng = StdRng::seed_from_u64(1);
        let config = BatchConfig::clamped(2, LightMode::PlaneLight, Resolution::High);
        let first = generator.generate(&config, &mut rng);
        let second = generator.generate(&config, &mut rng);
        assert_ne!(first.batch_id, second.batch_id);
        let mut ids: Vec<&str> = first
            .sections
            .iter()
            .chain(second.sections.iter())
            .map(|section| section.id.as_str())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn values_stay_in_range() {
        let mut generator = generator();
        let mut rng = StdRng::seed_from_u64(99);
        let config = BatchConfig::clamped(40, LightMode::PolarizedLight, Resolution::High);
        let output = generator.generate(&config, &mut rng);
        assert_eq!(output.checksum.len(), 64);
        assert!(output.checksum.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert!((15.0..30.0).contains(&output.scan_time_secs));
        for section in &output.sections {
            assert!((0.1..2.1).contains(&section.metadata.grain_size_mm));
            assert!((2.0..17.0).contains(&section.metadata.porosity_percent));
            assert!((section.location.lat - BASE_LAT).abs() <= 0.05);
            assert!((section.location.lng - BASE_LNG).abs() <= 0.05);
            assert!(section.thin_section_id.starts_with("TS-"));
            assert_eq!(section.thin_section_id.len(), 9);
            assert!(section.view_path.starts_with('/'));
            assert!(section.tiled_preview.starts_with("/media/"));
            assert!(MINERAL_ASSEMBLAGES
                .iter()
                .any(|set| set.iter().copied().eq(section.minerals.iter().map(String::as_str))));
        }
    }

    #[test]
    fn size_display_has_two_decimals() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = BatchConfig::clamped(1, LightMode::PlaneLight, Resolution::High);
        let output = generator().generate(&config, &mut rng);
        assert_eq!(output.total_size_display(), "25.00");
        assert!(output.scan_time_display().ends_with('s'));
    }
}
