//! Heart-rate zone tables and classification
//!
//! A zone table holds five contiguous bpm ranges plus the wearer's maximum heart
//! rate. Everything that differs per zone (configuration keys, display name, color,
//! default share of max heart rate) lives in the single [`ZONE_SPECS`] lookup table.

use crate::config::ConfigStore;
use crate::error::ZoneError;
use crate::types::{UNCLASSIFIED_ZONE, ZONE_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration key for the maximum heart rate
pub const MAX_HEART_RATE_KEY: &str = "maxHeartRate";

/// Configuration key for the session target zone
pub const TARGET_ZONE_KEY: &str = "targetZone";

/// Fallback maximum heart rate when nothing is configured
pub const DEFAULT_MAX_HEART_RATE: u16 = 190;

/// Static per-zone data
#[derive(Debug, Clone, Copy)]
pub struct ZoneSpec {
    pub zone: u8,
    pub name: &'static str,
    /// Display color (hex RGB)
    pub color: &'static str,
    pub min_key: &'static str,
    pub max_key: &'static str,
    /// Upper bound of the zone as a share of max heart rate (default tables)
    pub upper_fraction: f64,
}

/// Lookup table indexed by `zone - 1`
pub const ZONE_SPECS: [ZoneSpec; ZONE_COUNT] = [
    ZoneSpec {
        zone: 1,
        name: "Warm Up",
        color: "#8E8E93",
        min_key: "zone1Min",
        max_key: "zone1Max",
        upper_fraction: 0.60,
    },
    ZoneSpec {
        zone: 2,
        name: "Fat Burn",
        color: "#0A84FF",
        min_key: "zone2Min",
        max_key: "zone2Max",
        upper_fraction: 0.70,
    },
    ZoneSpec {
        zone: 3,
        name: "Aerobic",
        color: "#30D158",
        min_key: "zone3Min",
        max_key: "zone3Max",
        upper_fraction: 0.80,
    },
    ZoneSpec {
        zone: 4,
        name: "Anaerobic",
        color: "#FF9F0A",
        min_key: "zone4Min",
        max_key: "zone4Max",
        upper_fraction: 0.90,
    },
    ZoneSpec {
        zone: 5,
        name: "Peak",
        color: "#FF453A",
        min_key: "zone5Min",
        max_key: "zone5Max",
        upper_fraction: 1.00,
    },
];

/// Look up the static data for a zone (1-5)
pub fn zone_spec(zone: u8) -> Option<&'static ZoneSpec> {
    if is_valid_zone(zone) {
        ZONE_SPECS.get(usize::from(zone) - 1)
    } else {
        None
    }
}

/// Whether `zone` names one of the five zones
pub fn is_valid_zone(zone: u8) -> bool {
    (1..=ZONE_COUNT as u8).contains(&zone)
}

/// Estimate maximum heart rate from age (220 - age)
pub fn estimate_max_heart_rate(age_years: u16) -> u16 {
    220u16.saturating_sub(age_years).max(1)
}

/// A configuration key understood by the zone table and the sync channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ZoneMin(u8),
    ZoneMax(u8),
    MaxHeartRate,
    TargetZone,
}

impl ConfigKey {
    /// Parse a wire/storage key; unknown keys yield `None`
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            MAX_HEART_RATE_KEY => return Some(ConfigKey::MaxHeartRate),
            TARGET_ZONE_KEY => return Some(ConfigKey::TargetZone),
            _ => {}
        }
        ZONE_SPECS.iter().find_map(|spec| {
            if spec.min_key == key {
                Some(ConfigKey::ZoneMin(spec.zone))
            } else if spec.max_key == key {
                Some(ConfigKey::ZoneMax(spec.zone))
            } else {
                None
            }
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::ZoneMin(zone) => zone_spec(*zone).map_or("", |s| s.min_key),
            ConfigKey::ZoneMax(zone) => zone_spec(*zone).map_or("", |s| s.max_key),
            ConfigKey::MaxHeartRate => MAX_HEART_RATE_KEY,
            ConfigKey::TargetZone => TARGET_ZONE_KEY,
        }
    }

    /// The eleven keys that describe a zone table
    pub fn table_keys() -> Vec<ConfigKey> {
        let mut keys = Vec::with_capacity(ZONE_COUNT * 2 + 1);
        for spec in &ZONE_SPECS {
            keys.push(ConfigKey::ZoneMin(spec.zone));
            keys.push(ConfigKey::ZoneMax(spec.zone));
        }
        keys.push(ConfigKey::MaxHeartRate);
        keys
    }
}

/// Parse a decimal-integer configuration value
pub fn parse_bpm(key: &str, value: &str) -> Result<u16, ZoneError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| ZoneError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Parse a target zone value (1-5)
pub fn parse_target_zone(value: &str) -> Result<u8, ZoneError> {
    let zone = value
        .trim()
        .parse::<u8>()
        .map_err(|_| ZoneError::InvalidValue {
            key: TARGET_ZONE_KEY.to_string(),
            value: value.to_string(),
        })?;
    if is_valid_zone(zone) {
        Ok(zone)
    } else {
        Err(ZoneError::InvalidZoneIndex(zone))
    }
}

/// Inclusive bpm range of one zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneBoundary {
    pub zone: u8,
    pub min: u16,
    pub max: u16,
}

impl ZoneBoundary {
    pub fn contains(&self, bpm: u16) -> bool {
        self.min <= bpm && bpm <= self.max
    }
}

#[derive(Deserialize)]
struct RawZoneTable {
    zones: Vec<ZoneBoundary>,
    max_heart_rate: u16,
}

/// Five validated, contiguous zones plus maximum heart rate.
///
/// A `ZoneTable` can only be obtained through validating constructors (including
/// deserialization), so a table in hand is always well formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawZoneTable")]
pub struct ZoneTable {
    zones: [ZoneBoundary; ZONE_COUNT],
    max_heart_rate: u16,
}

impl TryFrom<RawZoneTable> for ZoneTable {
    type Error = ZoneError;

    fn try_from(raw: RawZoneTable) -> Result<Self, Self::Error> {
        let mut ranges = [(0u16, 0u16); ZONE_COUNT];
        if raw.zones.len() != ZONE_COUNT {
            return Err(ZoneError::WrongZoneCount(raw.zones.len()));
        }
        for (i, boundary) in raw.zones.iter().enumerate() {
            if usize::from(boundary.zone) != i + 1 {
                return Err(ZoneError::InvalidZoneIndex(boundary.zone));
            }
            ranges[i] = (boundary.min, boundary.max);
        }
        ZoneTable::from_ranges(ranges, raw.max_heart_rate)
    }
}

impl Default for ZoneTable {
    fn default() -> Self {
        Self::from_max_heart_rate(DEFAULT_MAX_HEART_RATE)
    }
}

impl ZoneTable {
    /// Build a table from `(min, max)` pairs for zones 1-5
    pub fn from_ranges(
        ranges: [(u16, u16); ZONE_COUNT],
        max_heart_rate: u16,
    ) -> Result<Self, ZoneError> {
        let table = Self {
            zones: ranges_to_boundaries(ranges),
            max_heart_rate,
        };
        table.validate()?;
        Ok(table)
    }

    /// Standard five-zone model derived from maximum heart rate.
    ///
    /// Zone 1 starts at 0 bpm; zone 5 ends at `max_heart_rate`.
    pub fn from_max_heart_rate(max_heart_rate: u16) -> Self {
        // Small inputs collapse the percentage bands, so keep at least one bpm per zone
        let max_hr = max_heart_rate.max(ZONE_COUNT as u16);
        let mut ranges = [(0u16, 0u16); ZONE_COUNT];
        let mut next_min = 0u16;
        for (i, spec) in ZONE_SPECS.iter().enumerate() {
            let remaining_zones = (ZONE_COUNT - 1 - i) as u16;
            let max = if i == ZONE_COUNT - 1 {
                max_hr
            } else {
                let upper = (f64::from(max_hr) * spec.upper_fraction).round() as u16;
                upper
                    .saturating_sub(1)
                    .max(next_min)
                    .min(max_hr - remaining_zones)
            };
            ranges[i] = (next_min, max);
            next_min = max + 1;
        }
        Self {
            zones: ranges_to_boundaries(ranges),
            max_heart_rate: max_hr,
        }
    }

    /// Check inversion and contiguity of all boundaries
    pub fn validate(&self) -> Result<(), ZoneError> {
        if self.max_heart_rate == 0 {
            return Err(ZoneError::InvalidMaxHeartRate(self.max_heart_rate));
        }
        for (i, boundary) in self.zones.iter().enumerate() {
            if usize::from(boundary.zone) != i + 1 {
                return Err(ZoneError::InvalidZoneIndex(boundary.zone));
            }
            if boundary.min > boundary.max {
                return Err(ZoneError::InvertedBoundary {
                    zone: boundary.zone,
                    min: boundary.min,
                    max: boundary.max,
                });
            }
        }
        for pair in self.zones.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            if u32::from(lower.max) + 1 != u32::from(upper.min) {
                return Err(ZoneError::NonContiguous {
                    lower: lower.zone,
                    upper: upper.zone,
                    max: lower.max,
                    min: upper.min,
                });
            }
        }
        Ok(())
    }

    pub fn zones(&self) -> &[ZoneBoundary; ZONE_COUNT] {
        &self.zones
    }

    /// Boundary of a zone (1-5)
    pub fn zone(&self, zone: u8) -> Option<&ZoneBoundary> {
        if is_valid_zone(zone) {
            self.zones.get(usize::from(zone) - 1)
        } else {
            None
        }
    }

    pub fn max_heart_rate(&self) -> u16 {
        self.max_heart_rate
    }

    /// Classify a reading against this table
    pub fn classify(&self, bpm: f64) -> u8 {
        classify(bpm, self)
    }

    /// Current value of a table key as a decimal string
    pub fn value_of(&self, key: ConfigKey) -> Option<String> {
        match key {
            ConfigKey::ZoneMin(zone) => self.zone(zone).map(|b| b.min.to_string()),
            ConfigKey::ZoneMax(zone) => self.zone(zone).map(|b| b.max.to_string()),
            ConfigKey::MaxHeartRate => Some(self.max_heart_rate.to_string()),
            ConfigKey::TargetZone => None,
        }
    }

    /// Return a copy with one table field replaced, validated as a whole.
    ///
    /// `TargetZone` is not a table field and leaves the table unchanged.
    pub fn with_value(&self, key: ConfigKey, value: &str) -> Result<Self, ZoneError> {
        let mut ranges = self.ranges();
        let mut max_heart_rate = self.max_heart_rate;
        match key {
            ConfigKey::ZoneMin(zone) => {
                let idx = zone_slot(zone)?;
                ranges[idx].0 = parse_bpm(key.as_str(), value)?;
            }
            ConfigKey::ZoneMax(zone) => {
                let idx = zone_slot(zone)?;
                ranges[idx].1 = parse_bpm(key.as_str(), value)?;
            }
            ConfigKey::MaxHeartRate => {
                max_heart_rate = parse_bpm(key.as_str(), value)?;
            }
            ConfigKey::TargetZone => return Ok(self.clone()),
        }
        Self::from_ranges(ranges, max_heart_rate)
    }

    /// Read a table from a configuration store, falling back to `fallback` for
    /// keys the store does not hold
    pub fn from_store(store: &dyn ConfigStore, fallback: &ZoneTable) -> Result<Self, ZoneError> {
        Self::from_entries(&store.entries(), fallback)
    }

    /// Build a table from flat key/value pairs, falling back to `fallback` for
    /// missing keys. Keys that are not table fields are ignored.
    pub fn from_entries(
        entries: &BTreeMap<String, String>,
        fallback: &ZoneTable,
    ) -> Result<Self, ZoneError> {
        let mut ranges = fallback.ranges();
        let mut max_heart_rate = fallback.max_heart_rate;
        for key in ConfigKey::table_keys() {
            let Some(value) = entries.get(key.as_str()) else {
                continue;
            };
            let bpm = parse_bpm(key.as_str(), value)?;
            match key {
                ConfigKey::ZoneMin(zone) => ranges[zone_slot(zone)?].0 = bpm,
                ConfigKey::ZoneMax(zone) => ranges[zone_slot(zone)?].1 = bpm,
                ConfigKey::MaxHeartRate => max_heart_rate = bpm,
                ConfigKey::TargetZone => {}
            }
        }
        Self::from_ranges(ranges, max_heart_rate)
    }

    /// Write every table key to a configuration store
    pub fn write_to_store(&self, store: &dyn ConfigStore) {
        for (key, value) in self.entries() {
            store.set(key, &value);
        }
    }

    /// `(key, value)` pairs for every table field, zones first
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        ConfigKey::table_keys()
            .into_iter()
            .filter_map(|key| self.value_of(key).map(|value| (key.as_str(), value)))
            .collect()
    }

    /// Flat `zone{n}{Min,Max}` map used as session metadata
    pub fn to_metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        for (spec, boundary) in ZONE_SPECS.iter().zip(self.zones.iter()) {
            metadata.insert(spec.min_key.to_string(), boundary.min.to_string());
            metadata.insert(spec.max_key.to_string(), boundary.max.to_string());
        }
        metadata
    }

    fn ranges(&self) -> [(u16, u16); ZONE_COUNT] {
        let mut ranges = [(0u16, 0u16); ZONE_COUNT];
        for (slot, boundary) in ranges.iter_mut().zip(self.zones.iter()) {
            *slot = (boundary.min, boundary.max);
        }
        ranges
    }
}

fn zone_slot(zone: u8) -> Result<usize, ZoneError> {
    if is_valid_zone(zone) {
        Ok(usize::from(zone) - 1)
    } else {
        Err(ZoneError::InvalidZoneIndex(zone))
    }
}

fn ranges_to_boundaries(ranges: [(u16, u16); ZONE_COUNT]) -> [ZoneBoundary; ZONE_COUNT] {
    let mut zones = [ZoneBoundary {
        zone: 0,
        min: 0,
        max: 0,
    }; ZONE_COUNT];
    for (i, (min, max)) in ranges.into_iter().enumerate() {
        zones[i] = ZoneBoundary {
            zone: ZONE_SPECS[i].zone,
            min,
            max,
        };
    }
    zones
}

/// Map a heart-rate reading to a zone (1-5), or 0 when it fits no zone.
///
/// Readings are rounded to the nearest whole bpm. Negative and non-finite
/// readings, and readings against a malformed table, are unclassified.
pub fn classify(bpm: f64, table: &ZoneTable) -> u8 {
    if !bpm.is_finite() || bpm < 0.0 || table.validate().is_err() {
        return UNCLASSIFIED_ZONE;
    }
    let rounded = bpm.round();
    if rounded > f64::from(u16::MAX) {
        return UNCLASSIFIED_ZONE;
    }
    let bpm = rounded as u16;
    table
        .zones
        .iter()
        .find(|boundary| boundary.contains(bpm))
        .map_or(UNCLASSIFIED_ZONE, |boundary| boundary.zone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InMemoryConfigStore;
    use pretty_assertions::assert_eq;

    fn reference_table() -> ZoneTable {
        ZoneTable::from_ranges(
            [(0, 131), (132, 144), (145, 156), (157, 167), (168, 220)],
            220,
        )
        .unwrap()
    }

    #[test]
    fn test_reference_boundaries() {
        let table = reference_table();
        assert_eq!(classify(131.0, &table), 1);
        assert_eq!(classify(132.0, &table), 2);
        assert_eq!(classify(0.0, &table), 1);
        assert_eq!(classify(221.0, &table), 0);
    }

    #[test]
    fn test_shared_boundaries_go_to_lower_zone() {
        let table = reference_table();
        for pair in table.zones().windows(2) {
            assert_eq!(classify(f64::from(pair[0].max), &table), pair[0].zone);
            assert_eq!(classify(f64::from(pair[1].min), &table), pair[1].zone);
        }
    }

    #[test]
    fn test_every_reading_gets_exactly_one_zone() {
        let table = reference_table();
        for bpm in 0..=300u16 {
            let zone = classify(f64::from(bpm), &table);
            assert!(zone <= 5);
            let members = table
                .zones()
                .iter()
                .filter(|b| b.contains(bpm))
                .count();
            if zone == 0 {
                assert_eq!(members, 0);
            } else {
                assert_eq!(members, 1);
            }
        }
    }

    #[test]
    fn test_fractional_and_invalid_readings() {
        let table = reference_table();
        assert_eq!(classify(131.4, &table), 1);
        assert_eq!(classify(131.6, &table), 2);
        assert_eq!(classify(-1.0, &table), 0);
        assert_eq!(classify(f64::NAN, &table), 0);
        assert_eq!(classify(f64::INFINITY, &table), 0);
        assert_eq!(classify(1.0e9, &table), 0);
    }

    #[test]
    fn test_below_zone_one_is_unclassified() {
        let table = ZoneTable::from_ranges(
            [(100, 119), (120, 139), (140, 159), (160, 179), (180, 200)],
            200,
        )
        .unwrap();
        assert_eq!(table.classify(99.0), 0);
        assert_eq!(table.classify(100.0), 1);
        assert_eq!(table.classify(200.0), 5);
        assert_eq!(table.classify(201.0), 0);
    }

    #[test]
    fn test_rejects_inverted_and_gapped_tables() {
        let inverted = ZoneTable::from_ranges(
            [(0, 131), (150, 144), (145, 156), (157, 167), (168, 220)],
            220,
        );
        assert!(matches!(
            inverted,
            Err(ZoneError::InvertedBoundary { zone: 2, .. })
        ));

        let gapped = ZoneTable::from_ranges(
            [(0, 131), (133, 144), (145, 156), (157, 167), (168, 220)],
            220,
        );
        assert!(matches!(
            gapped,
            Err(ZoneError::NonContiguous {
                lower: 1,
                upper: 2,
                ..
            })
        ));

        let overlapping = ZoneTable::from_ranges(
            [(0, 131), (131, 144), (145, 156), (157, 167), (168, 220)],
            220,
        );
        assert!(overlapping.is_err());
    }

    #[test]
    fn test_from_max_heart_rate() {
        let table = ZoneTable::from_max_heart_rate(200);
        let ranges: Vec<(u16, u16)> = table.zones().iter().map(|b| (b.min, b.max)).collect();
        assert_eq!(
            ranges,
            vec![(0, 119), (120, 139), (140, 159), (160, 179), (180, 200)]
        );
        assert!(table.validate().is_ok());

        for max in [1u16, 5, 10, 60, 150, 220, 400] {
            assert!(ZoneTable::from_max_heart_rate(max).validate().is_ok());
        }
    }

    #[test]
    fn test_estimate_max_heart_rate() {
        assert_eq!(estimate_max_heart_rate(30), 190);
        assert_eq!(estimate_max_heart_rate(250), 1);
    }

    #[test]
    fn test_config_key_round_trip() {
        for key in ConfigKey::table_keys() {
            assert_eq!(ConfigKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(ConfigKey::parse("targetZone"), Some(ConfigKey::TargetZone));
        assert_eq!(ConfigKey::parse("zone2Max"), Some(ConfigKey::ZoneMax(2)));
        assert_eq!(ConfigKey::parse("zone6Max"), None);
        assert_eq!(ConfigKey::parse("name"), None);
    }

    #[test]
    fn test_each_zone_writes_its_own_key() {
        let table = reference_table();
        let metadata = table.to_metadata();
        assert_eq!(metadata.len(), 10);
        assert_eq!(metadata["zone1Max"], "131");
        assert_eq!(metadata["zone2Min"], "132");
        assert_eq!(metadata["zone3Min"], "145");
        assert_eq!(metadata["zone4Max"], "167");
        assert_eq!(metadata["zone5Max"], "220");
    }

    #[test]
    fn test_with_value_validates_whole_table() {
        let table = reference_table();
        let moved = table.with_value(ConfigKey::ZoneMax(2), "150");
        assert!(moved.is_err());

        let widened = table
            .with_value(ConfigKey::ZoneMax(5), "230")
            .unwrap();
        assert_eq!(widened.zone(5).unwrap().max, 230);

        assert!(matches!(
            table.with_value(ConfigKey::ZoneMin(1), "abc"),
            Err(ZoneError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_store_round_trip() {
        let store = InMemoryConfigStore::new();
        let table = reference_table();
        table.write_to_store(&store);
        let loaded = ZoneTable::from_store(&store, &ZoneTable::default()).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_from_store_uses_fallback_for_missing_keys() {
        let store = InMemoryConfigStore::new();
        store.set(MAX_HEART_RATE_KEY, "221");
        let loaded = ZoneTable::from_store(&store, &reference_table()).unwrap();
        assert_eq!(loaded.max_heart_rate(), 221);
        assert_eq!(loaded.zones(), reference_table().zones());
    }

    #[test]
    fn test_deserialize_rejects_malformed_table() {
        let json = r#"{
            "zones": [
                {"zone": 1, "min": 0, "max": 131},
                {"zone": 2, "min": 140, "max": 144},
                {"zone": 3, "min": 145, "max": 156},
                {"zone": 4, "min": 157, "max": 167},
                {"zone": 5, "min": 168, "max": 220}
            ],
            "max_heart_rate": 220
        }"#;
        assert!(serde_json::from_str::<ZoneTable>(json).is_err());

        let valid = serde_json::to_string(&reference_table()).unwrap();
        let parsed: ZoneTable = serde_json::from_str(&valid).unwrap();
        assert_eq!(parsed, reference_table());
    }

    #[test]
    fn test_parse_target_zone() {
        assert_eq!(parse_target_zone("3").unwrap(), 3);
        assert!(matches!(
            parse_target_zone("6"),
            Err(ZoneError::InvalidZoneIndex(6))
        ));
        assert!(parse_target_zone("x").is_err());
    }
}
