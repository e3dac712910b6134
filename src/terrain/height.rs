//! Height derivation from terrain entries
//!
//! Table-driven: an explicit `height` hint on the entry always wins; without
//! one, the entry's description is matched against a keyword table carried
//! over from the original data set. The keyword table is data, not logic —
//! new classes are added by extending `KEYWORD_CLASSES`.

use super::classify::TerrainEntry;

/// Terrain height classes, ordered low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightClass {
    Water,
    Plain,
    Rough,
    Hill,
    Mountain,
    Peak,
}

impl HeightClass {
    /// Normalized height in [0, 1] for this class.
    pub fn normalized(self) -> f32 {
        match self {
            HeightClass::Water => 0.0,
            HeightClass::Plain => 0.18,
            HeightClass::Rough => 0.34,
            HeightClass::Hill => 0.55,
            HeightClass::Mountain => 0.82,
            HeightClass::Peak => 1.0,
        }
    }
}

/// Description keywords -> height class. First match wins; more specific
/// keywords come first.
const KEYWORD_CLASSES: &[(&str, HeightClass)] = &[
    ("peak", HeightClass::Peak),
    ("summit", HeightClass::Peak),
    ("mountain", HeightClass::Mountain),
    ("volcano", HeightClass::Mountain),
    ("hill", HeightClass::Hill),
    ("highland", HeightClass::Hill),
    ("plateau", HeightClass::Hill),
    ("forest", HeightClass::Rough),
    ("swamp", HeightClass::Rough),
    ("rough", HeightClass::Rough),
    ("ocean", HeightClass::Water),
    ("sea", HeightClass::Water),
    ("lake", HeightClass::Water),
    ("river", HeightClass::Water),
];

/// Normalized height in [0, 1] for a terrain entry.
///
/// Water cells are always 0 regardless of entry content. An explicit height
/// hint is clamped to [0, 1]; otherwise the description is matched against
/// the keyword table, defaulting to `Plain`.
pub fn normalized_height(entry: Option<&TerrainEntry>, is_water: bool) -> f32 {
    if is_water {
        return 0.0;
    }
    let Some(entry) = entry else {
        return HeightClass::Plain.normalized();
    };
    if let Some(h) = entry.height {
        return h.clamp(0.0, 1.0);
    }
    class_for_description(entry.description.as_deref()).normalized()
}

/// True when a cell of this entry contributes to the mountain-influence mask.
pub fn is_mountainous(entry: Option<&TerrainEntry>, is_water: bool) -> bool {
    if is_water {
        return false;
    }
    match entry {
        Some(entry) => {
            if let Some(h) = entry.height {
                return h >= HeightClass::Mountain.normalized();
            }
            matches!(
                class_for_description(entry.description.as_deref()),
                HeightClass::Mountain | HeightClass::Peak
            )
        }
        None => false,
    }
}

fn class_for_description(description: Option<&str>) -> HeightClass {
    let Some(description) = description else {
        return HeightClass::Plain;
    };
    let lower = description.to_ascii_lowercase();
    KEYWORD_CLASSES
        .iter()
        .find(|(kw, _)| lower.contains(kw))
        .map(|(_, class)| *class)
        .unwrap_or(HeightClass::Plain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(description: Option<&str>, height: Option<f32>) -> TerrainEntry {
        TerrainEntry {
            color: "#808080".to_string(),
            description: description.map(str::to_string),
            height,
        }
    }

    #[test]
    fn water_is_always_zero() {
        let e = entry(Some("mountain"), Some(0.9));
        assert_eq!(normalized_height(Some(&e), true), 0.0);
    }

    #[test]
    fn explicit_hint_beats_keywords() {
        let e = entry(Some("mountain"), Some(0.3));
        assert_eq!(normalized_height(Some(&e), false), 0.3);
    }

    #[test]
    fn hint_clamped_to_unit_range() {
        let e = entry(None, Some(2.5));
        assert_eq!(normalized_height(Some(&e), false), 1.0);
    }

    #[test]
    fn keyword_ladder() {
        for (desc, class) in [
            ("Snowy peak", HeightClass::Peak),
            ("Mountain range", HeightClass::Mountain),
            ("Rolling hills", HeightClass::Hill),
            ("Dense forest", HeightClass::Rough),
            ("Open steppe", HeightClass::Plain),
        ] {
            let e = entry(Some(desc), None);
            assert_eq!(
                normalized_height(Some(&e), false),
                class.normalized(),
                "description {:?}",
                desc
            );
        }
    }

    #[test]
    fn missing_entry_defaults_to_plain() {
        assert_eq!(
            normalized_height(None, false),
            HeightClass::Plain.normalized()
        );
    }

    #[test]
    fn mountain_detection() {
        assert!(is_mountainous(Some(&entry(Some("mountain"), None)), false));
        assert!(is_mountainous(Some(&entry(None, Some(0.9))), false));
        assert!(!is_mountainous(Some(&entry(Some("forest"), None)), false));
        assert!(!is_mountainous(Some(&entry(Some("mountain"), None)), true));
    }
}
