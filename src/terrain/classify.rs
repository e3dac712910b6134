//! Terrain classification tables and water-palette resolution
//!
//! All classifier sources (terrain table, water-token list, color overrides)
//! are optional at the source: fetch or parse failures fall back to built-in
//! defaults. A build never fails solely because terrain metadata is missing.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// Fallback color for tokens with no terrain-table entry. Deliberately loud.
pub const MISSING_ENTRY_COLOR: Rgb = Rgb { r: 0xff, g: 0x00, b: 0xff };

/// Hard fallback for the primary water token when every other layer misses.
const WATER_FALLBACK_COLOR: Rgb = Rgb { r: 0x1b, g: 0x3f, b: 0x66 };

/// Built-in default water palette, keyed by token.
const DEFAULT_WATER_PALETTE: &[(char, Rgb)] = &[
    ('~', Rgb { r: 0x27, g: 0x53, b: 0x7f }),
    ('=', Rgb { r: 0x2e, g: 0x62, b: 0x93 }),
];

/// Token used by the minimal built-in table when no sources are available.
const DEFAULT_WATER_TOKEN: char = '~';

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Parse a `#rrggbb` hex string. A missing leading `#` is tolerated.
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }
}

/// One terrain-table entry, keyed by grid token.
#[derive(Debug, Clone, Deserialize)]
pub struct TerrainEntry {
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub height: Option<f32>,
}

/// Token -> terrain entry table.
#[derive(Debug, Clone)]
pub struct TerrainLookup {
    entries: HashMap<char, TerrainEntry>,
}

impl TerrainLookup {
    /// Parse a terrain table from JSON (`{"1": {"color": "#ff0000"}, ...}`).
    /// Multi-character keys are ignored with a warning.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let raw: HashMap<String, TerrainEntry> = serde_json::from_str(text)?;
        let mut entries = HashMap::with_capacity(raw.len());
        for (key, entry) in raw {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(token), None) => {
                    entries.insert(token, entry);
                }
                _ => log::warn!("terrain table key {:?} is not a single token, skipping", key),
            }
        }
        Ok(Self { entries })
    }

    /// Minimal built-in table: a single default water entry. Used when the
    /// terrain table source is unreachable or malformed.
    pub fn fallback() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            DEFAULT_WATER_TOKEN,
            TerrainEntry {
                color: "#27537f".to_string(),
                description: Some("ocean".to_string()),
                height: Some(0.0),
            },
        );
        Self { entries }
    }

    pub fn get(&self, token: char) -> Option<&TerrainEntry> {
        self.entries.get(&token)
    }

    pub fn color_of(&self, token: char) -> Option<Rgb> {
        self.entries.get(&token).and_then(|e| Rgb::parse(&e.color))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolved water token -> color mapping. The primary token always has an
/// entry.
#[derive(Debug, Clone)]
pub struct WaterPalette {
    colors: HashMap<char, Rgb>,
    primary: char,
}

/// First-match-wins over an ordered list of resolvers.
fn first_match(resolvers: &[&dyn Fn() -> Option<Rgb>]) -> Option<Rgb> {
    resolvers.iter().find_map(|r| r())
}

impl WaterPalette {
    /// Resolve colors for every water token.
    ///
    /// Per-token chain: explicit override -> built-in default palette ->
    /// terrain-table color -> (primary token only) hard fallback.
    /// The primary token is the first token with a usable color, else the
    /// first token in the list; selection is deterministic.
    pub fn resolve(
        tokens: &[char],
        overrides: &HashMap<char, Rgb>,
        lookup: &TerrainLookup,
    ) -> Self {
        let tokens: Vec<char> = if tokens.is_empty() {
            vec![DEFAULT_WATER_TOKEN]
        } else {
            tokens.to_vec()
        };

        let mut colors = HashMap::with_capacity(tokens.len());
        for &token in &tokens {
            let resolved = first_match(&[
                &|| overrides.get(&token).copied(),
                &|| {
                    DEFAULT_WATER_PALETTE
                        .iter()
                        .find(|(t, _)| *t == token)
                        .map(|(_, c)| *c)
                },
                &|| lookup.color_of(token),
            ]);
            if let Some(color) = resolved {
                colors.insert(token, color);
            }
        }

        let primary = tokens
            .iter()
            .copied()
            .find(|t| colors.contains_key(t))
            .unwrap_or(tokens[0]);
        colors.entry(primary).or_insert(WATER_FALLBACK_COLOR);

        Self { colors, primary }
    }

    pub fn primary(&self) -> char {
        self.primary
    }

    pub fn color_of(&self, token: char) -> Option<Rgb> {
        self.colors.get(&token).copied()
    }

    /// Color of the primary water token. Always resolvable.
    pub fn primary_color(&self) -> Rgb {
        self.colors[&self.primary]
    }
}

/// Wire format of the water-token list: `{"water": ["4", "~"]}`.
#[derive(Debug, Deserialize)]
struct WaterListDoc {
    water: Vec<String>,
}

/// Wire format of the override document: either `{"4": "#001122"}` or
/// `{"colors": {"4": "#001122"}}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OverrideDoc {
    Wrapped { colors: HashMap<String, String> },
    Flat(HashMap<String, String>),
}

/// Fully resolved classification inputs for one build.
#[derive(Debug, Clone)]
pub struct Classification {
    pub lookup: TerrainLookup,
    pub palette: WaterPalette,
    pub water_tokens: Vec<char>,
}

impl Classification {
    pub fn is_water(&self, token: char) -> bool {
        self.water_tokens.contains(&token)
    }

    pub fn primary_water(&self) -> char {
        self.palette.primary()
    }

    /// Build a classification from already-fetched source texts. Each source
    /// is optional; parse failures fall back per layer.
    pub fn from_sources(
        terrain_json: Option<&str>,
        water_json: Option<&str>,
        overrides_json: Option<&str>,
    ) -> Self {
        let lookup = match terrain_json {
            Some(text) => TerrainLookup::from_json(text).unwrap_or_else(|e| {
                log::warn!("terrain table unparseable ({}), using built-in fallback", e);
                TerrainLookup::fallback()
            }),
            None => {
                log::warn!("terrain table unavailable, using built-in fallback");
                TerrainLookup::fallback()
            }
        };

        let water_tokens: Vec<char> = water_json
            .and_then(|text| match serde_json::from_str::<WaterListDoc>(text) {
                Ok(doc) => Some(
                    doc.water
                        .iter()
                        .filter_map(|s| s.chars().next())
                        .collect(),
                ),
                Err(e) => {
                    log::warn!("water-token list unparseable ({}), using default", e);
                    None
                }
            })
            .unwrap_or_else(|| vec![DEFAULT_WATER_TOKEN]);

        let overrides: HashMap<char, Rgb> = overrides_json
            .and_then(|text| match serde_json::from_str::<OverrideDoc>(text) {
                Ok(OverrideDoc::Wrapped { colors }) | Ok(OverrideDoc::Flat(colors)) => {
                    Some(parse_override_colors(colors))
                }
                Err(e) => {
                    log::warn!("water-color overrides unparseable ({}), ignoring", e);
                    None
                }
            })
            .unwrap_or_default();

        let palette = WaterPalette::resolve(&water_tokens, &overrides, &lookup);
        Self {
            lookup,
            palette,
            water_tokens,
        }
    }

    /// Read classification sources from disk. Missing files degrade to the
    /// per-layer fallbacks, exactly like unreachable URLs.
    pub async fn load(
        terrain_path: Option<&Path>,
        water_path: Option<&Path>,
        overrides_path: Option<&Path>,
    ) -> Self {
        let terrain = read_optional(terrain_path).await;
        let water = read_optional(water_path).await;
        let overrides = read_optional(overrides_path).await;
        Self::from_sources(terrain.as_deref(), water.as_deref(), overrides.as_deref())
    }
}

fn parse_override_colors(raw: HashMap<String, String>) -> HashMap<char, Rgb> {
    raw.iter()
        .filter_map(|(key, hex)| {
            let token = key.chars().next()?;
            let color = Rgb::parse(hex)?;
            Some((token, color))
        })
        .collect()
}

async fn read_optional(path: Option<&Path>) -> Option<String> {
    let path = path?;
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Some(text),
        Err(e) => {
            log::warn!("could not read {}: {}", path.display(), e);
            None
        }
    }
}
