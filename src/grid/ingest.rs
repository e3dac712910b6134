//! Map text parsing and grid extension
//!
//! Turns raw map text into a validated rectangular grid of single-character
//! tokens, then extends it with synthetic polar water rows so the texture
//! wraps cleanly at the top and bottom of the world.

use crate::core::error::{Error, Result};

/// Non-fatal data-quality condition observed while parsing map text.
///
/// Warnings are reported to the caller and logged; they never abort a build
/// and never change the deterministic output for a given input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestWarning {
    /// Rows had differing lengths; the grid was trimmed to the shortest.
    RaggedRows { min: usize, max: usize },
    /// The declared `WxH` header disagreed with the detected dimensions.
    /// Detected dimensions always win.
    HeaderMismatch {
        declared: (usize, usize),
        detected: (usize, usize),
    },
}

/// Validated rectangular token grid. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Grid {
    rows: Vec<Vec<char>>,
    width: usize,
}

impl Grid {
    /// Parse raw map text into a grid.
    ///
    /// Normalizes line endings, strips an optional leading `<width>x<height>`
    /// header, trims ragged rows to the minimum observed width, and reverses
    /// row order so row 0 is the southernmost row (world-space north-up
    /// convention; map sources are authored top row = north).
    pub fn parse(text: &str) -> Result<(Self, Vec<IngestWarning>)> {
        let mut warnings = Vec::new();

        let normalized = text.replace("\r\n", "\n");
        let mut lines: Vec<&str> = normalized.lines().collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }

        let declared = lines.first().and_then(|l| parse_dimension_header(l));
        if declared.is_some() {
            lines.remove(0);
        }

        if lines.is_empty() {
            return Err(Error::EmptyMap);
        }

        let min_len = lines.iter().map(|l| l.chars().count()).min().unwrap_or(0);
        let max_len = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        if min_len == 0 {
            return Err(Error::EmptyMap);
        }
        if min_len != max_len {
            log::warn!(
                "ragged map rows: widths {}..{}, trimming to {}",
                min_len, max_len, min_len
            );
            warnings.push(IngestWarning::RaggedRows { min: min_len, max: max_len });
        }

        // South-up storage: last source line becomes row 0.
        let rows: Vec<Vec<char>> = lines
            .iter()
            .rev()
            .map(|l| l.chars().take(min_len).collect())
            .collect();

        let detected = (min_len, rows.len());
        if let Some(d) = declared {
            if d != detected {
                log::warn!(
                    "map header declares {}x{} but grid is {}x{}",
                    d.0, d.1, detected.0, detected.1
                );
                warnings.push(IngestWarning::HeaderMismatch { declared: d, detected });
            }
        }

        Ok((Self { rows, width: min_len }, warnings))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Token at grid position. Row 0 is the southernmost row.
    pub fn token_at(&self, x: usize, y: usize) -> char {
        self.rows[y][x]
    }
}

/// Parse a `<width>x<height>` header line, e.g. `"4x3"`.
fn parse_dimension_header(line: &str) -> Option<(usize, usize)> {
    let (w, h) = line.trim().split_once(['x', 'X'])?;
    let w: usize = w.trim().parse().ok()?;
    let h: usize = h.trim().parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

/// Grid with synthetic polar water rows prepended and appended.
#[derive(Debug, Clone)]
pub struct ExtendedGrid {
    grid: Grid,
    pole_padding: usize,
    water_token: char,
}

impl ExtendedGrid {
    /// Extend a grid with `pole_padding` water rows at each pole.
    ///
    /// `pole_padding` is clamped to at least 1. Fails when no water token was
    /// resolved upstream, since the padding rows must be composed of it.
    pub fn extend(grid: Grid, water_token: Option<char>, pole_padding: usize) -> Result<Self> {
        let water_token = water_token.ok_or(Error::MissingWaterToken)?;
        Ok(Self {
            grid,
            pole_padding: pole_padding.max(1),
            water_token,
        })
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height() + 2 * self.pole_padding
    }

    pub fn pole_padding(&self) -> usize {
        self.pole_padding
    }

    pub fn water_token(&self) -> char {
        self.water_token
    }

    /// Dimensions of the source grid before extension.
    pub fn source_size(&self) -> (usize, usize) {
        (self.grid.width(), self.grid.height())
    }

    /// Token at extended-grid position. Rows inside the polar padding bands
    /// always yield the water token.
    pub fn token_at(&self, x: usize, y: usize) -> char {
        if y < self.pole_padding || y >= self.pole_padding + self.grid.height() {
            self.water_token
        } else {
            self.grid.token_at(x, y - self.pole_padding)
        }
    }
}
