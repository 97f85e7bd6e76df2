//! 2-D word projections and their rendering as JSON or SVG.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EmbedError, Result};
use crate::tsne::{TsneConfig, tsne};
use crate::vectors::KeyedVectors;

/// Category10 palette; cluster ids wrap around it.
const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];
const DEFAULT_COLOR: &str = "#1f77b4";
const MARGIN: f32 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedWord {
    pub word: String,
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub points: Vec<ProjectedWord>,
}

impl Projection {
    pub fn new(points: Vec<(String, f32, f32)>) -> Self {
        Self {
            points: points
                .into_iter()
                .map(|(word, x, y)| ProjectedWord {
                    word,
                    x,
                    y,
                    cluster: None,
                })
                .collect(),
        }
    }

    /// Run t-SNE over the vectors of `words`.
    pub fn from_vectors<S: AsRef<str>>(
        vectors: &KeyedVectors,
        words: &[S],
        config: &TsneConfig,
    ) -> Result<Self> {
        let rows = words
            .iter()
            .map(|w| vectors.get(w.as_ref()).map(<[f32]>::to_vec))
            .collect::<Result<Vec<_>>>()?;
        let coords = tsne(&rows, config)?;
        Ok(Self::new(
            words
                .iter()
                .zip(coords)
                .map(|(w, [x, y])| (w.as_ref().to_string(), x, y))
                .collect(),
        ))
    }

    /// Attach one cluster label per point.
    pub fn with_clusters(mut self, labels: &[usize]) -> Result<Self> {
        if labels.len() != self.points.len() {
            return Err(EmbedError::InvalidArgument(format!(
                "{} cluster labels for {} points",
                labels.len(),
                self.points.len()
            )));
        }
        for (point, &label) in self.points.iter_mut().zip(labels) {
            point.cluster = Some(label);
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        info!(path = %path.as_ref().display(), points = self.len(), "projection saved");
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Render a standalone SVG scatter plot with a text label per point.
    pub fn to_svg(&self, width: u32, height: u32) -> String {
        let (w, h) = (width as f32, height as f32);
        let (min_x, max_x) = bounds(self.points.iter().map(|p| p.x));
        let (min_y, max_y) = bounds(self.points.iter().map(|p| p.y));
        let sx = (w - 2.0 * MARGIN) / (max_x - min_x).max(f32::EPSILON);
        let sy = (h - 2.0 * MARGIN) / (max_y - min_y).max(f32::EPSILON);

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
        );
        let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
        for p in &self.points {
            let cx = MARGIN + (p.x - min_x) * sx;
            // SVG y grows downwards
            let cy = h - MARGIN - (p.y - min_y) * sy;
            let color = p
                .cluster
                .map_or(DEFAULT_COLOR, |c| PALETTE[c % PALETTE.len()]);
            let _ = writeln!(
                svg,
                r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="3" fill="{color}"/>"#
            );
            let _ = writeln!(
                svg,
                r#"<text x="{:.2}" y="{:.2}" font-family="sans-serif" font-size="10" fill="{color}">{}</text>"#,
                cx + 4.0,
                cy - 4.0,
                escape(&p.word)
            );
        }
        svg.push_str("</svg>\n");
        svg
    }

    pub fn save_svg<P: AsRef<Path>>(&self, path: P, width: u32, height: u32) -> Result<()> {
        fs::write(path.as_ref(), self.to_svg(width, height))?;
        info!(path = %path.as_ref().display(), points = self.len(), "plot saved");
        Ok(())
    }
}

fn bounds(values: impl Iterator<Item = f32>) -> (f32, f32) {
    let (lo, hi) = values.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if lo.is_finite() { (lo, hi) } else { (0.0, 1.0) }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
