pub mod alto;
pub mod pagexml;
pub mod text;

use serde::{Deserialize, Serialize};

pub use alto::{to_alto_xml, OcrProcessing};
pub use pagexml::to_page_xml;
pub use text::to_plain_text;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Axis-aligned box in integer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn bounding(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        let x = x0.round() as i64;
        let y = y0.round() as i64;
        Some(Self {
            x,
            y,
            width: (x1.round() as i64 - x).max(0),
            height: (y1.round() as i64 - y).max(0),
        })
    }
}

/// Recognition result for one page, built fresh per processing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub regions: Vec<TextRegion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRegion {
    pub id: String,
    #[serde(default)]
    pub polygon: Vec<Point>,
    #[serde(default)]
    pub lines: Vec<TextLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub id: String,
    #[serde(default)]
    pub baseline: Vec<Point>,
    #[serde(default)]
    pub polygon: Vec<Point>,
    /// Ascender and descender height around the baseline.
    #[serde(default)]
    pub heights: Option<[f32; 2]>,
    #[serde(default)]
    pub transcription: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl PageLayout {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            regions: Vec::new(),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &TextLine> {
        self.regions.iter().flat_map(|r| r.lines.iter())
    }
}

impl TextLine {
    /// Line box from the polygon, falling back to baseline plus heights.
    pub fn bbox(&self) -> Option<Rect> {
        if let Some(r) = Rect::bounding(&self.polygon) {
            return Some(r);
        }
        let base = Rect::bounding(&self.baseline)?;
        let [up, down] = self.heights.unwrap_or([0.0, 0.0]);
        let up = up.round() as i64;
        let down = down.round() as i64;
        Some(Rect {
            x: base.x,
            y: base.y - up,
            width: base.width,
            height: base.height + up + down,
        })
    }
}

impl TextRegion {
    pub fn bbox(&self) -> Option<Rect> {
        if let Some(r) = Rect::bounding(&self.polygon) {
            return Some(r);
        }
        let boxes: Vec<Point> = self
            .lines
            .iter()
            .filter_map(|l| l.bbox())
            .flat_map(|r| {
                [
                    Point { x: r.x as f32, y: r.y as f32 },
                    Point {
                        x: (r.x + r.width) as f32,
                        y: (r.y + r.height) as f32,
                    },
                ]
            })
            .collect();
        Rect::bounding(&boxes)
    }
}

pub(crate) fn points_attr(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", p.x.round() as i64, p.y.round() as i64))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(x: f32, y: f32) -> Point {
        Point { x, y }
    }

    #[test]
    fn line_bbox_falls_back_to_baseline() {
        let line = TextLine {
            id: "l1".into(),
            baseline: vec![pt(10.0, 50.0), pt(110.0, 52.0)],
            polygon: vec![],
            heights: Some([20.0, 5.0]),
            transcription: "x".into(),
            confidence: None,
        };
        let r = line.bbox().unwrap();
        assert_eq!(r, Rect { x: 10, y: 30, width: 100, height: 27 });
    }

    #[test]
    fn points_render_rounded() {
        assert_eq!(points_attr(&[pt(1.4, 2.6), pt(3.0, 4.0)]), "1,3 3,4");
    }
}
