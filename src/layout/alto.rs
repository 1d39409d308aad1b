//! ALTO v2 serialization.
//!
//! Uploads carry the ALTO the OCR library writes itself; this writer is the
//! fallback for processors that return only the layout. Word boxes are not
//! part of the layout model, so each `String` gets a slice of its line box
//! proportional to its character count.

use super::{PageLayout, Rect, TextLine, TextRegion};
use crate::util::xml_escape;
use serde::Serialize;
use std::fmt::Write as _;

const ALTO_NS: &str = "http://www.loc.gov/standards/alto/ns-v2#";
const ALTO_XSD: &str = "http://www.loc.gov/standards/alto/alto-v2.0.xsd";

/// Processing metadata written into `Description/OCRProcessing`.
#[derive(Debug, Clone, Serialize)]
pub struct OcrProcessing {
    pub id: String,
    pub software_creator: String,
    pub software_name: String,
    pub software_version: String,
    pub processing_datetime: Option<String>,
}

impl OcrProcessing {
    pub fn for_engine(name: &str, version: &str) -> Self {
        Self {
            id: "IdOcr".into(),
            software_creator: "Project PERO".into(),
            software_name: name.into(),
            software_version: version.into(),
            processing_datetime: None,
        }
    }
}

pub fn to_alto_xml(layout: &PageLayout, processing: &OcrProcessing) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        xml,
        "<alto xmlns=\"{ALTO_NS}\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
         xsi:schemaLocation=\"{ALTO_NS} {ALTO_XSD}\">"
    );
    write_description(&mut xml, layout, processing);

    xml.push_str("  <Layout>\n");
    let _ = writeln!(
        xml,
        "    <Page ID=\"{}\" PHYSICAL_IMG_NR=\"1\" HEIGHT=\"{h}\" WIDTH=\"{w}\">",
        xml_escape(&layout.id),
        h = layout.height,
        w = layout.width,
    );
    let _ = writeln!(
        xml,
        "      <PrintSpace HPOS=\"0\" VPOS=\"0\" HEIGHT=\"{}\" WIDTH=\"{}\">",
        layout.height, layout.width
    );
    for region in &layout.regions {
        write_block(&mut xml, region);
    }
    xml.push_str("      </PrintSpace>\n    </Page>\n  </Layout>\n</alto>\n");
    xml
}

fn write_description(xml: &mut String, layout: &PageLayout, p: &OcrProcessing) {
    xml.push_str("  <Description>\n    <MeasurementUnit>pixel</MeasurementUnit>\n");
    let _ = writeln!(
        xml,
        "    <sourceImageInformation>\n      <fileName>{}</fileName>\n    </sourceImageInformation>",
        xml_escape(&layout.id)
    );
    let _ = writeln!(xml, "    <OCRProcessing ID=\"{}\">", xml_escape(&p.id));
    xml.push_str("      <ocrProcessingStep>\n");
    if let Some(dt) = &p.processing_datetime {
        let _ = writeln!(
            xml,
            "        <processingDateTime>{}</processingDateTime>",
            xml_escape(dt)
        );
    }
    let _ = writeln!(
        xml,
        "        <processingSoftware>\n          <softwareCreator>{}</softwareCreator>\n          <softwareName>{}</softwareName>\n          <softwareVersion>{}</softwareVersion>\n        </processingSoftware>",
        xml_escape(&p.software_creator),
        xml_escape(&p.software_name),
        xml_escape(&p.software_version)
    );
    xml.push_str("      </ocrProcessingStep>\n    </OCRProcessing>\n  </Description>\n");
}

fn write_block(xml: &mut String, region: &TextRegion) {
    let r = region.bbox().unwrap_or(Rect {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    });
    let _ = writeln!(
        xml,
        "        <TextBlock ID=\"{}\" {}>",
        xml_escape(&region.id),
        box_attrs(r)
    );
    for line in &region.lines {
        write_line(xml, line);
    }
    xml.push_str("        </TextBlock>\n");
}

fn write_line(xml: &mut String, line: &TextLine) {
    let r = line.bbox().unwrap_or(Rect {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    });
    let baseline = if line.baseline.is_empty() {
        String::new()
    } else {
        let mean = line.baseline.iter().map(|p| p.y).sum::<f32>() / line.baseline.len() as f32;
        format!(" BASELINE=\"{}\"", mean.round() as i64)
    };
    let _ = writeln!(
        xml,
        "          <TextLine ID=\"{}\"{baseline} {}>",
        xml_escape(&line.id),
        box_attrs(r)
    );

    let total = line.transcription.chars().count();
    let char_width = if total > 0 {
        r.width as f64 / total as f64
    } else {
        0.0
    };
    let wc = line
        .confidence
        .map(|c| format!(" WC=\"{:.2}\"", c.clamp(0.0, 1.0)))
        .unwrap_or_default();

    let mut prev_end: Option<i64> = None;
    for (start, word) in word_spans(&line.transcription) {
        let len = word.chars().count();
        let hpos = r.x + (start as f64 * char_width).round() as i64;
        let end = r.x + ((start + len) as f64 * char_width).round() as i64;
        if let Some(prev) = prev_end {
            let _ = writeln!(
                xml,
                "            <SP WIDTH=\"{}\" VPOS=\"{}\" HPOS=\"{prev}\"/>",
                (hpos - prev).max(0),
                r.y
            );
        }
        let _ = writeln!(
            xml,
            "            <String CONTENT=\"{}\" HEIGHT=\"{}\" WIDTH=\"{}\" VPOS=\"{}\" HPOS=\"{hpos}\"{wc}/>",
            xml_escape(word),
            r.height,
            (end - hpos).max(0),
            r.y
        );
        prev_end = Some(end);
    }
    xml.push_str("          </TextLine>\n");
}

/// Whitespace-separated words with their starting character index.
fn word_spans(text: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut start: Option<(usize, usize)> = None;
    for (ci, (bi, ch)) in text.char_indices().enumerate() {
        match (ch.is_whitespace(), start) {
            (true, Some((cs, bs))) => {
                spans.push((cs, &text[bs..bi]));
                start = None;
            }
            (false, None) => start = Some((ci, bi)),
            _ => {}
        }
    }
    if let Some((cs, bs)) = start {
        spans.push((cs, &text[bs..]));
    }
    spans
}

fn box_attrs(r: Rect) -> String {
    format!(
        "HEIGHT=\"{}\" WIDTH=\"{}\" VPOS=\"{}\" HPOS=\"{}\"",
        r.height, r.width, r.y, r.x
    )
}

#[cfg(test)]
mod tests {
    use super::word_spans;

    #[test]
    fn word_spans_use_char_offsets() {
        assert_eq!(
            word_spans("  žluť  kůň "),
            vec![(2, "žluť"), (8, "kůň")]
        );
    }

    #[test]
    fn word_spans_empty() {
        assert!(word_spans("").is_empty());
        assert!(word_spans("   ").is_empty());
    }
}
