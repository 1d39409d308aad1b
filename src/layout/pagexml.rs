//! PAGE XML (PRImA 2019-07-15 schema) serialization.

use super::{points_attr, PageLayout, Rect, TextLine, TextRegion};
use crate::util::{now_rfc3339, xml_escape};
use std::fmt::Write as _;

const PAGE_NS: &str = "http://schema.primaresearch.org/PAGE/gts/pagecontent/2019-07-15";
const CREATOR: &str = "Project PERO";

pub fn to_page_xml(layout: &PageLayout) -> String {
    to_page_xml_at(layout, &now_rfc3339())
}

/// Same as [`to_page_xml`] with a fixed metadata timestamp.
pub fn to_page_xml_at(layout: &PageLayout, timestamp: &str) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        xml,
        "<PcGts xmlns=\"{PAGE_NS}\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
         xsi:schemaLocation=\"{PAGE_NS} {PAGE_NS}/pagecontent.xsd\">"
    );
    let _ = writeln!(
        xml,
        "  <Metadata>\n    <Creator>{CREATOR}</Creator>\n    <Created>{ts}</Created>\n    <LastChange>{ts}</LastChange>\n  </Metadata>",
        ts = xml_escape(timestamp)
    );
    let _ = writeln!(
        xml,
        "  <Page imageFilename=\"{}\" imageWidth=\"{}\" imageHeight=\"{}\">",
        xml_escape(&layout.id),
        layout.width,
        layout.height
    );
    for region in &layout.regions {
        write_region(&mut xml, region);
    }
    xml.push_str("  </Page>\n</PcGts>\n");
    xml
}

fn write_region(xml: &mut String, region: &TextRegion) {
    let coords = if region.polygon.is_empty() {
        region.bbox().map(rect_points).unwrap_or_default()
    } else {
        points_attr(&region.polygon)
    };
    let _ = writeln!(xml, "    <TextRegion id=\"{}\">", xml_escape(&region.id));
    let _ = writeln!(xml, "      <Coords points=\"{coords}\"/>");
    for (index, line) in region.lines.iter().enumerate() {
        write_line(xml, line, index);
    }
    let joined = region
        .lines
        .iter()
        .map(|l| l.transcription.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let _ = writeln!(
        xml,
        "      <TextEquiv>\n        <Unicode>{}</Unicode>\n      </TextEquiv>",
        xml_escape(&joined)
    );
    xml.push_str("    </TextRegion>\n");
}

fn write_line(xml: &mut String, line: &TextLine, index: usize) {
    let coords = if line.polygon.is_empty() {
        line.bbox().map(rect_points).unwrap_or_default()
    } else {
        points_attr(&line.polygon)
    };
    let _ = writeln!(
        xml,
        "      <TextLine id=\"{}\" index=\"{index}\">",
        xml_escape(&line.id)
    );
    let _ = writeln!(xml, "        <Coords points=\"{coords}\"/>");
    if !line.baseline.is_empty() {
        let _ = writeln!(
            xml,
            "        <Baseline points=\"{}\"/>",
            points_attr(&line.baseline)
        );
    }
    match line.confidence {
        Some(conf) => {
            let _ = writeln!(xml, "        <TextEquiv conf=\"{conf:.3}\">");
        }
        None => xml.push_str("        <TextEquiv>\n"),
    }
    let _ = writeln!(
        xml,
        "          <Unicode>{}</Unicode>\n        </TextEquiv>\n      </TextLine>",
        xml_escape(&line.transcription)
    );
}

fn rect_points(r: Rect) -> String {
    let (x0, y0, x1, y1) = (r.x, r.y, r.x + r.width, r.y + r.height);
    format!("{x0},{y0} {x1},{y0} {x1},{y1} {x0},{y1}")
}
