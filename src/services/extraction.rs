//! Rule documentation extraction.
//!
//! Vendor rule documentation arrives as loose HTML containing preformatted
//! sections; by convention the first two describe risk and the third the
//! recommendation. Extraction prefers explicit section labels when the
//! markup carries them and falls back to that positional convention
//! otherwise. Malformed documentation degrades to partial or empty text
//! rather than failing the run.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

use crate::errors::AppError;
use crate::provider::SastProvider;

/// One preformatted documentation section with its text fragments
/// (paragraph and list-item contents, document order).
#[derive(Debug)]
struct Section {
    label: Option<String>,
    fragments: Vec<String>,
}

/// Extract (risk, recommendation) text from rule documentation markup.
pub fn extract_sections(markup: &str) -> (String, String) {
    let sections = collect_sections(markup);

    let has_labels = sections
        .iter()
        .any(|s| matches!(s.label.as_deref(), Some("risk") | Some("recommendation")));

    let mut risk: Vec<&str> = Vec::new();
    let mut recommendation: Vec<&str> = Vec::new();

    if has_labels {
        for section in &sections {
            match section.label.as_deref() {
                Some("risk") => risk.extend(section.fragments.iter().map(String::as_str)),
                Some("recommendation") => {
                    recommendation.extend(section.fragments.iter().map(String::as_str))
                }
                _ => {}
            }
        }
    } else {
        // Positional convention: first two sections are risk, the third is
        // the recommendation, anything beyond is ignored.
        for section in sections.iter().take(2) {
            risk.extend(section.fragments.iter().map(String::as_str));
        }
        if let Some(section) = sections.get(2) {
            recommendation.extend(section.fragments.iter().map(String::as_str));
        }
    }

    (risk.join("\n"), recommendation.join("\n"))
}

/// Enumerate the rule ids referenced by a scan and build the two
/// description maps, fetching and parsing each distinct id at most once.
/// Per-rule fetch or parse trouble degrades to empty text for that rule.
pub async fn build_description_maps(
    provider: &dyn SastProvider,
    scan_id: i64,
) -> Result<(HashMap<u64, String>, HashMap<u64, String>), AppError> {
    let rule_ids = provider.rule_ids_for_scan(scan_id).await?;

    let mut risk_by_rule: HashMap<u64, String> = HashMap::new();
    let mut recommendation_by_rule: HashMap<u64, String> = HashMap::new();

    for rule_id in rule_ids {
        if risk_by_rule.contains_key(&rule_id) {
            continue;
        }
        let (risk, recommendation) = match provider.rule_documentation(rule_id).await {
            Ok(markup) => extract_sections(&markup),
            Err(e) => {
                warn!(rule_id, error = %e, "rule documentation unavailable");
                (String::new(), String::new())
            }
        };
        risk_by_rule.insert(rule_id, risk);
        recommendation_by_rule.insert(rule_id, recommendation);
    }

    Ok((risk_by_rule, recommendation_by_rule))
}

fn collect_sections(markup: &str) -> Vec<Section> {
    let mut reader = Reader::from_str(markup);
    reader.config_mut().check_end_names = false;

    let mut sections: Vec<Section> = Vec::new();
    let mut in_section = false;
    let mut text_depth = 0usize;
    let mut buffer = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match element_name(&e).as_str() {
                "pre" => {
                    in_section = true;
                    text_depth = 0;
                    sections.push(Section {
                        label: section_label(&e),
                        fragments: Vec::new(),
                    });
                }
                "p" | "li" if in_section => {
                    if text_depth == 0 {
                        buffer.clear();
                    }
                    text_depth += 1;
                }
                _ => {}
            },
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                match name.as_str() {
                    "pre" => {
                        in_section = false;
                        text_depth = 0;
                    }
                    "p" | "li" if in_section && text_depth > 0 => {
                        text_depth -= 1;
                        if text_depth == 0 {
                            let fragment = buffer.trim().to_string();
                            if !fragment.is_empty() {
                                if let Some(section) = sections.last_mut() {
                                    section.fragments.push(fragment);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) if in_section && text_depth > 0 => {
                let text = t
                    .unescape()
                    .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned().into());
                buffer.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                // Best-effort: keep whatever was collected so far.
                warn!(error = %e, "stopping documentation parse early");
                break;
            }
        }
    }

    sections
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase()
}

fn section_label(e: &BytesStart<'_>) -> Option<String> {
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        if key == "name" || key == "label" {
            if let Ok(value) = attr.unescape_value() {
                return Some(value.to_ascii_lowercase());
            }
        }
    }
    None
}
