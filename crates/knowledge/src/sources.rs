//! Evidence rendering: prompt context text and the trailing sources note.

use crate::types::EvidenceSet;

/// Join evidence passages into the context block of the answer prompt.
pub fn format_evidence(evidence: &EvidenceSet) -> String {
    evidence
        .iter()
        .map(|item| item.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the `Sources:` annotation appended after a standing answer.
///
/// Items with a URL become `[n](url)` links, with stray backslashes removed
/// and repeated URLs skipped. Items without one become `n (No URL)`.
/// Returns `None` for an empty evidence set.
pub fn sources_annotation(evidence: &EvidenceSet) -> Option<String> {
    if evidence.is_empty() {
        return None;
    }

    let mut entries: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    let mut n = 1;

    for item in evidence.iter() {
        match item.source_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => {
                let clean_url = url.replace('\\', "");
                if seen.contains(&clean_url) {
                    continue;
                }
                entries.push(format!("[{}]({})", n, clean_url));
                seen.push(clean_url);
            }
            None => entries.push(format!("{} (No URL)", n)),
        }
        n += 1;
    }

    Some(format!("\n\nSources: {}", entries.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EvidenceItem, StrategyKind};

    fn set(items: &[(&str, Option<&str>)]) -> EvidenceSet {
        let mut set = EvidenceSet::with_capacity(items.len());
        for (rank, (text, url)) in items.iter().enumerate() {
            set.insert(EvidenceItem {
                text: text.to_string(),
                source_url: url.map(str::to_string),
                strategy: StrategyKind::Mmr,
                rank,
                score: None,
            });
        }
        set
    }

    #[test]
    fn test_format_evidence_joins_with_newlines() {
        let evidence = set(&[("first", None), ("second", None)]);
        assert_eq!(format_evidence(&evidence), "first\nsecond");
    }

    #[test]
    fn test_annotation_links_and_placeholders() {
        let evidence = set(&[
            ("a", Some("https://www.alz.org/help\\_support")),
            ("b", None),
            ("c", Some("https://www.nia.nih.gov/health")),
        ]);

        assert_eq!(
            sources_annotation(&evidence).unwrap(),
            "\n\nSources: [1](https://www.alz.org/help_support) 2 (No URL) [3](https://www.nia.nih.gov/health)"
        );
    }

    #[test]
    fn test_annotation_skips_urls_equal_after_cleaning() {
        // Distinct raw URLs that collapse to the same link once backslashes go.
        let evidence = set(&[("a", Some("https://x.org/a\\_b")), ("b", Some("https://x.org/a_b"))]);
        assert_eq!(
            sources_annotation(&evidence).unwrap(),
            "\n\nSources: [1](https://x.org/a_b)"
        );
    }

    #[test]
    fn test_annotation_empty_set() {
        assert!(sources_annotation(&EvidenceSet::default()).is_none());
    }
}
