use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::models::{
    Chapter, Contribution, ContributionType, Definition, NoteSections, ResourceLink,
};

const MAX_REVISION_ITEMS: usize = 10;

static STEP_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:\d+[.)]|step\s*\d+[:.)]?)\s*(.+)$").expect("step pattern is valid")
});

static DEFINITION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][\w\s'()/-]{0,58}?)\s*(?::|\s-\s)\s*(.{3,})$")
        .expect("definition pattern is valid")
});

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

fn headline(contribution: &Contribution) -> Option<String> {
    let title = contribution.title.trim();
    if !title.is_empty() {
        return Some(title.to_string());
    }
    first_line(&contribution.content).map(str::to_string)
}

fn is_formula(line: &str) -> bool {
    line.contains('=') && !line.starts_with("http")
}

/// Pushes `item` unless an equal entry (ignoring case) is already present.
fn push_unique(items: &mut Vec<String>, seen: &mut HashSet<String>, item: String) {
    if seen.insert(item.to_lowercase()) {
        items.push(item);
    }
}

/// Digests a chapter's contributions into unified-notes sections. Most helpful
/// contributions come first within each section.
pub fn compile_sections(chapter: &Chapter, contributions: &[Contribution]) -> NoteSections {
    let mut ordered: Vec<&Contribution> = contributions.iter().collect();
    ordered.sort_by(|a, b| {
        b.helpful_count
            .cmp(&a.helpful_count)
            .then(a.created_at.cmp(&b.created_at))
    });

    let mut sections = NoteSections::default();
    let mut seen_concepts = HashSet::new();
    let mut seen_terms = HashSet::new();
    let mut seen_formulas = HashSet::new();

    let count_of = |kind: ContributionType| {
        contributions
            .iter()
            .filter(|c| c.contribution_type == kind)
            .count()
    };

    for contribution in &ordered {
        match contribution.contribution_type {
            ContributionType::Takeaway => {
                if let Some(concept) = headline(contribution) {
                    push_unique(&mut sections.key_concepts, &mut seen_concepts, concept);
                }
                for line in contribution.content.lines().map(str::trim) {
                    if is_formula(line) {
                        push_unique(&mut sections.formulas, &mut seen_formulas, line.to_string());
                    } else if line.contains("://") {
                        continue;
                    } else if let Some(caps) = DEFINITION_LINE.captures(line) {
                        let term = caps[1].trim().to_string();
                        if seen_terms.insert(term.to_lowercase()) {
                            sections.definitions.push(Definition {
                                term,
                                definition: caps[2].trim().to_string(),
                            });
                        }
                    }
                }
            }
            ContributionType::SolvedExample => {
                if let Some(example) = headline(contribution) {
                    sections.examples.push(example);
                }
                for line in contribution.content.lines() {
                    if let Some(caps) = STEP_LINE.captures(line) {
                        sections.steps.push(caps[1].trim().to_string());
                    } else if is_formula(line.trim()) {
                        push_unique(
                            &mut sections.formulas,
                            &mut seen_formulas,
                            line.trim().to_string(),
                        );
                    }
                }
            }
            ContributionType::Confusion => {
                let detail = first_line(&contribution.content).unwrap_or_default();
                let mistake = match (contribution.title.trim(), detail) {
                    ("", "") => continue,
                    ("", detail) => detail.to_string(),
                    (title, "") => title.to_string(),
                    (title, detail) => format!("{}: {}", title, detail),
                };
                sections.mistakes.push(mistake);
            }
            ContributionType::Resource => {
                if let Some(url) = &contribution.link {
                    sections.resources.push(ResourceLink {
                        title: headline(contribution).unwrap_or_else(|| url.clone()),
                        url: url.clone(),
                    });
                }
            }
            ContributionType::NotesPhoto => {
                if let Some(url) = &contribution.image_url {
                    let title = headline(contribution).unwrap_or_else(|| "Photo notes".to_string());
                    sections.resources.push(ResourceLink {
                        title: format!("Photo: {}", title),
                        url: url.clone(),
                    });
                }
            }
        }
    }

    sections.revision = sections
        .key_concepts
        .iter()
        .map(|c| format!("Explain: {}", c))
        .chain(sections.definitions.iter().map(|d| format!("Define {}", d.term)))
        .chain(sections.mistakes.iter().map(|m| format!("Avoid: {}", m)))
        .take(MAX_REVISION_ITEMS)
        .collect();

    sections.overview = format!(
        "{} {} compiled from {} contributions ({} takeaways, {} solved examples, {} resources, {} photos, {} open questions).",
        chapter.label,
        chapter.title,
        contributions.len(),
        count_of(ContributionType::Takeaway),
        count_of(ContributionType::SolvedExample),
        count_of(ContributionType::Resource),
        count_of(ContributionType::NotesPhoto),
        count_of(ContributionType::Confusion),
    )
    .trim()
    .to_string();

    sections
}
