#[cfg(test)]
mod tests {
    use crate::models::{Chapter, ChapterStatus, Contribution, ContributionType};
    use crate::notes::compile_sections;
    use chrono::{DateTime, Duration, Utc};

    fn chapter() -> Chapter {
        Chapter {
            id: "chapter-1".to_string(),
            school_id: "school-1".to_string(),
            course_id: "course-1".to_string(),
            label: "Ch 3".to_string(),
            title: "Derivatives".to_string(),
            status: ChapterStatus::AiReady,
        }
    }

    fn contribution(
        kind: ContributionType,
        title: &str,
        content: &str,
        helpful_count: u64,
        minutes: i64,
    ) -> Contribution {
        let base = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        Contribution {
            id: format!("{}-{}", title, minutes),
            chapter_id: "chapter-1".to_string(),
            contribution_type: kind,
            title: title.to_string(),
            content: content.to_string(),
            link: None,
            image_url: None,
            anonymous: false,
            author_id: Some("student".to_string()),
            author_name: "Student".to_string(),
            helpful_count,
            replies: Vec::new(),
            created_at: base + Duration::minutes(minutes),
        }
    }

    #[test]
    fn test_takeaways_feed_concepts_formulas_and_definitions() {
        let contributions = vec![
            contribution(
                ContributionType::Takeaway,
                "Power rule",
                "d/dx x^n = n x^(n-1)\nDerivative: the instantaneous rate of change\nSee https://example.com/notes",
                0,
                0,
            ),
            contribution(
                ContributionType::Takeaway,
                "Chain rule",
                "Composite function - a function applied to the output of another",
                5,
                1,
            ),
            contribution(ContributionType::Takeaway, "power rule", "", 1, 2),
        ];

        let sections = compile_sections(&chapter(), &contributions);

        // Most helpful first, case-insensitive duplicates dropped
        assert_eq!(sections.key_concepts, vec!["Chain rule", "power rule"]);
        assert_eq!(sections.formulas, vec!["d/dx x^n = n x^(n-1)"]);

        let terms: Vec<&str> = sections
            .definitions
            .iter()
            .map(|d| d.term.as_str())
            .collect();
        assert_eq!(terms, vec!["Composite function", "Derivative"]);
        assert_eq!(
            sections.definitions[1].definition,
            "the instantaneous rate of change"
        );
    }

    #[test]
    fn test_solved_examples_produce_steps() {
        let contributions = vec![contribution(
            ContributionType::SolvedExample,
            "Differentiate x^2 sin x",
            "1. Apply the product rule\nStep 2: differentiate each factor\nf'(x) = 2x sin x + x^2 cos x",
            0,
            0,
        )];

        let sections = compile_sections(&chapter(), &contributions);

        assert_eq!(sections.examples, vec!["Differentiate x^2 sin x"]);
        assert_eq!(
            sections.steps,
            vec!["Apply the product rule", "differentiate each factor"]
        );
        assert_eq!(sections.formulas, vec!["f'(x) = 2x sin x + x^2 cos x"]);
    }

    #[test]
    fn test_confusions_resources_and_photos() {
        let mut resource = contribution(ContributionType::Resource, "3Blue1Brown", "", 0, 0);
        resource.link = Some("https://youtube.com/3b1b".to_string());

        let mut photo = contribution(ContributionType::NotesPhoto, "", "", 0, 1);
        photo.image_url = Some("https://img.example.com/board.png".to_string());

        let confusion = contribution(
            ContributionType::Confusion,
            "Sign errors",
            "Forgetting the minus on cos\nmore detail",
            0,
            2,
        );

        let sections = compile_sections(&chapter(), &[resource, photo, confusion]);

        assert_eq!(sections.mistakes, vec!["Sign errors: Forgetting the minus on cos"]);
        assert_eq!(sections.resources.len(), 2);
        assert_eq!(sections.resources[0].title, "3Blue1Brown");
        assert_eq!(sections.resources[0].url, "https://youtube.com/3b1b");
        assert_eq!(sections.resources[1].title, "Photo: Photo notes");
        assert_eq!(
            sections.revision,
            vec!["Avoid: Sign errors: Forgetting the minus on cos"]
        );
    }

    #[test]
    fn test_overview_and_revision_limit() {
        let contributions: Vec<Contribution> = (0..12)
            .map(|i| {
                contribution(
                    ContributionType::Takeaway,
                    &format!("Concept {}", i),
                    "",
                    0,
                    i,
                )
            })
            .collect();

        let sections = compile_sections(&chapter(), &contributions);

        assert_eq!(sections.key_concepts.len(), 12);
        assert_eq!(sections.revision.len(), 10);
        assert_eq!(sections.revision[0], "Explain: Concept 0");
        assert!(
            sections
                .overview
                .starts_with("Ch 3 Derivatives compiled from 12 contributions (12 takeaways"),
            "Unexpected overview: {}",
            sections.overview
        );
    }

    #[test]
    fn test_empty_chapter() {
        let sections = compile_sections(&chapter(), &[]);

        assert!(sections.key_concepts.is_empty());
        assert!(sections.revision.is_empty());
        assert!(sections.overview.contains("compiled from 0 contributions"));
    }
}
