use tracing::debug;

use crate::config::KeywordsConfig;

/// Outcome of classifying a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Trimmed text when the message is a standup, the untouched input otherwise.
    pub text: String,
    pub is_standup: bool,
}

/// Decides whether a message is a standup: it must contain at least one
/// phrase from each of the problems, yesterday and today sets. Matching is a
/// case-sensitive substring search and order does not matter.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    problems: Vec<String>,
    yesterday: Vec<String>,
    today: Vec<String>,
}

impl KeywordClassifier {
    pub fn new(problems: Vec<String>, yesterday: Vec<String>, today: Vec<String>) -> Self {
        let clean = |set: Vec<String>| -> Vec<String> {
            set.into_iter().filter(|phrase| !phrase.is_empty()).collect()
        };
        Self {
            problems: clean(problems),
            yesterday: clean(yesterday),
            today: clean(today),
        }
    }

    pub fn from_config(config: &KeywordsConfig) -> Self {
        Self::new(
            config.problems.clone(),
            config.yesterday.clone(),
            config.today.clone(),
        )
    }

    pub fn classify(&self, text: &str) -> Classification {
        let is_standup = !text.is_empty()
            && contains_any(text, &self.problems)
            && contains_any(text, &self.yesterday)
            && contains_any(text, &self.today);

        debug!(is_standup, len = text.len(), "classified message");

        if is_standup {
            Classification {
                text: text.trim().to_string(),
                is_standup: true,
            }
        } else {
            Classification {
                text: text.to_string(),
                is_standup: false,
            }
        }
    }
}

fn contains_any(text: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|phrase| text.contains(phrase.as_str()))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn scenario_classifier() -> KeywordClassifier {
        KeywordClassifier::new(
            vec!["Problem".to_string()],
            vec!["Yesterday".to_string()],
            vec!["Today".to_string()],
        )
    }

    #[test]
    fn full_report_is_a_standup() {
        let result = scenario_classifier().classify(
            "Yesterday I fixed bug X. Today I will write tests. Problem: blocked on review.",
        );
        assert!(result.is_standup);
    }

    #[test]
    fn partial_report_is_not_a_standup() {
        let result = scenario_classifier().classify("Yesterday I fixed bug X.");
        assert!(!result.is_standup);
        assert_eq!(result.text, "Yesterday I fixed bug X.");
    }

    #[test]
    fn positive_result_is_trimmed() {
        let result = scenario_classifier().classify("  Problem Yesterday Today \n");
        assert!(result.is_standup);
        assert_eq!(result.text, "Problem Yesterday Today");
    }

    #[test]
    fn negative_result_keeps_original_text() {
        let result = scenario_classifier().classify("  just chatting  ");
        assert!(!result.is_standup);
        assert_eq!(result.text, "  just chatting  ");
    }

    #[test]
    fn one_phrase_can_cover_several_sets() {
        let classifier = KeywordClassifier::new(
            vec!["status".to_string()],
            vec!["status".to_string()],
            vec!["status".to_string()],
        );
        assert!(classifier.classify("status update").is_standup);
    }

    #[test]
    fn blank_phrases_never_match() {
        let classifier = KeywordClassifier::new(
            vec!["".to_string()],
            vec!["Yesterday".to_string()],
            vec!["Today".to_string()],
        );
        assert!(!classifier.classify("Yesterday Today").is_standup);
    }

    #[test_case("" ; "empty")]
    #[test_case("problem yesterday today" ; "wrong case")]
    #[test_case("Today Yesterday" ; "missing problems")]
    #[test_case("Today Problem" ; "missing yesterday")]
    fn rejected_inputs(input: &str) {
        assert!(!scenario_classifier().classify(input).is_standup);
    }

    #[test_case("Today Yesterday Problem" ; "reversed")]
    #[test_case("Problem/Today/Yesterday" ; "no whitespace")]
    fn order_does_not_matter(input: &str) {
        assert!(scenario_classifier().classify(input).is_standup);
    }
}
