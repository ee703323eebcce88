//! Strict keyword strategy - deterministic keyword-to-category lookup
//!
//! If the record text contains a known keyword, the mapped category is
//! assigned; otherwise "Uncategorized". The longest matching keyword wins so
//! "curb settlement repairs" beats "settlement repairs".

use crate::categorize::categories::{AEON_CATEGORIES, AEON_KEYWORD_ALIASES, UNCATEGORIZED};
use crate::categorize::CategoryStrategy;
use crate::record::CategorizationResult;

pub struct StrictKeywordStrategy {
    name: &'static str,
    categories: &'static [&'static str],
    /// Lowercased keyword and the category it maps to, longest keyword first
    keywords: Vec<(String, &'static str)>,
}

impl StrictKeywordStrategy {
    /// Strategy for the landscaping company: category names themselves plus
    /// a fixed alias table act as keywords.
    pub fn aeon() -> Self {
        Self::new("strict_keyword", AEON_CATEGORIES, AEON_KEYWORD_ALIASES)
    }

    pub fn new(
        name: &'static str,
        categories: &'static [&'static str],
        aliases: &'static [(&'static str, &'static str)],
    ) -> Self {
        let mut keywords: Vec<(String, &'static str)> = categories
            .iter()
            .filter(|c| **c != "Miscellaneous")
            .map(|c| (c.to_lowercase(), *c))
            .chain(aliases.iter().map(|(k, c)| (k.to_lowercase(), *c)))
            .collect();
        // Longest keyword first; ties alphabetical for determinism
        keywords.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(&b.0)));
        Self {
            name,
            categories,
            keywords,
        }
    }
}

impl CategoryStrategy for StrictKeywordStrategy {
    fn name(&self) -> &str {
        self.name
    }

    fn categories(&self) -> &[&'static str] {
        self.categories
    }

    fn categorize(&self, text: &str) -> CategorizationResult {
        let haystack = text.to_lowercase();
        for (keyword, category) in &self.keywords {
            if haystack.contains(keyword.as_str()) {
                return CategorizationResult {
                    category_label: (*category).to_string(),
                    strategy_used: self.name.to_string(),
                    match_score: None,
                };
            }
        }
        CategorizationResult {
            category_label: UNCATEGORIZED.to_string(),
            strategy_used: self.name.to_string(),
            match_score: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_assigns_mapped_category() {
        let strategy = StrictKeywordStrategy::aeon();
        let result = strategy.categorize("Supply and install straw on lots 4-9");
        assert_eq!(result.category_label, "Straw Installation");
        assert_eq!(result.strategy_used, "strict_keyword");
        assert!(result.match_score.is_none());
    }

    #[test]
    fn test_longest_keyword_wins() {
        let strategy = StrictKeywordStrategy::aeon();
        let result = strategy.categorize("curb settlement repairs at block 12");
        assert_eq!(result.category_label, "Curb settlement repairs");
    }

    #[test]
    fn test_no_match_is_uncategorized() {
        let strategy = StrictKeywordStrategy::aeon();
        let result = strategy.categorize("completely unrelated text");
        assert_eq!(result.category_label, UNCATEGORIZED);
    }

    #[test]
    fn test_output_is_always_in_closed_set() {
        let strategy = StrictKeywordStrategy::aeon();
        for text in [
            "install straw",
            "garbage pickup on friday",
            "free text that matches nothing",
            "window well work",
            "",
        ] {
            let label = strategy.categorize(text).category_label;
            assert!(
                label == UNCATEGORIZED || AEON_CATEGORIES.contains(&label.as_str()),
                "label {} escaped the closed set",
                label
            );
        }
    }
}
