/// Reward-label substrings accepted for each canonical merchant category.
pub const CATEGORY_ALIASES: &[(&str, &[&str])] = &[
    ("dining", &["dining", "restaurant"]),
    ("groceries", &["grocer", "supermarket"]),
    ("gas", &["gas", "fuel", "transportation"]),
    ("travel", &["travel", "hotel", "flight"]),
    ("personal_care", &["salon", "spa", "beauty"]),
    ("auto_services", &["auto", "car"]),
    ("healthcare", &["health", "medical", "pharmacy"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    Fuzzy,
    Exact,
}

/// Aliases for a lowercase merchant category; empty when it has none.
pub fn aliases_for(category: &str) -> &'static [&'static str] {
    CATEGORY_ALIASES
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}

/// How a card's reward label relates to a lowercase merchant category.
pub fn match_kind(category: &str, reward_label: &str) -> Option<MatchKind> {
    let label = reward_label.trim().to_lowercase();
    if label == category {
        return Some(MatchKind::Exact);
    }

    aliases_for(category)
        .iter()
        .any(|alias| label.contains(alias))
        .then_some(MatchKind::Fuzzy)
}
