use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};

use crate::models::{Card, Merchant, RewardRate};

use super::{
    categories::{match_kind, MatchKind},
    config::ScoringConfig,
};

/// The cards to rank and which of them the user already holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardCatalog {
    pub cards: Vec<Card>,
    #[serde(default)]
    pub held_card_ids: HashSet<String>,
}

impl CardCatalog {
    pub fn new(cards: Vec<Card>) -> Self {
        Self {
            cards,
            held_card_ids: HashSet::new(),
        }
    }

    pub fn with_held(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.held_card_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedCard<'a> {
    pub card: &'a Card,
    pub score: f64,
    pub held: bool,
}

/// Sum of every reward line's contribution for `category` (already lowercase).
///
/// Lines are summed, not maxed: a card with several matching lines beats a
/// card with one slightly better line.
pub fn score_card(category: &str, card: &Card, config: &ScoringConfig) -> f64 {
    card.reward_rates
        .iter()
        .map(|(label, rate)| {
            let rate = rate.as_fraction();
            match match_kind(category, label) {
                Some(MatchKind::Exact) => rate,
                Some(MatchKind::Fuzzy) => rate * config.fuzzy_weight,
                None if rate >= config.generic_min_rate => rate * config.generic_weight,
                None => 0.0,
            }
        })
        // Not `sum()`: an empty f64 sum is -0.0, which total_cmp ranks below 0.0.
        .fold(0.0, |total, contribution| total + contribution)
}

/// Best-first ranking of `cards` for `merchant`, truncated to `config.top_n`.
///
/// Ties, including cards that score nothing at all, keep their input order.
pub fn rank_cards<'a>(
    merchant: &Merchant,
    cards: &'a [Card],
    held_card_ids: &HashSet<String>,
    config: &ScoringConfig,
) -> Vec<RankedCard<'a>> {
    let category = merchant.normalized_category();

    let mut ranked: Vec<RankedCard<'a>> = cards
        .iter()
        .map(|card| {
            let held = held_card_ids.contains(&card.id);
            let mut score = score_card(&category, card, config);
            if held {
                score += config.held_card_bonus;
            }
            RankedCard { card, score, held }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(config.top_n);
    ranked
}

/// The single rate that applies to a purchase at `category`: an exact line if
/// there is one, else the best alias line, else the configured default.
pub fn best_reward_rate(category: &str, card: &Card, config: &ScoringConfig) -> RewardRate {
    card.reward_rates
        .iter()
        .filter_map(|(label, rate)| match_kind(category, label).map(|kind| (kind, *rate)))
        .max_by(|(kind_a, rate_a), (kind_b, rate_b)| {
            kind_a
                .cmp(kind_b)
                .then(rate_a.as_fraction().total_cmp(&rate_b.as_fraction()))
        })
        .map(|(_, rate)| rate)
        .unwrap_or(RewardRate::CashBack(config.default_rate))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Earnings {
    CashBack(f64),
    Points(f64),
}

impl fmt::Display for Earnings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Earnings::CashBack(amount) => write!(f, "${amount:.2} cash back"),
            Earnings::Points(points) => write!(f, "{points:.0} points"),
        }
    }
}

pub fn estimate_earnings(merchant: &Merchant, card: &Card, config: &ScoringConfig) -> Earnings {
    let spend = merchant
        .estimated_spend
        .filter(|spend| spend.is_finite() && *spend >= 0.0)
        .unwrap_or(config.default_spend);

    match best_reward_rate(&merchant.normalized_category(), card, config) {
        RewardRate::CashBack(fraction) => Earnings::CashBack(spend * fraction),
        RewardRate::Points(multiplier) => Earnings::Points(spend * multiplier),
    }
}
