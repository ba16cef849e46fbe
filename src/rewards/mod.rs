pub mod categories;
pub mod config;
pub mod scoring;

pub use categories::{match_kind, MatchKind, CATEGORY_ALIASES};
pub use config::ScoringConfig;
pub use scoring::{
    best_reward_rate, estimate_earnings, rank_cards, score_card, CardCatalog, Earnings, RankedCard,
};
