use std::{collections::BTreeMap, fmt};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// How a card rewards spend in one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRewardRate", into = "RawRewardRate")]
pub enum RewardRate {
    /// Fraction of the purchase returned as cash (0.03 = 3%).
    CashBack(f64),
    /// Points earned per currency unit spent (3.0 = "3x").
    Points(f64),
}

impl RewardRate {
    /// Accepts "3%", "3x" or a bare fraction such as "0.03".
    pub fn parse(raw: &str) -> Result<Self> {
        let value = raw.trim().to_ascii_lowercase();

        if let Some(percent) = value.strip_suffix('%') {
            let percent: f64 = percent
                .trim()
                .parse()
                .with_context(|| format!("invalid percentage reward rate '{raw}'"))?;
            return Ok(RewardRate::CashBack(percent / 100.0));
        }

        if let Some(multiplier) = value.strip_suffix('x') {
            let multiplier: f64 = multiplier
                .trim()
                .parse()
                .with_context(|| format!("invalid point multiplier '{raw}'"))?;
            return Ok(RewardRate::Points(multiplier));
        }

        value
            .parse()
            .map(RewardRate::CashBack)
            .map_err(|_| anyhow!("unrecognized reward rate '{raw}'"))
    }

    /// Rate on the common fractional scale the scorer compares.
    /// Points are valued at one cent each, so 3x compares like 3%.
    pub fn as_fraction(&self) -> f64 {
        match self {
            RewardRate::CashBack(fraction) => *fraction,
            RewardRate::Points(multiplier) => multiplier / 100.0,
        }
    }

    pub fn is_points(&self) -> bool {
        matches!(self, RewardRate::Points(_))
    }
}

impl fmt::Display for RewardRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardRate::CashBack(fraction) => write!(f, "{}%", fraction * 100.0),
            RewardRate::Points(multiplier) => write!(f, "{multiplier}x"),
        }
    }
}

#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum RawRewardRate {
    Number(f64),
    Text(String),
}

impl TryFrom<RawRewardRate> for RewardRate {
    type Error = anyhow::Error;

    fn try_from(raw: RawRewardRate) -> Result<Self> {
        match raw {
            RawRewardRate::Number(fraction) => Ok(RewardRate::CashBack(fraction)),
            RawRewardRate::Text(text) => RewardRate::parse(&text),
        }
    }
}

impl From<RewardRate> for RawRewardRate {
    fn from(rate: RewardRate) -> Self {
        match rate {
            RewardRate::CashBack(fraction) => RawRewardRate::Number(fraction),
            RewardRate::Points(_) => RawRewardRate::Text(rate.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub name: String,
    /// Keyed by reward label as the issuer writes it ("dining", "Hotels & Flights").
    /// Ordered so that score sums come out identical on every call.
    #[serde(default)]
    pub reward_rates: BTreeMap<String, RewardRate>,
}

impl Card {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            reward_rates: BTreeMap::new(),
        }
    }

    pub fn with_rate(mut self, category: impl Into<String>, rate: RewardRate) -> Self {
        self.reward_rates.insert(category.into(), rate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reward_rate_shapes() {
        assert_eq!(RewardRate::parse("3%").unwrap(), RewardRate::CashBack(0.03));
        assert_eq!(RewardRate::parse(" 4X ").unwrap(), RewardRate::Points(4.0));
        assert_eq!(RewardRate::parse("0.015").unwrap(), RewardRate::CashBack(0.015));
        assert!(RewardRate::parse("lots").is_err());
        assert!(RewardRate::parse("x").is_err());
    }

    #[test]
    fn test_points_compare_like_percent() {
        assert_eq!(RewardRate::Points(3.0).as_fraction(), 0.03);
        assert_eq!(RewardRate::CashBack(0.05).as_fraction(), 0.05);
    }

    #[test]
    fn test_card_json_accepts_mixed_rate_shapes() {
        let card: Card = serde_json::from_str(
            r#"{
                "id": "sapphire",
                "name": "Sapphire Preferred",
                "rewardRates": {"dining": "3x", "travel": "5%", "other": 0.01}
            }"#,
        )
        .unwrap();

        assert_eq!(card.reward_rates["dining"], RewardRate::Points(3.0));
        assert_eq!(card.reward_rates["travel"], RewardRate::CashBack(0.05));
        assert_eq!(card.reward_rates["other"], RewardRate::CashBack(0.01));

        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["rewardRates"]["dining"], "3x");
        assert_eq!(json["rewardRates"]["other"], 0.01);
    }

    #[test]
    fn test_card_json_rejects_bad_rate() {
        let result: Result<Card, _> =
            serde_json::from_str(r#"{"id": "a", "name": "A", "rewardRates": {"gas": "many"}}"#);
        assert!(result.is_err());
    }
}
