use std::collections::HashMap;

const MEAL_PLANNING: &str = "Try planning your meals and cooking at home more often.";
const PUBLIC_TRANSIT: &str = "Consider public transport or carpooling.";
const FREE_ACTIVITIES: &str = "Look for free or cheaper activities near you.";
const SHOPPING_LIST: &str = "Make a list before buying and avoid impulse purchases.";
const GENERIC: &str = "Review each expense to find possible savings.";

const DEFAULT_TIPS: &[(&str, &str)] = &[
    ("food", MEAL_PLANNING),
    ("groceries", MEAL_PLANNING),
    ("alimentation", MEAL_PLANNING),
    ("nourriture", MEAL_PLANNING),
    ("transport", PUBLIC_TRANSIT),
    ("leisure", FREE_ACTIVITIES),
    ("entertainment", FREE_ACTIVITIES),
    ("loisirs", FREE_ACTIVITIES),
    ("divertissement", FREE_ACTIVITIES),
    ("shopping", SHOPPING_LIST),
    ("purchases", SHOPPING_LIST),
    ("achats", SHOPPING_LIST),
];

/// Category-specific tips, looked up by trimmed lower-case category name.
#[derive(Debug, Clone)]
pub(crate) struct TipTable {
    tips: HashMap<String, String>,
    fallback: String,
}

impl Default for TipTable {
    fn default() -> Self {
        let tips = DEFAULT_TIPS
            .iter()
            .map(|(key, tip)| (key.to_string(), tip.to_string()))
            .collect();
        Self {
            tips,
            fallback: GENERIC.to_string(),
        }
    }
}

impl TipTable {
    /// Add or replace the tip for one category.
    pub(crate) fn with_tip(mut self, category: &str, tip: &str) -> Self {
        self.tips.insert(normalize(category), tip.to_string());
        self
    }

    pub(crate) fn tip_for(&self, category: &str) -> &str {
        self.tips
            .get(&normalize(category))
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }
}

fn normalize(category: &str) -> String {
    category.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_any_casing() {
        let tips = TipTable::default();
        for name in ["Transport", "transport", "TRANSPORT", " tRaNsPoRt "] {
            assert_eq!(tips.tip_for(name), PUBLIC_TRANSIT);
        }
    }

    #[test]
    fn test_known_keys() {
        let tips = TipTable::default();
        assert_eq!(tips.tip_for("Groceries"), MEAL_PLANNING);
        assert_eq!(tips.tip_for("Nourriture"), MEAL_PLANNING);
        assert_eq!(tips.tip_for("Entertainment"), FREE_ACTIVITIES);
        assert_eq!(tips.tip_for("Loisirs"), FREE_ACTIVITIES);
        assert_eq!(tips.tip_for("Purchases"), SHOPPING_LIST);
    }

    #[test]
    fn test_unknown_category_falls_back() {
        let tips = TipTable::default();
        assert_eq!(tips.tip_for("Rent"), GENERIC);
        assert_eq!(tips.tip_for(""), GENERIC);
    }

    #[test]
    fn test_with_tip_extends_and_overrides() {
        let tips = TipTable::default()
            .with_tip("Pets", "Buy food in bulk.")
            .with_tip("TRANSPORT", "Cycle to work.");
        assert_eq!(tips.tip_for("pets"), "Buy food in bulk.");
        assert_eq!(tips.tip_for("Transport"), "Cycle to work.");
    }
}
