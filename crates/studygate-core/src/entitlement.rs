//! Credit entitlement gate for generation requests.
//!
//! `can_generate` is the only place that decides whether a flashcard or quiz
//! generation may be dispatched. It is pure: no I/O, no clock, no state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::User;

/// Credits charged per generated flashcard
pub const FLASHCARD_UNIT_COST: u32 = 1;

/// Credits charged per generated quiz question
pub const QUIZ_QUESTION_UNIT_COST: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum GenerationKind {
    Flashcard,
    Quiz,
}

impl GenerationKind {
    pub fn unit_cost(&self) -> u32 {
        match self {
            GenerationKind::Flashcard => FLASHCARD_UNIT_COST,
            GenerationKind::Quiz => QUIZ_QUESTION_UNIT_COST,
        }
    }

    fn noun(&self, quantity: u32) -> &'static str {
        match (self, quantity) {
            (GenerationKind::Flashcard, 1) => "flashcard",
            (GenerationKind::Flashcard, _) => "flashcards",
            (GenerationKind::Quiz, 1) => "quiz question",
            (GenerationKind::Quiz, _) => "quiz questions",
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationKind::Flashcard => write!(f, "flashcard"),
            GenerationKind::Quiz => write!(f, "quiz"),
        }
    }
}

impl FromStr for GenerationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "flashcard" | "flashcards" => Ok(GenerationKind::Flashcard),
            "quiz" | "quizzes" => Ok(GenerationKind::Quiz),
            other => Err(format!("Unknown generation kind: {}", other)),
        }
    }
}

/// Outcome of an entitlement check. Recomputed per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct EntitlementResult {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<u32>,
}

impl EntitlementResult {
    /// Credits missing for the request, zero when allowed
    pub fn shortfall(&self) -> u32 {
        match (self.credits, self.required) {
            (Some(credits), Some(required)) => required.saturating_sub(credits),
            _ => 0,
        }
    }
}

/// Decide whether `user` may generate `quantity` items of `kind`.
pub fn can_generate(kind: GenerationKind, user: Option<&User>, quantity: u32) -> EntitlementResult {
    let Some(user) = user else {
        return EntitlementResult {
            allowed: false,
            reason: Some("must be authenticated".to_string()),
            credits: None,
            required: None,
        };
    };

    let required = quantity.saturating_mul(kind.unit_cost());
    let credits = user.credits;

    if credits >= required {
        return EntitlementResult {
            allowed: true,
            reason: None,
            credits: Some(credits),
            required: Some(required),
        };
    }

    EntitlementResult {
        allowed: false,
        reason: Some(format!(
            "Insufficient credits: {} {} need {} credits but only {} are available ({} short)",
            quantity,
            kind.noun(quantity),
            required,
            credits,
            required - credits
        )),
        credits: Some(credits),
        required: Some(required),
    }
}

pub fn can_generate_flashcards(user: Option<&User>, count: u32) -> EntitlementResult {
    can_generate(GenerationKind::Flashcard, user, count)
}

pub fn can_generate_quiz(user: Option<&User>, questions: u32) -> EntitlementResult {
    can_generate(GenerationKind::Quiz, user, questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [GenerationKind; 2] = [GenerationKind::Flashcard, GenerationKind::Quiz];

    fn user_with(credits: u32) -> User {
        User::new("u_1", credits)
    }

    #[test]
    fn test_required_is_quantity_times_unit_cost() {
        let user = user_with(0);
        for kind in KINDS {
            for q in [1, 2, 5, 17, 250] {
                let result = can_generate(kind, Some(&user), q);
                assert_eq!(result.required, Some(q * kind.unit_cost()));
            }
        }
    }

    #[test]
    fn test_absent_user_never_allowed() {
        for kind in KINDS {
            for q in [0, 1, 10, u32::MAX] {
                let result = can_generate(kind, None, q);
                assert!(!result.allowed);
                assert_eq!(result.reason.as_deref(), Some("must be authenticated"));
                assert!(result.credits.is_none());
            }
        }
    }

    #[test]
    fn test_boundary_balances() {
        for kind in KINDS {
            for q in [1, 3, 20] {
                let required = q * kind.unit_cost();
                for credits in [0, required - 1, required, required + 1] {
                    let result = can_generate(kind, Some(&user_with(credits)), q);
                    assert_eq!(result.allowed, credits >= required, "credits={} required={}", credits, required);
                    assert_eq!(result.credits, Some(credits));
                    assert_eq!(result.required, Some(required));
                    assert_eq!(result.reason.is_some(), !result.allowed);
                }
            }
        }
    }

    #[test]
    fn test_denial_reason_states_shortfall() {
        let result = can_generate_flashcards(Some(&user_with(3)), 10);
        assert!(!result.allowed);
        assert_eq!(result.shortfall(), 7);
        let reason = result.reason.unwrap();
        assert!(reason.contains("10 flashcards"));
        assert!(reason.contains("7 short"));

        let quiz = can_generate_quiz(Some(&user_with(0)), 1);
        assert!(quiz.reason.unwrap().contains("1 quiz question "));
    }

    #[test]
    fn test_zero_quantity_is_allowed() {
        for kind in KINDS {
            let result = can_generate(kind, Some(&user_with(0)), 0);
            assert!(result.allowed);
            assert_eq!(result.required, Some(0));
            assert_eq!(result.shortfall(), 0);
        }
    }

    #[test]
    fn test_huge_quantity_does_not_overflow() {
        let result = can_generate(GenerationKind::Quiz, Some(&user_with(u32::MAX)), u32::MAX);
        assert!(result.allowed);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("flashcard".parse::<GenerationKind>(), Ok(GenerationKind::Flashcard));
        assert_eq!("Flashcards".parse::<GenerationKind>(), Ok(GenerationKind::Flashcard));
        assert_eq!(" quiz ".parse::<GenerationKind>(), Ok(GenerationKind::Quiz));
        assert!("essay".parse::<GenerationKind>().is_err());
    }

    #[test]
    fn test_result_serializes_without_empty_fields() {
        let json = serde_json::to_string(&can_generate_quiz(None, 1)).unwrap();
        assert_eq!(json, r#"{"allowed":false,"reason":"must be authenticated"}"#);
    }
}
