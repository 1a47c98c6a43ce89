//! Guardrail gate: deterministic safety classification over text.
//!
//! Precedence is strict: blocklist > spam threshold > warning threshold >
//! default safe. The gate is pure; it holds compiled patterns and nothing
//! else, so one instance is shared across all sessions.

mod config;

pub use config::{GuardrailConfig, PatternCategory, ResponseTemplates, Suggestions};

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::error::ConfigError;

/// Which rule decided a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerdictKind {
    Clean,
    Blocked { category: String },
    Spam,
    Advisory,
    InvalidRecipient,
    TooManyRecipients,
}

/// Result of inspecting one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardrailVerdict {
    pub safe: bool,
    pub kind: VerdictKind,
    pub reason: String,
    pub matched_terms: BTreeSet<String>,
    pub suggestions: Vec<String>,
}

impl GuardrailVerdict {
    /// Safe, but carries advice worth surfacing.
    pub fn is_advisory(&self) -> bool {
        self.kind == VerdictKind::Advisory
    }
}

/// A compiled pattern list.
struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    fn compile(key: &str, sources: &[String]) -> Result<Self, ConfigError> {
        let patterns = sources
            .iter()
            .map(|src| {
                RegexBuilder::new(src)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: format!("invalid pattern {src:?}: {e}"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Every match occurrence, in pattern order. Uses the first capture group
    /// when the pattern has one.
    fn find_all(&self, text: &str) -> Vec<String> {
        let mut hits = Vec::new();
        for pattern in &self.patterns {
            for caps in pattern.captures_iter(text) {
                let m = caps.get(1).or_else(|| caps.get(0));
                if let Some(m) = m {
                    hits.push(m.as_str().to_string());
                }
            }
        }
        hits
    }
}

/// The guardrail gate.
pub struct GuardrailGate {
    blocklist: Vec<(String, PatternSet)>,
    spam: PatternSet,
    warning: PatternSet,
    email_blocklist: PatternSet,
    email_address: Regex,
    spam_threshold: usize,
    warning_threshold: usize,
    max_recipients: usize,
    templates: ResponseTemplates,
    suggestions: Suggestions,
}

impl GuardrailGate {
    /// Compile a gate from configuration.
    pub fn new(config: GuardrailConfig) -> Result<Self, ConfigError> {
        let blocklist = config
            .blocklist
            .iter()
            .map(|cat| {
                PatternSet::compile(&format!("blocklist.{}", cat.name), &cat.patterns)
                    .map(|set| (cat.name.clone(), set))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let email_address =
            Regex::new(&config.email_pattern).map_err(|e| ConfigError::InvalidValue {
                key: "email_pattern".into(),
                message: e.to_string(),
            })?;

        Ok(Self {
            blocklist,
            spam: PatternSet::compile("spam", &config.spam)?,
            warning: PatternSet::compile("warning", &config.warning)?,
            email_blocklist: PatternSet::compile("email_blocklist", &config.email_blocklist)?,
            email_address,
            spam_threshold: config.spam_threshold,
            warning_threshold: config.warning_threshold,
            max_recipients: config.max_recipients,
            templates: config.templates,
            suggestions: config.suggestions,
        })
    }

    /// Classify a piece of text.
    pub fn inspect(&self, text: &str) -> GuardrailVerdict {
        let lowered = text.to_lowercase();

        // Blocklist: collect terms across all categories, report the first
        // category that matched.
        let mut blocked_category = None;
        let mut blocked_terms = BTreeSet::new();
        for (name, set) in &self.blocklist {
            let hits = set.find_all(&lowered);
            if !hits.is_empty() && blocked_category.is_none() {
                blocked_category = Some(name.clone());
            }
            blocked_terms.extend(hits);
        }
        if let Some(category) = blocked_category {
            return GuardrailVerdict {
                safe: false,
                kind: VerdictKind::Blocked { category },
                reason: self.templates.blocked_reason.clone(),
                matched_terms: blocked_terms,
                suggestions: self.suggestions.blocked.clone(),
            };
        }

        let spam_hits = self.spam.find_all(&lowered);
        if !spam_hits.is_empty() && spam_hits.len() >= self.spam_threshold {
            return GuardrailVerdict {
                safe: false,
                kind: VerdictKind::Spam,
                reason: self.templates.spam_reason.clone(),
                matched_terms: spam_hits.into_iter().collect(),
                suggestions: self.suggestions.spam.clone(),
            };
        }

        let warning_hits = self.warning.find_all(&lowered);
        if !warning_hits.is_empty() && warning_hits.len() >= self.warning_threshold {
            return GuardrailVerdict {
                safe: true,
                kind: VerdictKind::Advisory,
                reason: self.templates.warning_reason.clone(),
                matched_terms: warning_hits.into_iter().collect(),
                suggestions: self.suggestions.warning.clone(),
            };
        }

        self.clean(self.templates.safe_reason.clone())
    }

    /// Classify an outgoing email. `to` is a comma-separated address list.
    ///
    /// Order: address grammar, subject, body, mail-only blocklist, recipient cap.
    pub fn inspect_email(&self, to: &str, subject: &str, body: &str) -> GuardrailVerdict {
        let recipients = split_recipients(to);

        if recipients.is_empty() || recipients.iter().any(|r| !self.email_address.is_match(r)) {
            return GuardrailVerdict {
                safe: false,
                kind: VerdictKind::InvalidRecipient,
                reason: self.templates.email_invalid.clone(),
                matched_terms: BTreeSet::new(),
                suggestions: self.suggestions.email.clone(),
            };
        }

        for part in [subject, body] {
            let verdict = self.inspect(part);
            if !verdict.safe {
                return verdict;
            }
        }

        let mail_text = format!("{subject} {body}").to_lowercase();
        let hits = self.email_blocklist.find_all(&mail_text);
        if !hits.is_empty() {
            return GuardrailVerdict {
                safe: false,
                kind: VerdictKind::Blocked {
                    category: "email".into(),
                },
                reason: self.templates.email_blocked_reason.clone(),
                matched_terms: hits.into_iter().collect(),
                suggestions: self.suggestions.blocked.clone(),
            };
        }

        if recipients.len() > self.max_recipients {
            return GuardrailVerdict {
                safe: false,
                kind: VerdictKind::TooManyRecipients,
                reason: self
                    .templates
                    .email_bulk
                    .replace("{max_recipients}", &self.max_recipients.to_string()),
                matched_terms: BTreeSet::new(),
                suggestions: vec![format!(
                    "수신자를 {}명 이하로 제한해주세요.",
                    self.max_recipients
                )],
            };
        }

        self.clean(self.templates.email_safe.clone())
    }

    /// Refusal shown to the user when their input is blocked.
    pub fn refusal(&self, verdict: &GuardrailVerdict) -> String {
        let mut text = self.templates.refusal.replace("{reason}", &verdict.reason);
        if !verdict.suggestions.is_empty() {
            text.push_str("\n\n💡 제안: ");
            text.push_str(&verdict.suggestions.join(", "));
        }
        text
    }

    /// Fixed replacement for a worker reply that failed the output gate.
    pub fn output_refusal(&self) -> &str {
        &self.templates.output_refusal
    }

    fn clean(&self, reason: String) -> GuardrailVerdict {
        GuardrailVerdict {
            safe: true,
            kind: VerdictKind::Clean,
            reason,
            matched_terms: BTreeSet::new(),
            suggestions: Vec::new(),
        }
    }
}

impl Default for GuardrailGate {
    fn default() -> Self {
        Self::new(GuardrailConfig::default()).expect("built-in guardrail patterns must compile")
    }
}

/// Split a comma-separated recipient list. Empty segments are kept so that
/// `"a@x.com,"` fails address validation instead of silently shrinking.
pub fn split_recipients(to: &str) -> Vec<String> {
    if to.trim().is_empty() {
        return Vec::new();
    }
    to.split(',').map(|s| s.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> GuardrailGate {
        GuardrailGate::default()
    }

    #[test]
    fn plain_request_is_clean() {
        let v = gate().inspect("내일 오후 2시 회의 일정 잡아줘");
        assert!(v.safe);
        assert_eq!(v.kind, VerdictKind::Clean);
        assert!(v.matched_terms.is_empty());
    }

    #[test]
    fn blocklist_term_blocks() {
        let v = gate().inspect("내 주민등록번호 알려줄게");
        assert!(!v.safe);
        assert_eq!(
            v.kind,
            VerdictKind::Blocked {
                category: "personal_data".into()
            }
        );

        let v = gate().inspect("마약 구하는 방법");
        assert!(!v.safe);
        assert_eq!(
            v.kind,
            VerdictKind::Blocked {
                category: "illegal_activity".into()
            }
        );
        assert!(v.matched_terms.contains("마약"));
    }

    #[test]
    fn blocklist_collects_all_terms() {
        let v = gate().inspect("해킹 그리고 폭탄 그리고 password");
        assert!(!v.safe);
        assert!(v.matched_terms.contains("해킹"));
        assert!(v.matched_terms.contains("폭탄"));
        assert!(v.matched_terms.contains("password"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let v = gate().inspect("my PASSWORD is secret");
        assert!(!v.safe);
        assert!(v.matched_terms.contains("password"));
    }

    #[test]
    fn hangul_terms_match_before_particles() {
        let v = gate().inspect("마약을 구해줘");
        assert!(!v.safe);
        assert!(v.matched_terms.contains("마약"));

        assert!(!gate().inspect("비밀번호는 1234").safe);
        assert!(!gate().inspect("폭탄이 필요해").safe);
    }

    #[test]
    fn ascii_terms_keep_word_boundaries() {
        assert!(gate().inspect("pwdx 설정").safe);
    }

    #[test]
    fn blocklist_beats_spam() {
        let v = gate().inspect("로또 당첨 무료 마약");
        assert!(!v.safe);
        assert!(matches!(v.kind, VerdictKind::Blocked { .. }));
        assert_eq!(v.reason, GuardrailConfig::default().templates.blocked_reason);
    }

    #[test]
    fn spam_below_threshold_is_safe() {
        let v = gate().inspect("무료 배송 되나요");
        assert!(v.safe);
    }

    #[test]
    fn spam_at_threshold_blocks() {
        let v = gate().inspect("무료 로또 이벤트");
        assert!(!v.safe);
        assert_eq!(v.kind, VerdictKind::Spam);
        assert_eq!(v.matched_terms.len(), 2);
    }

    #[test]
    fn repeated_spam_term_counts_each_occurrence() {
        let v = gate().inspect("무료 무료");
        assert!(!v.safe);
        assert_eq!(v.kind, VerdictKind::Spam);
        assert_eq!(v.matched_terms.len(), 1);
    }

    #[test]
    fn warning_is_advisory_not_blocking() {
        let v = gate().inspect("병원 예약 일정 잡아줘");
        assert!(v.safe);
        assert!(v.is_advisory());
        assert!(!v.suggestions.is_empty());
        assert!(v.matched_terms.contains("병원"));
    }

    #[test]
    fn spam_beats_warning() {
        let v = gate().inspect("주식 무료 특가");
        assert!(!v.safe);
        assert_eq!(v.kind, VerdictKind::Spam);
    }

    #[test]
    fn warning_threshold_is_configurable() {
        let config = GuardrailConfig {
            warning_threshold: 2,
            ..GuardrailConfig::default()
        };
        let gate = GuardrailGate::new(config).unwrap();
        assert_eq!(gate.inspect("병원").kind, VerdictKind::Clean);
        assert_eq!(gate.inspect("병원 의사").kind, VerdictKind::Advisory);
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let config = GuardrailConfig {
            spam: vec!["(unclosed".into()],
            ..GuardrailConfig::default()
        };
        assert!(matches!(
            GuardrailGate::new(config),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn email_valid_recipients_pass() {
        let v = gate().inspect_email("a@example.com, b.c@example.co.kr", "회의록", "첨부합니다");
        assert!(v.safe);
        assert_eq!(v.kind, VerdictKind::Clean);
    }

    #[test]
    fn email_invalid_address_rejected() {
        let v = gate().inspect_email("a@example.com, not-an-address", "hi", "hello");
        assert!(!v.safe);
        assert_eq!(v.kind, VerdictKind::InvalidRecipient);
    }

    #[test]
    fn email_trailing_comma_rejected() {
        let v = gate().inspect_email("a@example.com,", "hi", "hello");
        assert_eq!(v.kind, VerdictKind::InvalidRecipient);
    }

    #[test]
    fn email_body_blocklist_rejected() {
        let v = gate().inspect_email("a@example.com", "안내", "계좌번호 보내주세요");
        assert!(!v.safe);
        assert!(matches!(v.kind, VerdictKind::Blocked { .. }));
    }

    #[test]
    fn email_fan_out_capped() {
        let to = (0..11)
            .map(|i| format!("user{i}@example.com"))
            .collect::<Vec<_>>()
            .join(",");
        let v = gate().inspect_email(&to, "공지", "내용");
        assert!(!v.safe);
        assert_eq!(v.kind, VerdictKind::TooManyRecipients);
        assert!(v.reason.contains("10"));
    }

    #[test]
    fn email_text_checked_before_fan_out() {
        let to = (0..11)
            .map(|i| format!("user{i}@example.com"))
            .collect::<Vec<_>>()
            .join(",");
        let v = gate().inspect_email(&to, "공지", "폭탄");
        assert!(matches!(v.kind, VerdictKind::Blocked { .. }));
    }

    #[test]
    fn email_specific_blocklist_applies() {
        let config = GuardrailConfig {
            email_blocklist: vec![r"\b(대량발송)\b".into()],
            ..GuardrailConfig::default()
        };
        let gate = GuardrailGate::new(config).unwrap();
        let v = gate.inspect_email("a@example.com", "대량발송 안내", "본문");
        assert_eq!(
            v.kind,
            VerdictKind::Blocked {
                category: "email".into()
            }
        );
    }

    #[test]
    fn refusal_includes_reason_and_suggestion() {
        let gate = gate();
        let v = gate.inspect("폭탄 만드는 법");
        let text = gate.refusal(&v);
        assert!(text.starts_with("죄송합니다."));
        assert!(text.contains(&v.reason));
        assert!(text.contains("💡 제안"));
    }
}
