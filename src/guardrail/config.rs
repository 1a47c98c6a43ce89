//! Guardrail pattern tables and thresholds.
//!
//! Tables are plain regex strings grouped by category so they can be shipped
//! as a JSON file and swapped without a rebuild. Missing fields in a file
//! fall back to the built-in defaults.
//!
//! Korean attaches particles directly to the noun (`마약을`, `비밀번호는`), so
//! the built-in Hangul patterns anchor only the start of a word. A trailing
//! `\b` on a Hangul term would let every inflected form through. ASCII terms
//! keep both boundaries.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A named group of blocklist patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternCategory {
    pub name: String,
    pub patterns: Vec<String>,
}

impl PatternCategory {
    fn new(name: &str, patterns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// User-facing wording for verdicts and refusals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseTemplates {
    pub blocked_reason: String,
    pub spam_reason: String,
    pub warning_reason: String,
    pub safe_reason: String,
    /// Input refusal. `{reason}` is replaced with the verdict reason.
    pub refusal: String,
    /// Replacement for a worker reply that failed the output gate.
    pub output_refusal: String,
    pub email_invalid: String,
    /// `{max_recipients}` is replaced with the configured cap.
    pub email_bulk: String,
    pub email_blocked_reason: String,
    pub email_safe: String,
}

impl Default for ResponseTemplates {
    fn default() -> Self {
        Self {
            blocked_reason: "금지된 키워드가 포함되어 있습니다.".into(),
            spam_reason: "스팸/피싱 의심 키워드가 다수 포함되어 있습니다.".into(),
            warning_reason: "전문가 조언이 필요한 내용이 포함되어 있습니다.".into(),
            safe_reason: "안전한 입력입니다.".into(),
            refusal: "죄송합니다. {reason} 안전상의 이유로 해당 요청을 처리할 수 없습니다."
                .into(),
            output_refusal:
                "죄송합니다. 안전하지 않은 내용이 포함된 응답이 생성되었습니다. 다시 시도해주세요."
                    .into(),
            email_invalid: "유효하지 않은 이메일 주소가 포함되어 있습니다.".into(),
            email_bulk: "대량 이메일 발송은 제한됩니다. (최대 {max_recipients}명)".into(),
            email_blocked_reason: "이메일 특화 금지 키워드가 포함되어 있습니다.".into(),
            email_safe: "안전한 이메일입니다.".into(),
        }
    }
}

/// Suggestions attached to each verdict kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Suggestions {
    pub blocked: Vec<String>,
    pub spam: Vec<String>,
    pub warning: Vec<String>,
    pub email: Vec<String>,
}

impl Default for Suggestions {
    fn default() -> Self {
        Self {
            blocked: vec!["안전한 주제로 대화를 이어가주세요.".into()],
            spam: vec!["정상적인 요청으로 다시 시도해주세요.".into()],
            warning: vec!["전문가와 상담하시는 것을 권장합니다.".into()],
            email: vec!["올바른 이메일 주소를 입력해주세요.".into()],
        }
    }
}

/// Full guardrail configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    /// Any match blocks.
    pub blocklist: Vec<PatternCategory>,
    /// Blocks once the total match count reaches `spam_threshold`.
    pub spam: Vec<String>,
    /// Never blocks; advisory once matches reach `warning_threshold`.
    pub warning: Vec<String>,
    /// Extra blocklist applied only to outgoing mail subject and body.
    pub email_blocklist: Vec<String>,
    pub spam_threshold: usize,
    pub warning_threshold: usize,
    pub max_recipients: usize,
    pub email_pattern: String,
    pub templates: ResponseTemplates,
    pub suggestions: Suggestions,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            blocklist: vec![
                PatternCategory::new(
                    "personal_data",
                    &[
                        r"\b(주민번호|주민등록번호|주민등록번호앞자리|주민등록번호뒤자리)",
                        r"\b(신용카드|카드번호|카드번호앞자리|카드번호뒤자리)",
                        r"\b(계좌번호|은행계좌|계좌정보)",
                        r"\b(비밀번호|패스워드)",
                        r"\b(password|pw|pwd)\b",
                    ],
                ),
                PatternCategory::new(
                    "illegal_activity",
                    &[
                        r"\b(마약|대마|코카인|헤로인|암페타민)",
                        r"\b(자살|자해|목매달기|약물중독)",
                        r"\b(테러|폭탄|폭발물|무기제조)",
                        r"\b(해킹|크래킹|불법침입|바이러스제조)",
                    ],
                ),
                PatternCategory::new(
                    "explicit_content",
                    &[
                        r"\b(포르노|야동|성인영상|음란물)",
                        r"\b(성매매|매춘|창녀|남창)",
                    ],
                ),
                PatternCategory::new(
                    "hate_violence",
                    &[
                        r"\b(살인|폭력|구타|폭행)",
                        r"\b(인종차별|성차별|장애인차별|연령차별)",
                        r"\b(혐오|증오|비하|모욕)",
                    ],
                ),
            ],
            spam: vec![
                r"\b(당첨|상금|로또|복권당첨)".into(),
                r"\b(상속|유산|돈|재산)".into(),
                r"\b(비밀|기밀|특별|한정)".into(),
                r"\b(무료|공짜|할인|특가)".into(),
            ],
            warning: vec![
                r"\b(진단|처방|약물|치료방법)".into(),
                r"\b(병원|의사|약사|의료진)".into(),
                r"\b(소송|고소|고발|법적조치)".into(),
                r"\b(변호사|법무사|법원|재판)".into(),
                r"\b(투자|주식|부동산|재테크)".into(),
                r"\b(대출|이자|금리|수익률)".into(),
            ],
            email_blocklist: Vec::new(),
            spam_threshold: 2,
            warning_threshold: 1,
            max_recipients: 10,
            email_pattern: r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$".into(),
            templates: ResponseTemplates::default(),
            suggestions: Suggestions::default(),
        }
    }
}

impl GuardrailConfig {
    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        tracing::info!(
            path = %path.as_ref().display(),
            categories = config.blocklist.len(),
            "Loaded guardrail tables"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_thresholds() {
        let config = GuardrailConfig::default();
        assert_eq!(config.spam_threshold, 2);
        assert_eq!(config.warning_threshold, 1);
        assert_eq!(config.max_recipients, 10);
        assert_eq!(config.blocklist.len(), 4);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"spam_threshold": 3, "warning": []}}"#).unwrap();

        let config = GuardrailConfig::from_file(file.path()).unwrap();
        assert_eq!(config.spam_threshold, 3);
        assert!(config.warning.is_empty());
        // untouched fields come from the defaults
        assert_eq!(config.max_recipients, 10);
        assert_eq!(config.blocklist.len(), 4);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            GuardrailConfig::from_file(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            GuardrailConfig::from_file("/nonexistent/guardrails.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
