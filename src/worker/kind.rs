//! The closed set of workers the router can dispatch to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A specialized worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkerKind {
    /// Web search and information lookup.
    #[serde(rename = "Researcher")]
    Search,
    /// Calendar event management.
    Calendar,
    /// Free-form conversation, no tools.
    Chat,
    /// Outgoing mail and external sharing.
    Mail,
}

impl WorkerKind {
    pub const ALL: [WorkerKind; 4] = [Self::Search, Self::Calendar, Self::Chat, Self::Mail];

    /// Name used on the routing wire and as turn author.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "Researcher",
            Self::Calendar => "Calendar",
            Self::Chat => "Chat",
            Self::Mail => "Mail",
        }
    }

    /// One-line routing hint shown to the router.
    pub fn routing_hint(&self) -> &'static str {
        match self {
            Self::Search => "검색이나 정보 조사가 필요한 경우",
            Self::Calendar => "일정 관리나 캘린더 등록이 필요한 경우",
            Self::Chat => "일반적인 대화나 질문에 답변이 필요한 경우",
            Self::Mail => "외부 공유, 이메일 발송이 필요한 경우",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownWorker(pub String);

impl FromStr for WorkerKind {
    type Err = UnknownWorker;

    /// Exact match only; no case folding or aliasing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownWorker(s.to_string()))
    }
}
