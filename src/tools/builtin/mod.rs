//! Built-in tools for search, calendar and mail.

pub mod calendar;
pub mod mail;
pub mod search;

pub use calendar::calendar_tools;
pub use mail::{Mailer, SendEmailTool, SmtpMailer};
pub use search::NaverSearchTool;
