//! Outgoing mail tool for the Mail worker.
//!
//! Every message passes `GuardrailGate::inspect_email` before it reaches the
//! transport; a block is reported back to the worker as a tool failure.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use crate::config::SmtpConfig;
use crate::context::CycleContext;
use crate::guardrail::{GuardrailGate, split_recipients};
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

/// Delivery seam so the tool can be exercised without an SMTP server.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message. Returns a message id when the transport has one.
    async fn send(
        &self,
        to: &[String],
        subject: &str,
        body: &str,
    ) -> Result<Option<String>, ToolError>;
}

/// SMTP delivery via lettre.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, to: &[String], subject: &str, body: &str) -> Result<Message, ToolError> {
        let from: Mailbox = self
            .config
            .from_address
            .parse()
            .map_err(|e| ToolError::ExecutionFailed(format!("Invalid from address: {e}")))?;

        let mut builder = Message::builder().from(from).subject(subject);
        for addr in to {
            let mailbox: Mailbox = addr
                .parse()
                .map_err(|e| ToolError::InvalidParameters(format!("Invalid to address: {e}")))?;
            builder = builder.to(mailbox);
        }
        builder
            .body(body.to_string())
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to build email: {e}")))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, ToolError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );
        Ok(AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
            .map_err(|e| ToolError::ExternalService(format!("SMTP relay error: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .timeout(Some(self.config.timeout))
            .build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    /// Dropping the returned future closes the SMTP connection, so a caller
    /// that times out never leaves a send running behind its back.
    async fn send(
        &self,
        to: &[String],
        subject: &str,
        body: &str,
    ) -> Result<Option<String>, ToolError> {
        let message = self.build_message(to, subject, body)?;
        let transport = self.transport()?;

        let response = transport
            .send(message)
            .await
            .map_err(|e| ToolError::ExternalService(format!("SMTP send failed: {e}")))?;

        Ok(response.message().next().map(|line| line.to_string()))
    }
}

/// Sends an email after a guardrail check.
pub struct SendEmailTool {
    mailer: Arc<dyn Mailer>,
    gate: Arc<GuardrailGate>,
}

impl SendEmailTool {
    pub fn new(mailer: Arc<dyn Mailer>, gate: Arc<GuardrailGate>) -> Self {
        Self { mailer, gate }
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Send an email. Use when the user wants to share something externally or \
         mail someone. Multiple recipients are comma separated."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "to": {
                    "type": "string",
                    "description": "Recipient address(es), comma separated"
                },
                "subject": {"type": "string", "description": "Subject line"},
                "body": {"type": "string", "description": "Plain-text body"}
            },
            "required": ["to", "subject", "body"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &CycleContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let to = require_str(&params, "to")?;
        let subject = require_str(&params, "subject")?;
        let body = require_str(&params, "body")?;

        let verdict = self.gate.inspect_email(to, subject, body);
        if !verdict.safe {
            tracing::warn!(
                session_id = %ctx.session_id,
                reason = %verdict.reason,
                matched = ?verdict.matched_terms,
                "Outgoing email blocked"
            );
            return Err(ToolError::Blocked(verdict.reason));
        }

        let recipients = split_recipients(to);
        let message_id = self.mailer.send(&recipients, subject, body).await?;
        tracing::info!(
            session_id = %ctx.session_id,
            recipients = recipients.len(),
            "Email sent"
        );

        let preview: String = body.chars().take(100).collect();
        let ellipsis = if body.chars().count() > 100 { "..." } else { "" };
        let mut text = format!(
            "✅ 이메일이 성공적으로 발송되었습니다!\n\n📧 이메일 정보:\n• 수신자: {to}\n• 제목: {subject}\n• 내용: {preview}{ellipsis}"
        );
        if let Some(id) = message_id {
            text.push_str(&format!("\n\n🆔 메시지 ID: `{id}`"));
        }
        Ok(ToolOutput::text(text, start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(Vec<String>, String)>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(
            &self,
            to: &[String],
            subject: &str,
            _body: &str,
        ) -> Result<Option<String>, ToolError> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_vec(), subject.to_string()));
            Ok(Some("msg-1".to_string()))
        }
    }

    fn setup() -> (Arc<RecordingMailer>, SendEmailTool, CycleContext) {
        let mailer = Arc::new(RecordingMailer::default());
        let tool = SendEmailTool::new(mailer.clone(), Arc::new(GuardrailGate::default()));
        (mailer, tool, CycleContext::new("s", Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn sends_clean_mail() {
        let (mailer, tool, ctx) = setup();
        let out = tool
            .execute(
                serde_json::json!({
                    "to": "a@example.com, b@example.com",
                    "subject": "회의록",
                    "body": "오늘 회의 내용 공유드립니다."
                }),
                &ctx,
            )
            .await
            .unwrap();

        let text = out.to_text();
        assert!(text.contains("성공적으로 발송"));
        assert!(text.contains("msg-1"));

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, vec!["a@example.com", "b@example.com"]);
    }

    #[tokio::test]
    async fn invalid_address_never_reaches_transport() {
        let (mailer, tool, ctx) = setup();
        let err = tool
            .execute(
                serde_json::json!({"to": "not-an-address", "subject": "hi", "body": "hello"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Blocked(_)));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blocklisted_body_is_blocked() {
        let (mailer, tool, ctx) = setup();
        let err = tool
            .execute(
                serde_json::json!({
                    "to": "a@example.com",
                    "subject": "정보",
                    "body": "제 계좌번호 보내드립니다"
                }),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Blocked(_)));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn smtp_message_accepts_multiple_recipients() {
        let mailer = SmtpMailer::new(SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: "bot".into(),
            password: "pw".to_string().into(),
            from_address: "bot@example.com".into(),
            timeout: Duration::from_secs(15),
        });
        let to = vec!["a@example.com".to_string(), "b@example.com".to_string()];
        assert!(mailer.build_message(&to, "s", "b").is_ok());

        let bad = vec!["nope".to_string()];
        assert!(matches!(
            mailer.build_message(&bad, "s", "b"),
            Err(ToolError::InvalidParameters(_))
        ));
    }

    #[tokio::test]
    async fn abandoned_send_releases_the_connection() {
        let _ = rustls::crypto::ring::default_provider().install_default();

        // A relay that accepts the connection and never says anything.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mailer = SmtpMailer::new(SmtpConfig {
            host: "127.0.0.1".into(),
            port,
            username: "bot".into(),
            password: "pw".to_string().into(),
            from_address: "bot@example.com".into(),
            timeout: Duration::from_secs(60),
        });
        let to = vec!["a@example.com".to_string()];

        let (accepted, send) = tokio::join!(
            tokio::time::timeout(Duration::from_secs(2), listener.accept()),
            tokio::time::timeout(Duration::from_millis(200), mailer.send(&to, "s", "b")),
        );
        assert!(send.is_err(), "send should still be waiting on the relay");

        let (mut socket, _) = accepted.unwrap().unwrap();
        let mut buf = [0u8; 1024];
        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "dropped send kept the SMTP connection open");
    }
}
