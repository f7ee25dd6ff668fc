use async_trait::async_trait;
use serde_json::Value;

/// Templates the handlers know how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    UserWelcome,
}

impl Template {
    pub fn subject(&self) -> &'static str {
        match self {
            Template::UserWelcome => "Welcome to Apollo!",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Template::UserWelcome => "user_welcome",
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, template: Template, data: Value) -> anyhow::Result<()>;
}

/// Writes outgoing mail to the log instead of delivering it.
///
/// Template data carries secrets such as activation tokens, so only its
/// field names are logged.
#[derive(Debug, Clone)]
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self { sender: sender.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, template: Template, data: Value) -> anyhow::Result<()> {
        if recipient.is_empty() {
            anyhow::bail!("mail recipient must not be empty");
        }
        let fields: Vec<&str> = match &data {
            Value::Object(map) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        };
        tracing::info!(
            from = %self.sender,
            to = %recipient,
            template = template.name(),
            subject = template.subject(),
            fields = ?fields,
            "mail queued"
        );
        Ok(())
    }
}
