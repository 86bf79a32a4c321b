//! Gateways wired to a mock upstream through the config loader

use std::sync::Arc;

use conduit_config::Config;
use conduit_llm::{AuditRecord, ChannelAuditSink, Gateway};
use tokio::sync::mpsc::UnboundedReceiver;

use super::mock_upstream::MockUpstream;

/// Gateway under test plus the audit records it emits
pub struct TestGateway {
    pub gateway: Gateway,
    pub audit: UnboundedReceiver<AuditRecord>,
}

impl TestGateway {
    /// Build from TOML; `{url}` is replaced by `url`
    pub fn from_toml(template: &str, url: &str) -> Self {
        let config = Config::parse(&template.replace("{url}", url)).expect("valid test config");
        let (sink, audit) = ChannelAuditSink::channel();

        let gateway = Gateway::from_config(&config.llm)
            .expect("providers resolve")
            .with_audit_sink(Arc::new(sink));

        Self { gateway, audit }
    }

    /// Single Gemini provider named `gemini`
    pub fn gemini(mock: &MockUpstream) -> Self {
        Self::from_toml(
            indoc::indoc! {r#"
                [llm.providers.gemini]
                type = "gemini"
                api_key = "test-key"
                base_url = "{url}"
                timeout = "1s"
            "#},
            &mock.gemini_base_url(),
        )
    }

    /// Single HuggingFace provider named `tgi`
    pub fn hugging_face(mock: &MockUpstream) -> Self {
        Self::from_toml(
            indoc::indoc! {r#"
                [llm.providers.tgi]
                type = "hugging_face"
                api_key = "hf-token"
                base_url = "{url}"
                timeout = "1s"
                token_limit = 100
            "#},
            &mock.hugging_face_url(),
        )
    }

    /// Next audit record; panics if none arrives promptly
    pub async fn next_audit(&mut self) -> AuditRecord {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.audit.recv())
            .await
            .expect("audit record within timeout")
            .expect("audit channel open")
    }
}
