use anyhow::Result;
use rulegen_core::error::RulegenError;
use rulegen_core::references::ReferenceChecker;
use std::time::Duration;

/// HEAD-checks reference URLs over HTTP. Redirects are not followed, so a
/// moved page reports its 3xx status.
pub struct HttpLinkChecker {
    agent: ureq::Agent,
}

impl HttpLinkChecker {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .redirects(0)
            .build();
        Self { agent }
    }
}

impl ReferenceChecker for HttpLinkChecker {
    fn status(&self, url: &str) -> Result<String> {
        match self.agent.head(url).call() {
            Ok(response) => Ok(response.status().to_string()),
            Err(ureq::Error::Status(code, _)) => Ok(code.to_string()),
            Err(ureq::Error::Transport(transport)) => Err(RulegenError::ReferenceTransport {
                url: url.to_string(),
                reason: transport.to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_url_is_a_transport_error() {
        let checker = HttpLinkChecker::new(Duration::from_secs(1));
        let err = checker.status("not a url").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RulegenError>(),
            Some(RulegenError::ReferenceTransport { .. })
        ));
    }
}
