//! Transport configuration.
//!
//! The owner hands the transport one string of the form
//! `<base-uri>[|<args>]`. The args are split shell-style; `--ua <value>`
//! overrides the User-Agent and every other token is ignored.
//!
//! ```
//! use tether_http_poll::config::TransportConfig;
//!
//! let config = TransportConfig::parse("http://h/x|--ua 'Foo/2.0 (test)'").unwrap();
//! assert_eq!(config.base_uri.as_str(), "http://h/x");
//! assert_eq!(config.user_agent.as_deref(), Some("Foo/2.0 (test)"));
//! ```

use core::time::Duration;

use crate::{error::ConfigError, uri::TargetUri};

/// User-Agent sent when the configuration does not name one.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.1; Trident/7.0; rv:11.0) like Gecko";

/// Argument that introduces a User-Agent override.
pub const USER_AGENT_FLAG: &str = "--ua";

/// Separator between the base URI and the argument string.
const ARGS_SEPARATOR: char = '|';

/// A parsed configuration string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// The initial request target.
    pub base_uri: TargetUri,

    /// User-Agent override from `--ua`, if any.
    pub user_agent: Option<String>,
}

impl TransportConfig {
    /// Parse `<base-uri>[|<args>]`.
    ///
    /// Splits on the first `|`. If `--ua` appears more than once the last
    /// value wins; a trailing `--ua` without a value is ignored. Args with
    /// unbalanced quotes are ignored as a whole.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyUri`] if the base URI is empty.
    pub fn parse(config: &str) -> Result<Self, ConfigError> {
        let (base, args) = config.split_once(ARGS_SEPARATOR).unwrap_or((config, ""));
        let base_uri = TargetUri::new(base)?;

        let user_agent = if args.trim().is_empty() {
            None
        } else if let Some(tokens) = shlex::split(args) {
            tokens
                .iter()
                .zip(tokens.iter().skip(1))
                .rev()
                .find(|(flag, _)| *flag == USER_AGENT_FLAG)
                .map(|(_, value)| value.clone())
        } else {
            tracing::warn!(args, "unbalanced quoting in transport args, ignoring them");
            None
        };

        Ok(Self {
            base_uri,
            user_agent,
        })
    }
}

/// Per-transport options, fixed once the transport is initialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// User-Agent used when the configuration string has no `--ua`.
    pub default_user_agent: String,

    /// Accept any TLS certificate and host name.
    ///
    /// Off by default. Only meaningful for `https` targets.
    pub skip_tls_validation: bool,

    /// Upper bound on a single request, enforced by the HTTP client.
    ///
    /// `None` (the default) means requests run until they finish on their
    /// own.
    pub request_timeout: Option<Duration>,
}

impl TransportOptions {
    /// Set the fallback User-Agent.
    #[must_use]
    pub fn with_default_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.default_user_agent = user_agent.into();
        self
    }

    /// Enable or disable TLS peer validation bypass.
    #[must_use]
    pub const fn with_skip_tls_validation(mut self, skip: bool) -> Self {
        self.skip_tls_validation = skip;
        self
    }

    /// Set a per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            default_user_agent: DEFAULT_USER_AGENT.to_string(),
            skip_tls_validation: false,
            request_timeout: None,
        }
    }
}

/// The fixed header list sent with every request.
///
/// Always exactly `Connection: close` followed by one `User-Agent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeaders {
    user_agent: String,
}

impl RequestHeaders {
    /// Build the header list around `user_agent`.
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }

    /// The User-Agent value.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Header name/value pairs, in send order.
    #[must_use]
    pub fn pairs(&self) -> [(&'static str, &str); 2] {
        [("Connection", "close"), ("User-Agent", &self.user_agent)]
    }

    /// Headers rendered as `Name: value` lines, in send order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.pairs()
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_uri_without_args() {
        let config = TransportConfig::parse("http://h/x").expect("valid");
        assert_eq!(config.base_uri.as_str(), "http://h/x");
        assert_eq!(config.user_agent, None);
    }

    #[test]
    fn ua_override() {
        let config = TransportConfig::parse("http://h/x|--ua Foo/2.0").expect("valid");
        assert_eq!(config.base_uri.as_str(), "http://h/x");
        assert_eq!(config.user_agent.as_deref(), Some("Foo/2.0"));
    }

    #[test]
    fn quoted_ua_keeps_spaces() {
        let config =
            TransportConfig::parse(r#"https://h|--ua "Agent/1.0 (X11; Linux)""#).expect("valid");
        assert_eq!(config.user_agent.as_deref(), Some("Agent/1.0 (X11; Linux)"));
    }

    #[test]
    fn unknown_tokens_are_ignored() {
        let config =
            TransportConfig::parse("http://h/x|--proxy p:8080 --ua A/1 extra").expect("valid");
        assert_eq!(config.user_agent.as_deref(), Some("A/1"));
    }

    #[test]
    fn last_ua_wins() {
        let config = TransportConfig::parse("http://h|--ua A/1 --ua B/2").expect("valid");
        assert_eq!(config.user_agent.as_deref(), Some("B/2"));
    }

    #[test]
    fn dangling_ua_is_ignored() {
        let config = TransportConfig::parse("http://h|--ua").expect("valid");
        assert_eq!(config.user_agent, None);
    }

    #[test]
    fn empty_args_after_separator() {
        let config = TransportConfig::parse("http://h/x|").expect("valid");
        assert_eq!(config.base_uri.as_str(), "http://h/x");
        assert_eq!(config.user_agent, None);
    }

    #[test]
    fn unbalanced_quotes_fall_back() {
        let config = TransportConfig::parse("http://h|--ua 'Foo").expect("valid");
        assert_eq!(config.user_agent, None);
    }

    #[test]
    fn only_first_separator_splits() {
        let config = TransportConfig::parse("http://h/x|--ua a|b").expect("valid");
        assert_eq!(config.base_uri.as_str(), "http://h/x");
        assert_eq!(config.user_agent.as_deref(), Some("a|b"));
    }

    #[test]
    fn empty_base_uri_fails() {
        assert_eq!(
            TransportConfig::parse("|--ua Foo/2.0"),
            Err(ConfigError::EmptyUri)
        );
        assert_eq!(TransportConfig::parse(""), Err(ConfigError::EmptyUri));
    }

    #[test]
    fn header_lines_in_order() {
        let headers = RequestHeaders::new("Foo/2.0");
        assert_eq!(
            headers.lines(),
            ["Connection: close", "User-Agent: Foo/2.0"]
        );
    }

    #[test]
    fn default_options() {
        let options = TransportOptions::default();
        assert_eq!(options.default_user_agent, DEFAULT_USER_AGENT);
        assert!(!options.skip_tls_validation);
        assert_eq!(options.request_timeout, None);
    }
}
