//! Header names and header classification rules.

use regex::Regex;
use tracing::trace;

/// Correlation identifier header.
pub const JMS_CORRELATION_ID: &str = "JMSCorrelationID";
/// Delivery mode header.
pub const JMS_DELIVERY_MODE: &str = "JMSDeliveryMode";
/// Destination header; provider assigned.
pub const JMS_DESTINATION: &str = "JMSDestination";
/// Expiration header.
pub const JMS_EXPIRATION: &str = "JMSExpiration";
/// Message identifier header; provider assigned.
pub const JMS_MESSAGE_ID: &str = "JMSMessageID";
/// Priority header.
pub const JMS_PRIORITY: &str = "JMSPriority";
/// Redelivery flag header; provider assigned.
pub const JMS_REDELIVERED: &str = "JMSRedelivered";
/// Reply-to header.
pub const JMS_REPLY_TO: &str = "JMSReplyTo";
/// Timestamp header; provider assigned.
pub const JMS_TIMESTAMP: &str = "JMSTimestamp";
/// Application message type header.
pub const JMS_TYPE: &str = "JMSType";
/// Message group property.
pub const JMSX_GROUP_ID: &str = "JMSXGroupID";
/// Authenticated user property.
pub const JMSX_USER_ID: &str = "JMSXUserID";

/// Forces the wire message type for one exchange.
pub const MESSAGE_TYPE: &str = "RelayJmsMessageType";
/// Overrides the request timeout, in milliseconds, for one exchange.
pub const REQUEST_TIMEOUT: &str = "RelayJmsRequestTimeout";
/// Overrides the endpoint destination for one exchange.
pub const DESTINATION_NAME: &str = "RelayJmsDestinationName";
/// Marks a reply carrying a processing failure.
pub const ERROR_REPLY: &str = "RelayJmsErrorReply";

const INTERNAL_PREFIXES: [&str; 2] = ["Relay", "relay"];

/// Whether `name` is a standard JMS header: `JMS` followed by a letter, but
/// neither a `JMSX` property nor a vendor `JMS_` property.
///
/// ```
/// use relaymq::binding::is_standard_jms_header;
///
/// assert!(is_standard_jms_header("JMSCorrelationID"));
/// assert!(!is_standard_jms_header("JMSXGroupID"));
/// assert!(!is_standard_jms_header("JMS_IBM_Format"));
/// assert!(!is_standard_jms_header("JMS1"));
/// ```
#[must_use]
pub fn is_standard_jms_header(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("JMS") else {
        return false;
    };
    if rest.starts_with('X') || rest.starts_with('_') {
        return false;
    }
    rest.chars().next().is_some_and(char::is_alphabetic)
}

/// Whether `name` is an internal control header never written to the wire.
#[must_use]
pub fn is_internal_header(name: &str) -> bool {
    INTERNAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Compiled `allowAdditionalHeaders` entry.
///
/// A name matches when it equals the pattern, when it matches the pattern read
/// as a wildcard (`*` standing for any run of characters), or when the whole
/// name matches the pattern read as a regular expression. Patterns that are
/// not valid regular expressions only match exactly or as wildcards.
#[derive(Clone, Debug)]
pub struct HeaderPattern {
    raw: String,
    matchers: Vec<Regex>,
}

impl HeaderPattern {
    /// Compile `pattern`.
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let raw = pattern.trim().to_owned();
        let wildcard = raw.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
        let matchers = [format!("^{wildcard}$"), format!("^(?:{raw})$")]
            .iter()
            .filter_map(|source| {
                Regex::new(source)
                    .inspect_err(|e| trace!(pattern = %raw, error = %e, "header pattern skipped"))
                    .ok()
            })
            .collect();
        Self { raw, matchers }
    }

    /// The pattern as configured.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.raw }

    /// Whether `name` matches this pattern.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        name == self.raw || self.matchers.iter().any(|regex| regex.is_match(name))
    }
}

/// Whether `name` matches `pattern`; see [`HeaderPattern`].
#[must_use]
pub fn matches_pattern(name: &str, pattern: &str) -> bool { HeaderPattern::new(pattern).matches(name) }
