//! Gossip topic naming.
//!
//! ```text
//! /{namespace}/{version}/{application}/{deployment}/{encoding}
//! /{namespace}/{version}/{application}/{encoding}          (no deployment)
//! ```

use std::fmt;
use std::str::FromStr;

use super::errors::TopicError;

/// A parsed gossip topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub namespace: String,
    pub version: String,
    pub application: String,
    pub deployment: Option<String>,
    pub encoding: String,
}

impl Topic {
    pub fn new(
        namespace: impl Into<String>,
        version: impl Into<String>,
        application: impl Into<String>,
        deployment: Option<String>,
        encoding: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            version: version.into(),
            application: application.into(),
            deployment,
            encoding: encoding.into(),
        }
    }

    /// Same topic family, scoped to one deployment.
    pub fn with_deployment(&self, deployment: impl Into<String>) -> Self {
        Self {
            deployment: Some(deployment.into()),
            ..self.clone()
        }
    }

    /// Parse a topic string.
    pub fn parse(text: &str) -> Result<Self, TopicError> {
        let invalid = || TopicError(text.to_string());
        let rest = text.strip_prefix('/').ok_or_else(invalid)?;
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }

        match segments.as_slice() {
            [namespace, version, application, encoding] => Ok(Self::new(
                *namespace,
                *version,
                *application,
                None,
                *encoding,
            )),
            [namespace, version, application, deployment, encoding] => Ok(Self::new(
                *namespace,
                *version,
                *application,
                Some(deployment.to_string()),
                *encoding,
            )),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}/{}/", self.namespace, self.version, self.application)?;
        if let Some(deployment) = &self.deployment {
            write!(f, "{}/", deployment)?;
        }
        write!(f, "{}", self.encoding)
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_topic_format() {
        let base = Topic::new("graphcast", "0", "poi-crosschecker", None, "proto");
        let topic = base.with_deployment("QmWmyoMoctfbAaiEs2G46gpeUmhqFRDW6KWo64y5r581Vz");
        assert_eq!(
            topic.to_string(),
            "/graphcast/0/poi-crosschecker/QmWmyoMoctfbAaiEs2G46gpeUmhqFRDW6KWo64y5r581Vz/proto"
        );
        assert_eq!(base.to_string(), "/graphcast/0/poi-crosschecker/proto");
    }

    #[test]
    fn test_parse_recovers_components() {
        let topic: Topic = "/graphcast-test/0/poi-crosschecker/Qmaaa/proto".parse().unwrap();
        assert_eq!(topic.namespace, "graphcast-test");
        assert_eq!(topic.deployment.as_deref(), Some("Qmaaa"));
        assert_eq!(topic.encoding, "proto");

        let without = Topic::parse("/graphcast/0/ping-pong/proto").unwrap();
        assert_eq!(without.deployment, None);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Topic::parse("graphcast/0/app/proto").is_err());
        assert!(Topic::parse("/graphcast/0/app//proto").is_err());
        assert!(Topic::parse("/graphcast/0/proto").is_err());
        assert!(Topic::parse("/a/b/c/d/e/f").is_err());
    }
}
