use std::fmt;
use std::sync::Arc;

/// Target string every log line of one session is tagged with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTarget(Arc<str>);

impl LogTarget {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn child(&self, name: &str) -> Self {
        Self(Arc::from(format!("{}/{}", self.0, name)))
    }
}

impl Default for LogTarget {
    fn default() -> Self {
        Self::new("lockstep")
    }
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_target() {
        let target = LogTarget::new("client[0]");
        assert_eq!(target.child("quality").as_str(), "client[0]/quality");
        assert_eq!(LogTarget::default().as_str(), "lockstep");
    }
}
