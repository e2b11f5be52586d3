//! Types for the TELL (learn/report) command.

/// Message class asserted by a TELL request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    /// The message is spam.
    Spam,
    /// The message is ham.
    Ham,
}

impl MessageClass {
    /// Returns the wire name of the class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spam => "spam",
            Self::Ham => "ham",
        }
    }
}

/// Databases a TELL request targets: the local Bayes store and/or remote
/// reporting services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TellTargets {
    /// Local database.
    pub local: bool,
    /// Remote reporting services.
    pub remote: bool,
}

impl TellTargets {
    /// No targets.
    pub const NONE: Self = Self {
        local: false,
        remote: false,
    };
    /// Local database only.
    pub const LOCAL: Self = Self {
        local: true,
        remote: false,
    };
    /// Remote services only.
    pub const REMOTE: Self = Self {
        local: false,
        remote: true,
    };
    /// Both local and remote.
    pub const BOTH: Self = Self {
        local: true,
        remote: true,
    };

    /// Returns true if no target is selected.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        !self.local && !self.remote
    }

    /// ORs another set into this one.
    pub const fn merge(&mut self, other: Self) {
        self.local |= other.local;
        self.remote |= other.remote;
    }

    /// Parses a header value such as `local, remote`.
    ///
    /// Unknown words are ignored.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut targets = Self::NONE;
        for word in value.split(',').map(str::trim) {
            if word.eq_ignore_ascii_case("local") {
                targets.local = true;
            } else if word.eq_ignore_ascii_case("remote") {
                targets.remote = true;
            }
        }
        targets
    }

    /// Returns the header value, e.g. `local, remote`.
    #[must_use]
    pub fn header_value(self) -> String {
        match (self.local, self.remote) {
            (true, true) => "local, remote".to_string(),
            (true, false) => "local".to_string(),
            (false, true) => "remote".to_string(),
            (false, false) => String::new(),
        }
    }
}

/// What the daemon acknowledged after a TELL request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TellAck {
    /// Targets the message was added to (`DidSet:`).
    pub did_set: TellTargets,
    /// Targets the message was removed from (`DidRemove:`).
    pub did_remove: TellTargets,
}

impl TellAck {
    /// Returns true if the daemon changed anything.
    #[must_use]
    pub const fn changed_anything(&self) -> bool {
        !self.did_set.is_empty() || !self.did_remove.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets() {
        assert_eq!(TellTargets::parse("local"), TellTargets::LOCAL);
        assert_eq!(TellTargets::parse("remote"), TellTargets::REMOTE);
        assert_eq!(TellTargets::parse("local,remote"), TellTargets::BOTH);
        assert_eq!(TellTargets::parse(" Remote , LOCAL "), TellTargets::BOTH);
        assert_eq!(TellTargets::parse("elsewhere"), TellTargets::NONE);
    }

    #[test]
    fn test_header_value() {
        assert_eq!(TellTargets::BOTH.header_value(), "local, remote");
        assert_eq!(TellTargets::LOCAL.header_value(), "local");
        assert_eq!(TellTargets::NONE.header_value(), "");
    }

    #[test]
    fn test_merge() {
        let mut targets = TellTargets::LOCAL;
        targets.merge(TellTargets::REMOTE);
        assert_eq!(targets, TellTargets::BOTH);
    }

    #[test]
    fn test_ack_changed() {
        assert!(!TellAck::default().changed_anything());
        let ack = TellAck {
            did_set: TellTargets::LOCAL,
            did_remove: TellTargets::NONE,
        };
        assert!(ack.changed_anything());
    }
}
