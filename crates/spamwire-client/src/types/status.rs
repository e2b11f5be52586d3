//! spamd status line types.

/// Response status from the daemon's first line (`SPAMD/1.5 0 EX_OK`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Protocol version the daemon speaks.
    pub version: ProtocolVersion,
    /// Numeric response code (a `sysexits.h` value).
    pub code: ResponseCode,
    /// Free-form status text (e.g. `EX_OK`, `PONG`).
    pub text: String,
}

impl StatusLine {
    /// Creates a new status line.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // String is not const-compatible
    pub fn new(version: ProtocolVersion, code: ResponseCode, text: String) -> Self {
        Self {
            version,
            code,
            text,
        }
    }

    /// Returns true if the daemon reported success.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

/// Protocol version as `major.minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
}

impl ProtocolVersion {
    /// Oldest daemon version this client accepts.
    pub const MINIMUM: Self = Self::new(1, 0);

    /// Creates a new version.
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Parses `major.minor` (a bare `major` means `major.0`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (major, minor) = match s.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (s, "0"),
        };
        if major.is_empty()
            || minor.is_empty()
            || !major.bytes().all(|b| b.is_ascii_digit())
            || !minor.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        Some(Self::new(major.parse().ok()?, minor.parse().ok()?))
    }

    /// Returns true if the version is at least [`Self::MINIMUM`].
    #[must_use]
    pub fn is_supported(self) -> bool {
        self >= Self::MINIMUM
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// spamd response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResponseCode(u16);

impl ResponseCode {
    /// 0 Success
    pub const EX_OK: Self = Self(0);
    /// 64 Command line usage error
    pub const EX_USAGE: Self = Self(64);
    /// 65 Data format error
    pub const EX_DATAERR: Self = Self(65);
    /// 74 Input/output error
    pub const EX_IOERR: Self = Self(74);
    /// 76 Remote error in protocol
    pub const EX_PROTOCOL: Self = Self(76);

    /// Creates a new response code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is `EX_OK`.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
