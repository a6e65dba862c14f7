use std::fmt;

/// The Kuadrant policy kinds handled by the controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyKind {
    Auth,
    RateLimit,
    TokenRateLimit,
    Tls,
    Dns,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 5] = [
        PolicyKind::Auth,
        PolicyKind::RateLimit,
        PolicyKind::TokenRateLimit,
        PolicyKind::Tls,
        PolicyKind::Dns,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "AuthPolicy",
            Self::RateLimit => "RateLimitPolicy",
            Self::TokenRateLimit => "TokenRateLimitPolicy",
            Self::Tls => "TLSPolicy",
            Self::Dns => "DNSPolicy",
        }
    }

    /// Whether the kind is enforced by the wasm shim in the gateway.
    pub fn is_wasm_enforced(&self) -> bool {
        matches!(self, Self::Auth | Self::RateLimit | Self::TokenRateLimit)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
