//! Auth gate trait: the binary admit/deny token
//! check external middleware must satisfy. Authorization fineness beyond
//! admit/deny is an explicit Non-goal.

/// Constant-time-ish comparison is not required here — the contract is
/// "binary admit/deny", not a security-sensitive crypto boundary owned by
/// the core; that lives in the external auth middleware.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, presented: Option<&str>) -> bool;
}

pub struct BearerTokenVerifier {
    expected: String,
}

impl BearerTokenVerifier {
    pub fn new(expected: impl Into<String>) -> Self {
        Self { expected: expected.into() }
    }
}

impl TokenVerifier for BearerTokenVerifier {
    fn verify(&self, presented: Option<&str>) -> bool {
        match presented {
            Some(token) => token == self.expected,
            None => false,
        }
    }
}

/// Local/dev use: admits everyone.
pub struct AllowAll;

impl TokenVerifier for AllowAll {
    fn verify(&self, _presented: Option<&str>) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_rejects_missing_and_wrong_token() {
        let v = BearerTokenVerifier::new("secret");
        assert!(v.verify(Some("secret")));
        assert!(!v.verify(Some("wrong")));
        assert!(!v.verify(None));
    }

    #[test]
    fn allow_all_admits_everything() {
        assert!(AllowAll.verify(None));
        assert!(AllowAll.verify(Some("anything")));
    }
}
