//! Session identity. Not a security boundary: a session id only tells the
//! server which seat a connection controls.

use crate::types::SessionId;
use ulid::Ulid;

/// Keep a client-presented session id if it is a well-formed ULID, otherwise
/// issue a fresh one
pub fn resolve_session(presented: Option<&str>) -> SessionId {
    presented
        .map(str::trim)
        .and_then(|s| Ulid::from_string(s).ok())
        .unwrap_or_else(Ulid::new)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_session_is_kept() {
        let issued = resolve_session(None);
        assert_eq!(resolve_session(Some(&issued)), issued);
    }

    #[test]
    fn test_malformed_session_is_replaced() {
        let resolved = resolve_session(Some("not-a-session"));
        assert_ne!(resolved, "not-a-session");
        assert!(Ulid::from_string(&resolved).is_ok());
    }

    #[test]
    fn test_fresh_sessions_differ() {
        assert_ne!(resolve_session(None), resolve_session(None));
    }
}
