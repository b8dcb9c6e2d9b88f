use std::fmt;

use crate::error::SessionError;

const MAX_SESSION_LEN: usize = 256;

/// Connection-wide session state.
///
/// `Unbootstrapped → Established` on the first valid frame,
/// `→ Aborted` on any violation. Aborted is terminal.
#[derive(Clone, PartialEq, Eq)]
pub enum Session {
    Unbootstrapped,
    Established(String),
    Aborted,
}

impl Session {
    /// Start unbootstrapped, or established when a token was shared out of band.
    pub fn new(preset: Option<String>) -> Result<Self, SessionError> {
        match preset {
            Some(token) => {
                validate_token(&token)?;
                Ok(Session::Established(token))
            }
            None => Ok(Session::Unbootstrapped),
        }
    }

    /// Check an inbound frame's token, adopting it if no session exists yet.
    pub fn admit(&mut self, id: &str, token: Option<&str>) -> Result<(), SessionError> {
        match self {
            Session::Unbootstrapped => {
                let token = token.ok_or_else(|| SessionError::Missing { id: id.to_string() })?;
                validate_token(token)?;
                *self = Session::Established(token.to_string());
                Ok(())
            }
            Session::Established(expected) => {
                if token == Some(expected.as_str()) {
                    Ok(())
                } else {
                    Err(SessionError::Mismatch { id: id.to_string() })
                }
            }
            Session::Aborted => Err(SessionError::Mismatch { id: id.to_string() }),
        }
    }

    /// Established token, if any.
    pub fn token(&self) -> Option<&str> {
        match self {
            Session::Established(token) => Some(token),
            _ => None,
        }
    }

    pub fn abort(&mut self) {
        *self = Session::Aborted;
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Session::Aborted)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Session::Unbootstrapped => f.write_str("Unbootstrapped"),
            Session::Established(token) => f
                .debug_tuple("Established")
                .field(&format_args!("<redacted:{} bytes>", token.len()))
                .finish(),
            Session::Aborted => f.write_str("Aborted"),
        }
    }
}

fn validate_token(token: &str) -> Result<(), SessionError> {
    if token.is_empty() || token.len() > MAX_SESSION_LEN {
        return Err(SessionError::InvalidLength(token.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_establishes_session() {
        let mut session = Session::new(None).unwrap();
        session.admit("x", Some("S")).unwrap();
        assert_eq!(session.token(), Some("S"));
        session.admit("y", Some("S")).unwrap();
    }

    #[test]
    fn bootstrap_without_token_fails() {
        let mut session = Session::new(None).unwrap();
        let err = session.admit("x", None).unwrap_err();
        assert_eq!(err, SessionError::Missing { id: "x".to_string() });
        assert_eq!(session, Session::Unbootstrapped);
    }

    #[test]
    fn mismatched_or_missing_token_after_bootstrap_fails() {
        let mut session = Session::new(None).unwrap();
        session.admit("x", Some("S")).unwrap();
        assert!(matches!(
            session.admit("y", Some("T")),
            Err(SessionError::Mismatch { .. })
        ));
        assert!(matches!(
            session.admit("y", None),
            Err(SessionError::Mismatch { .. })
        ));
    }

    #[test]
    fn preset_token_must_match_first_frame() {
        let mut session = Session::new(Some("shared".to_string())).unwrap();
        assert!(session.admit("x", Some("other")).is_err());
        session.admit("x", Some("shared")).unwrap();
    }

    #[test]
    fn rejects_oversized_token() {
        let mut session = Session::new(None).unwrap();
        let token = "t".repeat(MAX_SESSION_LEN + 1);
        assert_eq!(
            session.admit("x", Some(&token)),
            Err(SessionError::InvalidLength(MAX_SESSION_LEN + 1))
        );
        assert!(Session::new(Some(String::new())).is_err());
    }

    #[test]
    fn aborted_is_terminal() {
        let mut session = Session::new(Some("S".to_string())).unwrap();
        session.abort();
        assert!(session.is_aborted());
        assert!(session.admit("x", Some("S")).is_err());
        assert_eq!(session.token(), None);
    }

    #[test]
    fn debug_output_redacts_token() {
        let session = Session::new(Some("super-secret".to_string())).unwrap();
        let debug = format!("{session:?}");
        assert!(debug.contains("<redacted:12 bytes>"));
        assert!(!debug.contains("super-secret"));
    }
}
