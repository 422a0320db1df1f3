//! Token verification failures and their stable error codes.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token carries no display name")]
    MissingName,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl AuthError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::Expired => "token_expired",
            Self::NotYetValid => "token_not_yet_valid",
            Self::InvalidSignature => "invalid_signature",
            Self::Malformed(_) => "malformed_token",
            Self::MissingName => "missing_name",
            Self::Signing(_) => "signing_failed",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            _ => Self::Malformed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(AuthError::Expired.error_code(), "token_expired");
        assert_eq!(AuthError::InvalidSignature.error_code(), "invalid_signature");
        assert_eq!(
            AuthError::Malformed("bad".into()).error_code(),
            "malformed_token"
        );
        assert_eq!(AuthError::MissingName.error_code(), "missing_name");
    }

    #[test]
    fn jwt_kinds_map_to_variants() {
        use jsonwebtoken::errors::{Error, ErrorKind};

        let expired: Error = ErrorKind::ExpiredSignature.into();
        assert_eq!(AuthError::from(expired), AuthError::Expired);

        let bad_sig: Error = ErrorKind::InvalidSignature.into();
        assert_eq!(AuthError::from(bad_sig), AuthError::InvalidSignature);

        let invalid: Error = ErrorKind::InvalidToken.into();
        assert!(matches!(AuthError::from(invalid), AuthError::Malformed(_)));
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(AuthError::Expired.to_string(), "token expired");
        assert_eq!(
            AuthError::Malformed("missing segment".into()).to_string(),
            "malformed token: missing segment"
        );
    }
}
