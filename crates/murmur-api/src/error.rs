use thiserror::Error;

use murmur_types::UserId;
use murmur_types::api::{ErrorBody, ErrorKind};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing, invalid or expired session token")]
    Unauthenticated,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email is already registered")]
    EmailInUse,

    #[error("conversation {0} not found")]
    ConversationNotFound(i64),

    #[error("unknown user id(s): {0:?}")]
    UnknownUser(Vec<UserId>),

    #[error("not a member of conversation {0}")]
    NotAMember(i64),

    #[error("message content is empty")]
    EmptyContent,

    #[error("a group needs at least one member besides its creator")]
    EmptyMembership,

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::EmailInUse => "EMAIL_IN_USE",
            Self::ConversationNotFound(_) => "NOT_FOUND",
            Self::UnknownUser(_) => "UNKNOWN_USER",
            Self::NotAMember(_) => "NOT_A_MEMBER",
            Self::EmptyContent => "EMPTY_CONTENT",
            Self::EmptyMembership => "EMPTY_MEMBERSHIP",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated | Self::InvalidCredentials => ErrorKind::Unauthenticated,
            Self::ConversationNotFound(_) | Self::UnknownUser(_) => ErrorKind::NotFound,
            Self::NotAMember(_) => ErrorKind::Forbidden,
            Self::EmailInUse => ErrorKind::Conflict,
            Self::EmptyContent | Self::EmptyMembership | Self::InvalidInput(_) => {
                ErrorKind::InvalidInput
            }
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Wire body; internal details stay in the server log.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorBody::new(self.code(), self.kind(), message)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_kinds() {
        assert_eq!(ApiError::NotAMember(3).code(), "NOT_A_MEMBER");
        assert_eq!(ApiError::NotAMember(3).kind(), ErrorKind::Forbidden);
        assert_eq!(ApiError::EmailInUse.kind(), ErrorKind::Conflict);
        assert_eq!(ApiError::UnknownUser(vec![9]).kind(), ErrorKind::NotFound);
        assert_eq!(ApiError::InvalidCredentials.kind(), ErrorKind::Unauthenticated);
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = ApiError::from(anyhow::anyhow!("disk I/O error at /var/lib/murmur.db"));
        let body = err.to_body();
        assert_eq!(body.error, "INTERNAL");
        assert!(!body.message.contains("/var/lib"));
    }
}
