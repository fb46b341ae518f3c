// Error classification tests

use likebridge::error::{ErrorKind, LikeBridgeError};

#[cfg(test)]
mod error_kind_tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            LikeBridgeError::InvalidParameter("actor".into()).kind(),
            ErrorKind::Parameter
        );
        assert_eq!(LikeBridgeError::Conflict("dup".into()).kind(), ErrorKind::Conflict);
        assert_eq!(LikeBridgeError::SystemBusy("lock".into()).kind(), ErrorKind::Transient);
        assert_eq!(LikeBridgeError::Database("down".into()).kind(), ErrorKind::Transient);
        assert_eq!(LikeBridgeError::Delivery("lost".into()).kind(), ErrorKind::Delivery);
        assert_eq!(LikeBridgeError::Validation("bad".into()).kind(), ErrorKind::Fatal);
        assert_eq!(LikeBridgeError::MalformedEvent("json".into()).kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_is_conflict() {
        assert!(LikeBridgeError::Conflict("actor 1 has already liked subject 2".into()).is_conflict());
        assert!(!LikeBridgeError::SystemBusy("lock".into()).is_conflict());
    }

    #[test]
    fn test_display() {
        let err = LikeBridgeError::Conflict("actor 1 has already liked subject 2".into());
        assert_eq!(
            err.to_string(),
            "Duplicate operation: actor 1 has already liked subject 2"
        );
    }
}
