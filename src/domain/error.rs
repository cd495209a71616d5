use super::model::id::{BookId, MemberId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("{0} is required")]
    EmptyField(&'static str),

    #[error("book with id {0} already exists")]
    DuplicateBook(BookId),

    #[error("member with id {0} already exists")]
    DuplicateMember(MemberId),

    #[error("book not found: {0}")]
    BookNotFound(BookId),

    #[error("member not found: {0}")]
    MemberNotFound(MemberId),

    #[error("book {book} is already issued to {member}")]
    AlreadyIssued { book: BookId, member: MemberId },

    #[error("no copies of book {0} available")]
    NoCopiesAvailable(BookId),

    #[error("book {0} is not issued")]
    NotIssued(BookId),
}
