use std::fmt;

use super::model::book::Book;
use super::model::ledger::IssueLedger;
use super::model::member::Member;

/// 永続化単位。コレクションごとに独立したストアを持つ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Books,
    Members,
    Issues,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreKind::Books => "books",
            StoreKind::Members => "members",
            StoreKind::Issues => "issues",
        };
        f.write_str(name)
    }
}

/// 永続化の抽象。Infra層が実装する。
///
/// load系はストアが存在しなければ `Ok(None)`。ストア間の整合性は扱わない。
pub trait LibraryRepository {
    type Error: std::error::Error + Send + Sync + 'static;

    fn load_books(&self) -> Result<Option<Vec<Book>>, Self::Error>;
    fn load_members(&self) -> Result<Option<Vec<Member>>, Self::Error>;
    fn load_ledger(&self) -> Result<Option<IssueLedger>, Self::Error>;

    fn save_books(&self, books: &[Book]) -> Result<(), Self::Error>;
    fn save_members(&self, members: &[Member]) -> Result<(), Self::Error>;
    fn save_ledger(&self, ledger: &IssueLedger) -> Result<(), Self::Error>;
}
