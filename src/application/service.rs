use crate::domain::model::book::{AddBookRequest, Book};
use crate::domain::model::ledger::IssueLedger;
use crate::domain::model::library::{IssueReceipt, Library, ReturnReceipt};
use crate::domain::model::member::{AddMemberRequest, Member};
use crate::domain::repository::{LibraryRepository, StoreKind};

use super::error::AppError;

/// Libraryに対するユースケース。
/// メモリ上の状態を直接変更し、成功したら3ストアすべてを書き出す。
pub struct LibraryService<R: LibraryRepository> {
    repo: R,
    library: Library,
}

impl<R: LibraryRepository> LibraryService<R> {
    pub fn new(repo: R, library: Library) -> Self {
        Self { repo, library }
    }

    /// 各ストアを個別に読み込んで開く。読めないストアは空として扱う。
    pub fn open(repo: R) -> Self {
        let books = load_or_empty(StoreKind::Books, repo.load_books());
        let members = load_or_empty(StoreKind::Members, repo.load_members());
        let ledger: IssueLedger = load_or_empty(StoreKind::Issues, repo.load_ledger());
        tracing::info!(
            books = books.len(),
            members = members.len(),
            issued = ledger.len(),
            "library loaded"
        );
        Self::new(repo, Library::from_parts(books, members, ledger))
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// 書籍を追加して永続化する。
    pub fn add_book(&mut self, req: AddBookRequest) -> Result<Book, AppError> {
        let book = self.library.add_book(req)?.clone();
        tracing::info!(book = %book.id(), quantity = book.total_quantity(), "book added");
        self.persist()?;
        Ok(book)
    }

    /// 会員を追加して永続化する。
    pub fn add_member(&mut self, req: AddMemberRequest) -> Result<Member, AppError> {
        let member = self.library.add_member(req)?.clone();
        tracing::info!(member = %member.id(), "member added");
        self.persist()?;
        Ok(member)
    }

    /// 書籍を貸し出す。
    pub fn issue_book(&mut self, book_id: &str, member_id: &str) -> Result<IssueReceipt, AppError> {
        let receipt = self.library.issue_book(book_id, member_id)?;
        tracing::info!(
            book = %receipt.book_id,
            member = %receipt.member_id,
            available = receipt.available,
            "book issued"
        );
        self.persist()?;
        Ok(receipt)
    }

    /// 書籍を返却する。
    pub fn return_book(&mut self, book_id: &str) -> Result<ReturnReceipt, AppError> {
        let receipt = self.library.return_book(book_id)?;
        match receipt.available {
            Some(available) => tracing::info!(
                book = %receipt.book_id,
                member = %receipt.former_holder,
                available,
                "book returned"
            ),
            None => tracing::warn!(
                book = %receipt.book_id,
                member = %receipt.former_holder,
                "returned book is not in the catalog; ledger entry cleared only"
            ),
        }
        self.persist()?;
        Ok(receipt)
    }

    pub fn search(&self, query: &str) -> Vec<&Book> {
        self.library.search(query)
    }

    pub fn members(&self) -> &[Member] {
        self.library.members()
    }

    /// 明示的な保存。
    pub fn save(&self) -> Result<(), AppError> {
        self.persist()
    }

    // --- private ---

    /// 3ストアを books → members → issues の順に必ずすべて書き出す。
    /// 途中の失敗で残りを止めず、ロールバックもしない。最初の失敗を返す。
    fn persist(&self) -> Result<(), AppError> {
        let results = [
            (StoreKind::Books, self.repo.save_books(self.library.books())),
            (
                StoreKind::Members,
                self.repo.save_members(self.library.members()),
            ),
            (StoreKind::Issues, self.repo.save_ledger(self.library.ledger())),
        ];

        let mut first_failure = None;
        for (store, result) in results {
            if let Err(e) = result {
                tracing::error!(%store, error = %e, "failed to save store");
                first_failure.get_or_insert(AppError::Storage {
                    store,
                    source: Box::new(e),
                });
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn load_or_empty<T: Default, E: std::fmt::Display>(
    store: StoreKind,
    result: Result<Option<T>, E>,
) -> T {
    match result {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!(%store, error = %e, "store unreadable; starting empty");
            T::default()
        }
    }
}
