use super::book::{clamp_quantity, AddBookRequest, Book};
use super::id::{BookId, MemberId};
use super::ledger::IssueLedger;
use super::member::{AddMemberRequest, Member};
use crate::domain::error::DomainError;

/// 貸出の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueReceipt {
    pub book_id: BookId,
    pub member_id: MemberId,
    pub available: u32,
}

/// 返却の結果。書籍が見つからない場合 `available` は None。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnReceipt {
    pub book_id: BookId,
    pub former_holder: MemberId,
    pub available: Option<u32>,
}

/// Library — 集約ルート。蔵書・会員・貸出台帳を保持し、全操作はここを経由する。
///
/// 蔵書と会員は挿入順（表示順）で保持する。件数が小さいため検索は線形走査。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Library {
    books: Vec<Book>,
    members: Vec<Member>,
    ledger: IssueLedger,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// 永続化層から読み込んだ各コレクションで組み立てる。整合性は検査しない。
    pub fn from_parts(books: Vec<Book>, members: Vec<Member>, ledger: IssueLedger) -> Self {
        Self {
            books,
            members,
            ledger,
        }
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn ledger(&self) -> &IssueLedger {
        &self.ledger
    }

    pub fn find_book(&self, id: &str) -> Option<&Book> {
        self.books.iter().find(|b| b.id().as_str() == id)
    }

    pub fn find_member(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id().as_str() == id)
    }

    /// 書籍追加。id・titleの必須検査、id重複検査の順に行う。
    pub fn add_book(&mut self, req: AddBookRequest) -> Result<&Book, DomainError> {
        let id = req.id.trim();
        let title = req.title.trim();
        if id.is_empty() {
            return Err(DomainError::EmptyField("id"));
        }
        if title.is_empty() {
            return Err(DomainError::EmptyField("title"));
        }
        if self.find_book(id).is_some() {
            return Err(DomainError::DuplicateBook(BookId::new(id)));
        }

        let book = Book::new(
            BookId::new(id),
            title.to_string(),
            req.author.trim().to_string(),
            req.year,
            clamp_quantity(req.quantity),
        );
        Ok(self.push_book(book))
    }

    /// 会員追加。id・nameの必須検査、id重複検査の順に行う。
    pub fn add_member(&mut self, req: AddMemberRequest) -> Result<&Member, DomainError> {
        let id = req.id.trim();
        let name = req.name.trim();
        if id.is_empty() {
            return Err(DomainError::EmptyField("id"));
        }
        if name.is_empty() {
            return Err(DomainError::EmptyField("name"));
        }
        if self.find_member(id).is_some() {
            return Err(DomainError::DuplicateMember(MemberId::new(id)));
        }

        let member = Member::new(
            MemberId::new(id),
            name.to_string(),
            req.contact.trim().to_string(),
        );
        Ok(self.push_member(member))
    }

    /// 貸出。検査順: 書籍の存在 → 会員の存在 → 貸出済み → 在庫。
    /// いずれかで失敗した場合は状態を変更しない。
    pub fn issue_book(
        &mut self,
        book_id: &str,
        member_id: &str,
    ) -> Result<IssueReceipt, DomainError> {
        let book_id = book_id.trim();
        let member_id = member_id.trim();

        let index = self
            .book_index(book_id)
            .ok_or_else(|| DomainError::BookNotFound(BookId::new(book_id)))?;
        let member = self
            .find_member(member_id)
            .ok_or_else(|| DomainError::MemberNotFound(MemberId::new(member_id)))?
            .id()
            .clone();
        let book_key = self.books[index].id().clone();
        if let Some(holder) = self.ledger.issuer_of(&book_key) {
            return Err(DomainError::AlreadyIssued {
                book: book_key,
                member: holder.clone(),
            });
        }
        if !self.books[index].take_copy() {
            return Err(DomainError::NoCopiesAvailable(book_key));
        }

        self.ledger.record_issue(book_key.clone(), member.clone());
        Ok(IssueReceipt {
            book_id: book_key,
            member_id: member,
            available: self.books[index].available(),
        })
    }

    /// 返却。台帳から記録を削除し、書籍が存在すれば在庫を1戻す。
    pub fn return_book(&mut self, book_id: &str) -> Result<ReturnReceipt, DomainError> {
        let book_key = BookId::new(book_id.trim());
        let former_holder = self
            .ledger
            .record_return(&book_key)
            .ok_or_else(|| DomainError::NotIssued(book_key.clone()))?;

        // 書籍が消えている場合（手編集された保存ファイル等）は在庫更新をスキップ
        let available = self.book_index(book_key.as_str()).map(|i| {
            let book = &mut self.books[i];
            book.put_back_copy();
            book.available()
        });

        Ok(ReturnReceipt {
            book_id: book_key,
            former_holder,
            available,
        })
    }

    /// id / title / author の部分一致検索（大文字小文字を区別しない）。
    /// 空クエリは全件。順序は挿入順を保つ。
    pub fn search(&self, query: &str) -> Vec<&Book> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.books.iter().collect();
        }
        self.books.iter().filter(|b| b.matches(&query)).collect()
    }

    // --- Repository primitives（一意性は検査しない） ---

    pub(crate) fn push_book(&mut self, book: Book) -> &Book {
        self.books.push(book);
        &self.books[self.books.len() - 1]
    }

    pub(crate) fn push_member(&mut self, member: Member) -> &Member {
        self.members.push(member);
        &self.members[self.members.len() - 1]
    }

    fn book_index(&self, id: &str) -> Option<usize> {
        self.books.iter().position(|b| b.id().as_str() == id)
    }
}
