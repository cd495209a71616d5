//! Shared test harness for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use library_mcp::application::service::LibraryService;
use library_mcp::domain::model::book::{AddBookRequest, Book};
use library_mcp::domain::model::ledger::IssueLedger;
use library_mcp::domain::model::library::Library;
use library_mcp::domain::model::member::{AddMemberRequest, Member};
use library_mcp::domain::repository::{LibraryRepository, StoreKind};

// =============================================================================
// InMemoryRepo — テスト用リポジトリ
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum InMemoryError {
    #[error("injected failure on {0} store")]
    Injected(StoreKind),
    #[error("corrupt {0} store")]
    Corrupt(StoreKind),
}

/// ファイルI/O不要のインメモリリポジトリ。ストア単位で書き込み失敗を注入できる。
pub struct InMemoryRepo {
    store: RefCell<HashMap<StoreKind, String>>,
    failing: RefCell<HashSet<StoreKind>>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            store: RefCell::new(HashMap::new()),
            failing: RefCell::new(HashSet::new()),
        }
    }

    /// 以降の save が指定ストアで失敗する。
    pub fn fail_on(&self, store: StoreKind) {
        self.failing.borrow_mut().insert(store);
    }

    /// 生の文字列を書き込む（破損データの再現用）。
    pub fn put_raw(&self, store: StoreKind, raw: &str) {
        self.store.borrow_mut().insert(store, raw.to_string());
    }

    pub fn raw(&self, store: StoreKind) -> Option<String> {
        self.store.borrow().get(&store).cloned()
    }

    fn load<T: serde::de::DeserializeOwned>(
        &self,
        store: StoreKind,
    ) -> Result<Option<T>, InMemoryError> {
        match self.store.borrow().get(&store) {
            Some(json) => serde_json::from_str(json)
                .map(Some)
                .map_err(|_| InMemoryError::Corrupt(store)),
            None => Ok(None),
        }
    }

    fn save<T: serde::Serialize + ?Sized>(
        &self,
        store: StoreKind,
        value: &T,
    ) -> Result<(), InMemoryError> {
        if self.failing.borrow().contains(&store) {
            return Err(InMemoryError::Injected(store));
        }
        let json = serde_json::to_string(value).unwrap();
        self.store.borrow_mut().insert(store, json);
        Ok(())
    }
}

impl LibraryRepository for InMemoryRepo {
    type Error = InMemoryError;

    fn load_books(&self) -> Result<Option<Vec<Book>>, Self::Error> {
        self.load(StoreKind::Books)
    }

    fn load_members(&self) -> Result<Option<Vec<Member>>, Self::Error> {
        self.load(StoreKind::Members)
    }

    fn load_ledger(&self) -> Result<Option<IssueLedger>, Self::Error> {
        self.load(StoreKind::Issues)
    }

    fn save_books(&self, books: &[Book]) -> Result<(), Self::Error> {
        self.save(StoreKind::Books, books)
    }

    fn save_members(&self, members: &[Member]) -> Result<(), Self::Error> {
        self.save(StoreKind::Members, members)
    }

    fn save_ledger(&self, ledger: &IssueLedger) -> Result<(), Self::Error> {
        self.save(StoreKind::Issues, ledger)
    }
}

// =============================================================================
// TestLibrary — 構造化済みテスト用Library作成ヘルパー
// =============================================================================

/// 標準的なテスト用Library:
/// ```text
/// B1  Dune              Herbert   1965  x2
/// B2  Foundation        Asimov    1951  x1
/// B3  Dune Messiah      Herbert   1969  x1
/// M1  Alice
/// M2  Bob
/// ```
pub fn standard_library() -> Library {
    let mut lib = Library::new();
    for (id, title, author, year, quantity) in [
        ("B1", "Dune", "Herbert", 1965, 2),
        ("B2", "Foundation", "Asimov", 1951, 1),
        ("B3", "Dune Messiah", "Herbert", 1969, 1),
    ] {
        lib.add_book(book_req(id, title, author, year, quantity))
            .unwrap();
    }
    for (id, name) in [("M1", "Alice"), ("M2", "Bob")] {
        lib.add_member(member_req(id, name)).unwrap();
    }
    lib
}

pub fn book_req(id: &str, title: &str, author: &str, year: i32, quantity: i32) -> AddBookRequest {
    AddBookRequest {
        id: id.into(),
        title: title.into(),
        author: author.into(),
        year,
        quantity,
    }
}

pub fn member_req(id: &str, name: &str) -> AddMemberRequest {
    AddMemberRequest {
        id: id.into(),
        name: name.into(),
        contact: String::new(),
    }
}

/// InMemoryRepoの上に空のServiceを作る。
pub fn empty_service() -> LibraryService<InMemoryRepo> {
    LibraryService::open(InMemoryRepo::new())
}

/// 標準LibraryでServiceを作る。
pub fn standard_service() -> LibraryService<InMemoryRepo> {
    LibraryService::new(InMemoryRepo::new(), standard_library())
}

// =============================================================================
// Assertion helpers
// =============================================================================

/// 結果がErrで、メッセージに指定文字列を含むことをassert。
pub fn assert_error_contains<T: std::fmt::Debug>(
    result: Result<T, impl std::fmt::Display>,
    expected: &str,
) {
    match result {
        Err(e) => {
            let msg = e.to_string();
            assert!(
                msg.contains(expected),
                "Expected error containing '{expected}', got: '{msg}'"
            );
        }
        Ok(v) => panic!("Expected error containing '{expected}', got Ok({v:?})"),
    }
}
