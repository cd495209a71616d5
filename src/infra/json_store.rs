use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::model::book::Book;
use crate::domain::model::ledger::IssueLedger;
use crate::domain::model::member::Member;
use crate::domain::repository::LibraryRepository;

pub const BOOKS_FILE: &str = "books.json";
pub const MEMBERS_FILE: &str = "members.json";
pub const ISSUES_FILE: &str = "issues.json";

#[derive(Debug, thiserror::Error)]
pub enum JsonStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSONファイルによるLibraryRepository実装。
/// 1コレクション = 1 JSONファイル（books / members / issues）。
pub struct JsonLibraryRepository {
    books_path: PathBuf,
    members_path: PathBuf,
    issues_path: PathBuf,
}

impl JsonLibraryRepository {
    /// data_dir直下に3ファイルを配置する。
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self {
            books_path: dir.join(BOOKS_FILE),
            members_path: dir.join(MEMBERS_FILE),
            issues_path: dir.join(ISSUES_FILE),
        }
    }

    pub fn books_path(&self) -> &Path {
        &self.books_path
    }

    pub fn members_path(&self) -> &Path {
        &self.members_path
    }

    pub fn issues_path(&self) -> &Path {
        &self.issues_path
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, JsonStoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&content)?;
    Ok(Some(value))
}

/// tmpに書いてからrenameする。書きかけのコレクションは観測されない。
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), JsonStoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl LibraryRepository for JsonLibraryRepository {
    type Error = JsonStoreError;

    fn load_books(&self) -> Result<Option<Vec<Book>>, Self::Error> {
        read_json(&self.books_path)
    }

    fn load_members(&self) -> Result<Option<Vec<Member>>, Self::Error> {
        read_json(&self.members_path)
    }

    fn load_ledger(&self) -> Result<Option<IssueLedger>, Self::Error> {
        read_json(&self.issues_path)
    }

    fn save_books(&self, books: &[Book]) -> Result<(), Self::Error> {
        write_json(&self.books_path, books)
    }

    fn save_members(&self, members: &[Member]) -> Result<(), Self::Error> {
        write_json(&self.members_path, members)
    }

    fn save_ledger(&self, ledger: &IssueLedger) -> Result<(), Self::Error> {
        write_json(&self.issues_path, ledger)
    }
}
