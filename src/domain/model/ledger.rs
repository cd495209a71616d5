use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::id::{BookId, MemberId};

/// 貸出台帳。BookId → 借りている会員のMemberId。
///
/// 1つのBookIdにつき記録は1件のみ。複数冊ある書籍でも最後に貸し出した会員しか残らない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueLedger {
    entries: BTreeMap<BookId, MemberId>,
}

impl IssueLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_issued(&self, book_id: &BookId) -> bool {
        self.entries.contains_key(book_id)
    }

    pub fn issuer_of(&self, book_id: &BookId) -> Option<&MemberId> {
        self.entries.get(book_id)
    }

    /// 既存の記録は上書きする。重複貸出の検査は呼び出し側の責務。
    pub fn record_issue(&mut self, book_id: BookId, member_id: MemberId) {
        self.entries.insert(book_id, member_id);
    }

    /// 記録を削除し、借りていた会員を返す。
    pub fn record_return(&mut self, book_id: &BookId) -> Option<MemberId> {
        self.entries.remove(book_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// BookId順に記録を列挙する。
    pub fn iter(&self) -> impl Iterator<Item = (&BookId, &MemberId)> {
        self.entries.iter()
    }
}
