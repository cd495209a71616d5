use serde::{Deserialize, Serialize};

use super::id::BookId;

/// 書籍追加リクエスト。文字列は未トリムのまま受け取り、Library側で正規化する。
pub struct AddBookRequest {
    pub id: String,
    pub title: String,
    pub author: String,
    /// 出版年（制約なし。解釈不能な入力は0）
    pub year: i32,
    /// 冊数。1未満は1に切り上げる。
    pub quantity: i32,
}

/// 蔵書。Libraryが所有し、Libraryを通じて操作する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    id: BookId,
    title: String,
    #[serde(default)]
    author: String,
    year: i32,
    total_quantity: u32,
    available: u32,
}

impl Book {
    /// 作成直後は全冊が貸出可能。
    pub(crate) fn new(
        id: BookId,
        title: String,
        author: String,
        year: i32,
        total_quantity: u32,
    ) -> Self {
        Self {
            id,
            title,
            author,
            year,
            total_quantity,
            available: total_quantity,
        }
    }

    pub fn id(&self) -> &BookId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn total_quantity(&self) -> u32 {
        self.total_quantity
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    /// id / title / author のいずれかに小文字化済みクエリを含むか。
    pub(crate) fn matches(&self, lowered_query: &str) -> bool {
        self.id.as_str().to_lowercase().contains(lowered_query)
            || self.title.to_lowercase().contains(lowered_query)
            || self.author.to_lowercase().contains(lowered_query)
    }

    // --- 内部操作（Library経由でのみ呼ばれる） ---

    /// 1冊貸し出す。在庫0なら何もせずfalse。
    pub(crate) fn take_copy(&mut self) -> bool {
        match self.available.checked_sub(1) {
            Some(rest) => {
                self.available = rest;
                true
            }
            None => false,
        }
    }

    /// 1冊戻す。総冊数を超えない。
    pub(crate) fn put_back_copy(&mut self) {
        if self.available < self.total_quantity {
            self.available += 1;
        }
    }
}

/// 整数入力を寛容に解釈する。解釈できなければ（範囲外を含む）0。
pub fn parse_int_lenient(s: &str) -> i32 {
    s.trim().parse().unwrap_or(0)
}

/// 冊数入力の正規化。1未満は1。
pub fn clamp_quantity(quantity: i32) -> u32 {
    quantity.max(1).unsigned_abs()
}
