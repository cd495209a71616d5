use serde::{Deserialize, Serialize};

use super::id::MemberId;

/// 会員追加リクエスト
pub struct AddMemberRequest {
    pub id: String,
    pub name: String,
    pub contact: String,
}

/// 会員。作成後は変更されない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    id: MemberId,
    name: String,
    #[serde(default)]
    contact: String,
}

impl Member {
    pub(crate) fn new(id: MemberId, name: String, contact: String) -> Self {
        Self { id, name, contact }
    }

    pub fn id(&self) -> &MemberId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &str {
        &self.contact
    }
}
