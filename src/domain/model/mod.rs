pub mod book;
pub mod id;
pub mod ledger;
pub mod library;
pub mod member;
