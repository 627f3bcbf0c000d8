pub mod chat;
pub mod issue;
pub mod work_item;
