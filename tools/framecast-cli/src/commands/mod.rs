pub mod check;
pub mod list;
pub mod pick;
pub mod record;
