mod table_page;

pub use table_page::{TablePage, TablePageRef};
