mod cursor;
mod de;
mod materialize;
mod result_set;
mod row;

pub use cursor::{Cursor, Row};
pub use materialize::Shape;
pub use result_set::ResultSet;
pub use row::CustomDbRow;
