pub mod cursor;
pub mod key_encoding;
pub mod node;
pub mod ops;

pub use cursor::BTreeCursor;
pub use ops::BTree;
