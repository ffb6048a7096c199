pub mod store;
pub mod vector;

pub use store::NoteStore;
pub use vector::{NullVectorIndex, VectorIndex};
