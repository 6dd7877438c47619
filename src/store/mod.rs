pub mod object;

pub use object::{NAME_CAPACITY, Name, Object, ObjectId, ObjectRef, truncate_name};
