pub mod reclaim;
pub mod refcount;
pub mod slot_table;

pub use reclaim::{Guard, ReclaimEngine};
pub use refcount::RefCount;
pub use slot_table::{FreeSlots, SlotId, SlotTable};
