pub mod currency;
pub mod money;
pub mod record;

pub use money::Money;
pub use record::{Direction, NormalizedRecord, RawTable, RecordKind};
