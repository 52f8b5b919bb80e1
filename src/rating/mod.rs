mod batch;
mod engine;
mod game;
mod incremental;
mod penalty;
mod period;
mod rate;
mod rerate;
mod start;
mod working;

pub use batch::*;
pub use engine::*;
pub use game::*;
pub use incremental::*;
pub use penalty::*;
pub use period::*;
pub use rate::*;
pub use rerate::*;
pub use start::*;
pub use working::*;
