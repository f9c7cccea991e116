pub mod mock;

pub use mock::{MockHost, TickGenerator};
