pub mod server;

pub use server::TickReceiver;
