pub mod connection;
pub mod export;
pub mod import;
pub mod inspect;

pub use connection::ConnectionArgs;
pub use export::cmd_export;
pub use import::{cmd_import, ImportOpts};
pub use inspect::{cmd_inspect, InspectOpts};
