pub mod access_log;
pub mod bus_message;
pub mod event;
pub mod outbox;
pub mod sensor_reading;

pub use access_log::*;
pub use bus_message::*;
pub use event::*;
pub use outbox::*;
pub use sensor_reading::*;
