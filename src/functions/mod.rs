pub mod bus;
pub mod dashboard;

pub use bus::*;
pub use dashboard::*;
