pub mod input_source;
pub mod logging;
pub mod transport;
