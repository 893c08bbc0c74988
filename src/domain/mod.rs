pub mod buttons;
pub mod imu;
pub mod models;
pub mod session;
pub mod settings;
