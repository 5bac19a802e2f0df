//! Strapdown inertial navigation kernel: attitude conversions, earth model,
//! ECEF mechanization with coning/sculling compensation and coarse alignment.

pub mod align;
pub mod attitude;
pub mod earth;
pub mod error;
pub mod frame;
pub mod imu;
pub mod linalg;
pub mod mech;
pub mod time;

pub use earth::{Earth, WGS84};
pub use error::{InsError, Result};
pub use imu::{ImuDataset, ImuSample};
pub use time::GpsTime;
