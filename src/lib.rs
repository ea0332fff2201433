//! Reader for the Broadcom AFBR-S50 time-of-flight sensor CAN application,
//! reached through an slcan serial adapter or a SocketCAN interface.
//!
//! ```no_run
//! # async fn demo() -> Result<(), tofcan_lib::IoError> {
//! use futures::StreamExt;
//! use tofcan_lib::{SensorConfig, SensorSession};
//!
//! let mut session = SensorSession::open_serial(SensorConfig::default())?;
//! session.start()?;
//! {
//!     let stream = session.measurements().take(10);
//!     futures::pin_mut!(stream);
//!     while let Some(m) = stream.next().await {
//!         println!("{:?}", m?);
//!     }
//! }
//! session.close().await
//! # }
//! ```

#[macro_use]
pub mod logging;
pub mod io;
pub mod sensor;
pub mod settings;

pub use io::{IoError, SensorEvent, TimedMeasurement};
pub use sensor::{Measurement, SensorController, SensorSession, SensorState, StatusKind};
pub use settings::SensorConfig;
