//! Monitor and control Alpicool / Brass Monkey compressor fridges over Bluetooth Low Energy.
//!
//! The fridge exposes a vendor-specific GATT service with a command
//! characteristic and a notify characteristic. On top of that sits a small
//! proprietary protocol: every packet is wrapped in a checksummed frame, and
//! replies to Query, Set and Reset commands carry a fixed-layout status
//! record, with an extra section for the second compartment on dual-zone
//! models. The protocol has no request identifiers, so replies are matched
//! to commands by their command code.
//!
//! Currently the following can be done:
//!
//! - Bind to a fridge (one-time confirmation via its settings button)
//! - Query the full status (power, run mode, temperatures, battery)
//! - Change settings, including per-compartment target temperatures
//! - Poll continuously and get a deduplicated online/offline/changed event
//!   stream
//!
//! # Example
//!
//! ```no_run
//! # use std::time::Duration;
//! #
//! # #[tokio::main]
//! # pub async fn main() {
//!     let client = fridgemon::FridgeClient::connect("C0:FF:EE:00:00:01").await.unwrap();
//!     loop {
//!         let snapshot = client.query(Duration::from_secs(5)).await.unwrap();
//!         println!("{snapshot:?}");
//!         tokio::time::sleep(Duration::from_secs(10)).await;
//!     }
//! # }
//! ```

mod correlate;
mod error;
pub mod frame;
mod fridge_client;
mod fridge_state;
pub mod monitor;
pub mod record;

pub use error::{FridgeError, TransportError};
pub use frame::FrameError;
pub use fridge_client::FridgeClient;
pub use fridge_state::{
    BatterySaver, CompartmentReading, FridgeSnapshot, RunMode, StatusReport, TemperatureUnit,
    UnitReport,
};
pub use monitor::{FridgeEvent, FridgeSession, MonitorConfig, StatusSink};
pub use record::{CommandKind, RecordError, Request};
