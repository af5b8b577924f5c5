#![deny(unsafe_code)]

//! Client for the wpa_supplicant/hostapd control interface.
//!
//! The daemons expose a UNIX datagram socket that carries both synchronous
//! command/reply exchanges and, once a client has sent `ATTACH`, an
//! asynchronous stream of unsolicited events. [`ControlConnection`] owns one
//! such socket and keeps the two apart.
//!
//! ```no_run
//! # async fn demo() -> Result<(), wpactrl_core::WpaCtrlError> {
//! use wpactrl_core::ControlConnection;
//!
//! let mut ctrl = ControlConnection::open("/var/run/wpa_supplicant/wlan0").await?;
//! let status = ctrl.request("STATUS").await?;
//! println!("{}", String::from_utf8_lossy(&status));
//!
//! ctrl.attach().await?;
//! while ctrl.pending().await? {
//!     let event = ctrl.recv().await?;
//!     println!("{}", String::from_utf8_lossy(&event));
//! }
//! ctrl.close().await;
//! # Ok(())
//! # }
//! ```

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// The control connection and its lifecycle.
pub mod connection;
/// Error taxonomy.
pub mod error;
/// Event marker and priority parsing.
pub mod event;
mod reader;
/// `BSS <n>` scan result enumeration.
pub mod scan;

pub use build_info::version;
pub use connection::ControlConnection;
pub use error::{ExchangeError, WpaCtrlError};
pub use event::{Event, Priority};
pub use wpactrl_config::{ClientConfig, ConfigError, ConnectionConfig, ScanConfig};
