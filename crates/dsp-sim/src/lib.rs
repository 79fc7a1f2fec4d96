//! DSP Simulation Library
//!
//! This crate provides a stand-in for a rack of DSP units so the engine and
//! console can be exercised without hardware. It includes:
//!
//! - **VirtualDsp**: answers mute, gain and version commands with echoed replies
//! - **run_virtual_dsp_task**: serves a `VirtualDsp` over any async byte stream
//!
//! # Example
//!
//! ```rust
//! use dsp_protocol::{DeviceId, DeviceType};
//! use dsp_sim::VirtualDsp;
//!
//! let mut dsp = VirtualDsp::new("rack").with_unit(
//!     DeviceType::ClearOne880,
//!     DeviceId::new('A').unwrap(),
//!     "2.5.1",
//! );
//!
//! assert_eq!(dsp.process_line("#1A MUTE 3 I 1"), vec!["OK> #1A MUTE 3 I 1"]);
//! assert_eq!(dsp.process_line("#** VER"), vec!["OK> #1A VER 2.5.1"]);
//! ```

pub mod dsp;
pub mod dsp_task;

pub use dsp::{ChannelState, VirtualDsp, VirtualUnit};
pub use dsp_task::{run_virtual_dsp_task, VirtualDspCommand, VirtualDspEvent};
