//! # grblhub-communication
//!
//! The streaming protocol engine for Grbl firmware: an incremental line
//! parser, a character-counting sender that never overruns the firmware's
//! receive buffer, a feeder for ad-hoc lines, the workflow gate, and the
//! controller that orchestrates them over a serial transport.

pub mod controller;
pub mod event_trigger;
pub mod feeder;
pub mod protocol;
pub mod sender;
pub mod transport;
pub mod workflow;

pub use controller::GrblController;
pub use event_trigger::{EventTrigger, TriggeredAction};
pub use feeder::{Feeder, FeederLine};
pub use protocol::{GrblMessage, LineParser, ParsedLine};
pub use sender::{Sender, DEFAULT_WINDOW, GRBL_RX_BUFFER_SIZE};
pub use transport::{list_ports, SerialOptions, SerialPortInfo, SerialTransport, Transport};
pub use workflow::{Workflow, WorkflowState};
