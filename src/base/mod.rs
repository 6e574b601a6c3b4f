// Robot dog base: line protocol over TCP
//
// Provides:
// - Motion request -> command translation with fixed conversion factors
// - The line protocol and its float rendering
// - A serialized TCP connection to the dog's command server
// - The high-level open-loop driver

pub mod connection;
mod driver;
pub mod protocol;
pub mod state;
pub mod translate;

pub use connection::{Connection, ConnectionError, Endpoint, LineSink, TransmissionError};
pub use driver::{
    Base, CallOptions, MotionError, PROPERTIES, RobotDog, SendPolicy, TransmissionFailure,
};
pub use protocol::{Arg, Command, ProtocolError};
pub use state::MotionState;
