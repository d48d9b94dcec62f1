// RawHID Listener - shared library
// Packet codec, device session, stream routing and the console command loop

pub mod cli;
pub mod command;
pub mod config;
pub mod console;
pub mod discovery;
pub mod error;
pub mod listener;
pub mod packet;
pub mod router;
pub mod session;

pub use command::{Command, CommandError, Flow};
pub use config::ListenerConfig;
pub use console::Console;
pub use error::ListenerError;
pub use listener::{Listener, QuitHandle};
pub use packet::{Packet, PacketError, PacketType, StreamId, PACKET_SIZE};
pub use router::StreamRouter;
pub use session::{PollOutcome, Session};
