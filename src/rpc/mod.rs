//! Length-prefixed JSON RPC channel (C1): the full-duplex framing protocol used to
//! broker calls between the step executor and a worker process over its stdio.

mod channel;
mod frame;

pub use channel::{RpcChannel, RpcHandler};
pub use frame::{Frame, FrameKind};
