//! Wake-signal socket client and frame fan-out.

mod client;
mod fanout;

pub use client::{retry_delay, WakeClient};
pub use fanout::FrameFanout;
