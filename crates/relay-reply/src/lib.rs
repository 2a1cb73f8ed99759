pub mod engine;
pub mod heartbeat_sink;

pub use engine::{probe_heartbeat, reply, reply_with_typing_indicator};
pub use heartbeat_sink::ReplyHeartbeatSink;
