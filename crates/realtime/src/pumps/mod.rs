//! Per-transport tasks: read (dispatch + liveness), write, ping.

pub(crate) mod ping;
pub(crate) mod read;
pub(crate) mod write;
