pub mod protocol;
pub mod framing;
pub mod outbound;
pub mod replication;
pub mod broadcast;
pub mod observer;
