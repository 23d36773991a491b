pub mod connection;
pub mod handshake;
pub mod send;
