// PIX charge backend client modules
//
// Charge creation and charge status endpoints. Both answer plain JSON
// objects; error signalling lives in an optional `error` field.

pub mod client;
pub mod models;

pub use client::PixClient;
