//! Types shared by the relay server, the native client and (through the
//! exported TypeScript bindings) the browser game.

pub mod config;
pub mod protocol;
pub mod vec3;
