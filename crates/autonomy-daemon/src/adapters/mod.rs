//! Concrete Host Adapter implementations (§4.A). `autonomy-core` only
//! sees the trait objects in `autonomy_core::host`; everything that
//! actually touches a file, a socket, or a subprocess lives here.

pub mod ipc_bus;
pub mod routing;
pub mod uci;
