//! Gateway: the HTTP + WebSocket server in front of the token manager and the
//! playback state relay.
//!
//! Lifecycle:
//! 1. Load config, resolve the OAuth client
//! 2. Build the shared state (token manager, relay)
//! 3. Start the HTTP server (health, auth routes)
//! 4. Attach the WebSocket upgrade handler to the relay
//! 5. On shutdown, dispose the token manager

pub mod broadcast;
pub mod routes;
pub mod server;
pub mod state;
pub mod ws;
