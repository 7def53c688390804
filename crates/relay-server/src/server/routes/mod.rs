// Route modules for the relay server API
pub mod stats; // Read-only connection stats
pub mod token; // Dev-only token minting
pub mod ws; // WebSocket relay endpoint
