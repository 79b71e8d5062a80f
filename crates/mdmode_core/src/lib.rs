pub mod stdio_server;
pub mod uri;
