// Interface adapters: wire protocol, socket and HTTP handlers, and the LLM client.

pub mod clients;
pub mod http;
pub mod net;
pub mod protocol;
pub mod state;
pub mod utils;
