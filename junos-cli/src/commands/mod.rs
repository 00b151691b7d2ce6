pub mod builtin;
pub mod command;
pub mod configure;
pub mod facts;
pub mod file_copy;
pub mod jsnapy;
pub mod ping;
pub mod pmtud;
pub mod rpc;
pub mod software;
pub mod system;
