//! The built-in adapter catalogue: the control-flow primitives every
//! pipeline is assembled from (`Constant`, `GreetMe`, `Execute`,
//! `PushResponse`, `ReceiveMessage`, `SendMessage`, `Zip2`, `SignalClient`,
//! `SignalAllDone`, `AwaitMessage`) plus the one domain adapter kept in
//! this crate as a worked example of the provider contract
//! (`ListTextureFiles`). Domain-specific data-source adapters plug into
//! the same [`crate::adapter::AdapterBody`] contract from elsewhere.

pub mod await_message;
pub mod constant;
pub mod execute;
pub mod greet_me;
pub mod list_texture_files;
pub mod push_response;
pub mod receive_message;
pub mod send_message;
pub mod signal_all_done;
pub mod signal_client;
pub mod zip2;

pub use await_message::AwaitMessage;
pub use constant::Constant;
pub use execute::Execute;
pub use greet_me::GreetMe;
pub use list_texture_files::{ListTextureFiles, ListTextureFilesConfig, TextureFilesBundle};
pub use push_response::PushResponse;
pub use receive_message::ReceiveMessage;
pub use send_message::SendMessage;
pub use signal_all_done::SignalAllDone;
pub use signal_client::SignalClient;
pub use zip2::Zip2;
