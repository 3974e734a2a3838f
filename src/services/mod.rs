pub mod analysis;
pub mod credentials;
pub mod fal;
pub mod huggingface;
pub mod imaging;
pub mod intake;
pub mod kolors;
pub mod poller;
pub mod provider;
pub mod storage;
