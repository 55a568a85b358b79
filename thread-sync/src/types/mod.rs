pub mod error;
pub mod subscription;
pub mod thread;

pub use subscription::ParentSubscription;
pub use thread::{
    RemoteThread, RemoteThreadBatch, RemoteThreadRef, RemoteUser, ThreadAuthor, ThreadItem,
    ThreadPayload,
};
