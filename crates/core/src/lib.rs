pub mod attachment;
pub mod error;
pub mod event;
pub mod ids;
pub mod revision;
pub mod winner;

pub use attachment::{Attachment, AttachmentChanges, Encoding, UnsavedAttachment};
pub use error::CoreError;
pub use event::{ChangeEvent, WinnerRef};
pub use ids::*;
pub use revision::{validate_body, DocumentRevision, EMPTY_BODY};
pub use winner::{elect_winner, is_conflicted, Leaf};
