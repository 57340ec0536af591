//! Forum services layered over the repositories.
//!
//! - [`badges`]: badge catalog and inline award rules
//! - [`profile`]: profile summary assembly
//! - [`link_preview`]: page metadata for chat link messages
//! - [`tags`]: tag display metadata and the tags directory
//! - [`media`]: upload storage

pub mod badges;
pub mod link_preview;
pub mod media;
pub mod profile;
pub mod tags;

pub use badges::BadgeService;
pub use link_preview::LinkPreviewer;
pub use media::{MediaKind, MediaStore};
