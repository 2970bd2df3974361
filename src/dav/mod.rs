//! WebDAV/CalDAV wire-level codec: request body builders, the streaming
//! multistatus parser, ACL decode, and capability discovery. None of this
//! module depends on `ical` — it moves opaque calendar text and server
//! metadata, leaving interpretation to the client layer.

pub mod acl;
pub mod capabilities;
pub mod model;
pub mod multistatus;
pub mod xml;

pub use acl::{AclParseError, parse_acl};
pub use capabilities::parse_capabilities;
pub use model::*;
pub use multistatus::{MultistatusError, SyncCollectionResult, interpret_sync_collection, parse_multistatus};
pub use xml::{DavXmlError, PrefixCase, ScheduleRecipientResponse};
