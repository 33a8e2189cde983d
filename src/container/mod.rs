//! Low-level container format: the stream decoder and fixed sections.
//!
//! ## Buffer Structure
//!
//! ```text
//! +------------------------+
//! | Header (30 bytes)      |  SCPK, version, positions ptr, thumbnail ptr, reserved, SCPK
//! +------------------------+
//! | Objects ...            |  OBJ{ type id, field count, (key, value)* }OBJ
//! +------------------------+
//! | Xref records ...       |  length, url, style, hash id, encoding, hash, XREC, payload
//! +------------------------+
//! | String table           |  STRT count (string, id)* STRT
//! +------------------------+
//! | Thumbnail (optional)   |  THMB length bytes THMB
//! +------------------------+
//! | Positions              |  POSN count (name, offset)* POSN
//! +------------------------+
//! ```
//!
//! Sections may appear in any order; the header and the positions table
//! are the only fixed entry points.

mod buffer;
mod compression;
mod format;
mod header;
mod shortcuts;
mod stream;
mod strings;
mod varint;

pub use buffer::*;
pub use compression::*;
pub use format::*;
pub use header::*;
pub use shortcuts::*;
pub use stream::*;
pub use strings::*;
pub use varint::*;
