//! Data models for stored objects.
//!
//! Objects are addressed by an opaque key and carry their payload's etag,
//! size and the HTTP representation headers they were uploaded with.

pub mod object;
