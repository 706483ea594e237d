//! Integration tests for cronsync-backend.
//!
//! Everything runs against the in-memory fake; no AWS credentials needed.

mod retrying;
